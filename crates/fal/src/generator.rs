use async_trait::async_trait;
use imgq_core::generation::GenerationRequest;

/// Errors from the generation service.
#[derive(Debug, thiserror::Error)]
pub enum FalError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service returned a non-2xx status code.
    #[error("fal API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The service reported the request as failed or returned garbage.
    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("FAL_KEY is not configured")]
    MissingCredentials,
}

/// Submit-and-wait access to an image generation model.
///
/// Returns the service's structured result, or an error whose `Display`
/// text is what ends up stored as the failure record.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<serde_json::Value, FalError>;
}
