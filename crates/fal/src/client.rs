//! REST client for fal.ai's queue API.
//!
//! A generation is three calls: `POST {queue_url}/{model}` enqueues the
//! request and returns its status/response URLs, the status URL is polled
//! until it reports `COMPLETED`, and the response URL yields the result.

use std::time::Duration;

use async_trait::async_trait;
use imgq_core::config::{env_or, env_parse, env_required, ConfigError};
use imgq_core::generation::GenerationRequest;
use serde::Deserialize;

use crate::generator::{FalError, ImageGenerator};

/// Default base URL of the queue API.
pub const DEFAULT_QUEUE_URL: &str = "https://queue.fal.run";

/// Default pause between status polls.
const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

#[derive(Debug, Clone)]
pub struct FalConfig {
    pub api_key: String,
    pub queue_url: String,
    pub poll_interval: Duration,
}

impl FalConfig {
    /// Load from the environment.
    ///
    /// | Env Var                | Default                  |
    /// |------------------------|--------------------------|
    /// | `FAL_KEY`              | (required)               |
    /// | `FAL_QUEUE_URL`        | `https://queue.fal.run`  |
    /// | `FAL_POLL_INTERVAL_MS` | `1000`                   |
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            api_key: env_required("FAL_KEY")?,
            queue_url: env_or("FAL_QUEUE_URL", DEFAULT_QUEUE_URL),
            poll_interval: Duration::from_millis(env_parse(
                "FAL_POLL_INTERVAL_MS",
                DEFAULT_POLL_INTERVAL_MS,
            )?),
        })
    }
}

/// Response to a queue submission.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueSubmission {
    pub request_id: String,
    pub status_url: String,
    pub response_url: String,
}

/// Progress of a queued request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueStatus {
    InQueue { queue_position: Option<u32> },
    InProgress {},
    Completed { error: Option<String> },
}

/// HTTP client for the fal queue API.
pub struct FalClient {
    client: reqwest::Client,
    config: FalConfig,
}

impl FalClient {
    pub fn new(config: FalConfig) -> Result<Self, FalError> {
        if config.api_key.trim().is_empty() {
            return Err(FalError::MissingCredentials);
        }
        Ok(Self {
            client: reqwest::Client::new(),
            config,
        })
    }

    /// Enqueue a generation request.
    pub async fn submit(
        &self,
        model: &str,
        arguments: &serde_json::Value,
    ) -> Result<QueueSubmission, FalError> {
        let url = format!(
            "{}/{}",
            self.config.queue_url.trim_end_matches('/'),
            model.trim_start_matches('/')
        );
        let response = self
            .client
            .post(url)
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .json(arguments)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    pub async fn status(&self, submission: &QueueSubmission) -> Result<QueueStatus, FalError> {
        let response = self
            .client
            .get(&submission.status_url)
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .send()
            .await?;

        Self::parse_response(response).await
    }

    pub async fn result(
        &self,
        submission: &QueueSubmission,
    ) -> Result<serde_json::Value, FalError> {
        let response = self
            .client
            .get(&submission.response_url)
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Poll until the request completes. Unbounded; callers impose deadlines.
    async fn wait_for_completion(&self, submission: &QueueSubmission) -> Result<(), FalError> {
        loop {
            match self.status(submission).await? {
                QueueStatus::Completed { error: Some(error) } => {
                    return Err(FalError::Generation(error));
                }
                QueueStatus::Completed { error: None } => return Ok(()),
                QueueStatus::InQueue { queue_position } => {
                    tracing::trace!(
                        request_id = %submission.request_id,
                        ?queue_position,
                        "fal request queued",
                    );
                }
                QueueStatus::InProgress {} => {
                    tracing::trace!(request_id = %submission.request_id, "fal request running");
                }
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    // ---- private helpers ----

    fn auth_header(&self) -> String {
        format!("Key {}", self.config.api_key)
    }

    /// Ensure the response has a success status code, otherwise turn it
    /// into a [`FalError::Api`] carrying the status and body text.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, FalError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(FalError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, FalError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl ImageGenerator for FalClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<serde_json::Value, FalError> {
        let submission = self.submit(&request.model, &request.arguments).await?;
        tracing::debug!(
            request_id = %submission.request_id,
            model = %request.model,
            "Submitted generation request",
        );
        self.wait_for_completion(&submission).await?;
        self.result(&submission).await
    }
}
