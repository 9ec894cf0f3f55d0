//! Generation requests, jobs, and argument building.
//!
//! [`GenerateRequest`] is the client-facing shape (every field but the
//! prompt optional), [`GenerationJob`] is the immutable queue payload with
//! defaults applied, and [`GenerationRequest`] is what the external
//! generator receives.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;
use crate::types::ClientId;

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

pub const DEFAULT_MODEL: &str = "fal-ai/flux-pro/v1.1";
pub const DEFAULT_IMAGE_SIZE: &str = "landscape_4_3";
pub const DEFAULT_NUM_IMAGES: u32 = 1;
pub const DEFAULT_OUTPUT_FORMAT: &str = "jpeg";
pub const DEFAULT_SAFETY_TOLERANCE: &str = "2";

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// Body of a submit request. `null` and missing fields both take defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
    pub model_name: Option<String>,
    pub image_size: Option<String>,
    pub num_images: Option<u32>,
    pub output_format: Option<String>,
    pub seed: Option<i64>,
    pub sync_mode: Option<bool>,
    pub enable_safety_checker: Option<bool>,
    pub safety_tolerance: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl GenerateRequest {
    /// Apply defaults and bind the request to a freshly minted client id.
    pub fn into_job(self, client_id: ClientId) -> GenerationJob {
        GenerationJob {
            client_id,
            prompt: self.prompt,
            model_name: self.model_name.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            image_size: self
                .image_size
                .unwrap_or_else(|| DEFAULT_IMAGE_SIZE.to_string()),
            num_images: self.num_images.unwrap_or(DEFAULT_NUM_IMAGES),
            output_format: self
                .output_format
                .unwrap_or_else(|| DEFAULT_OUTPUT_FORMAT.to_string()),
            seed: self.seed,
            sync_mode: self.sync_mode.unwrap_or(false),
            enable_safety_checker: self.enable_safety_checker.unwrap_or(true),
            safety_tolerance: self
                .safety_tolerance
                .unwrap_or_else(|| DEFAULT_SAFETY_TOLERANCE.to_string()),
            width: self.width,
            height: self.height,
        }
    }
}

/// Validate a submit request before any job is created.
///
/// An empty prompt is the only client error. Other parameters are passed
/// through; the generator's own rejections surface as failure results.
pub fn validate_generate_request(input: &GenerateRequest) -> Result<(), CoreError> {
    if input.prompt.is_empty() {
        return Err(CoreError::Validation("Prompt cannot be empty".to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// Immutable queue payload for one generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationJob {
    pub client_id: ClientId,
    pub prompt: String,
    pub model_name: String,
    pub image_size: String,
    pub num_images: u32,
    pub output_format: String,
    pub seed: Option<i64>,
    pub sync_mode: bool,
    pub enable_safety_checker: bool,
    pub safety_tolerance: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Image size as sent to the generator: a named preset or explicit pixels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ImageSize {
    Preset(String),
    Custom { width: u32, height: u32 },
}

/// A fully-built call to the external generator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    pub model: String,
    pub arguments: Value,
}

impl GenerationJob {
    /// Explicit dimensions win over the preset, but only when both are set
    /// and non-zero. A zero dimension counts as unset.
    pub fn resolved_image_size(&self) -> ImageSize {
        match (self.width, self.height) {
            (Some(width), Some(height)) if width > 0 && height > 0 => {
                ImageSize::Custom { width, height }
            }
            _ => ImageSize::Preset(self.image_size.clone()),
        }
    }

    /// Build the generator argument object.
    ///
    /// `seed` is omitted when unset and `sync_mode` is omitted unless true;
    /// omission, not a sentinel, is what signals the generator default.
    pub fn arguments(&self) -> Value {
        let mut args = Map::new();
        args.insert("prompt".into(), Value::from(self.prompt.clone()));
        args.insert("num_images".into(), Value::from(self.num_images));
        args.insert(
            "enable_safety_checker".into(),
            Value::from(self.enable_safety_checker),
        );
        args.insert(
            "safety_tolerance".into(),
            Value::from(self.safety_tolerance.clone()),
        );
        args.insert(
            "output_format".into(),
            Value::from(self.output_format.clone()),
        );
        args.insert(
            "image_size".into(),
            serde_json::to_value(self.resolved_image_size()).unwrap_or(Value::Null),
        );
        if let Some(seed) = self.seed {
            args.insert("seed".into(), Value::from(seed));
        }
        if self.sync_mode {
            args.insert("sync_mode".into(), Value::from(true));
        }
        Value::Object(args)
    }

    pub fn to_request(&self) -> GenerationRequest {
        GenerationRequest {
            model: self.model_name.clone(),
            arguments: self.arguments(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    fn request(prompt: &str) -> GenerateRequest {
        GenerateRequest {
            prompt: prompt.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn empty_prompt_is_rejected() {
        let err = validate_generate_request(&request("")).unwrap_err();
        assert_matches!(err, CoreError::Validation(msg) if msg == "Prompt cannot be empty");
    }

    #[test]
    fn only_the_prompt_is_validated() {
        let mut input = request("a cat");
        input.num_images = Some(0);
        input.width = Some(0);
        input.height = Some(512);
        validate_generate_request(&input).unwrap();
    }

    #[test]
    fn defaults_are_applied() {
        let job = request("a cat").into_job(ClientId::from("c1"));
        assert_eq!(job.model_name, DEFAULT_MODEL);
        assert_eq!(job.image_size, DEFAULT_IMAGE_SIZE);
        assert_eq!(job.num_images, 1);
        assert_eq!(job.output_format, "jpeg");
        assert!(job.enable_safety_checker);
        assert_eq!(job.safety_tolerance, "2");
        assert!(!job.sync_mode);
        assert_eq!(job.seed, None);
    }

    #[test]
    fn request_deserializes_with_nulls() {
        let input: GenerateRequest = serde_json::from_value(json!({
            "prompt": "a cat",
            "seed": null,
            "sync_mode": null,
        }))
        .unwrap();
        assert_eq!(input.seed, None);
        assert_eq!(input.sync_mode, None);
    }

    #[test]
    fn explicit_dimensions_override_preset() {
        let mut input = request("a cat");
        input.image_size = Some("square_hd".into());
        input.width = Some(1024);
        input.height = Some(768);
        let args = input.into_job(ClientId::from("c1")).arguments();
        assert_eq!(args["image_size"], json!({"width": 1024, "height": 768}));
    }

    #[test]
    fn single_dimension_falls_back_to_preset() {
        let mut input = request("a cat");
        input.image_size = Some("square".into());
        input.width = Some(1024);
        let args = input.into_job(ClientId::from("c1")).arguments();
        assert_eq!(args["image_size"], json!("square"));
    }

    #[test]
    fn unset_seed_and_sync_mode_are_omitted() {
        let args = request("a cat").into_job(ClientId::from("c1")).arguments();
        let obj = args.as_object().unwrap();
        assert!(!obj.contains_key("seed"));
        assert!(!obj.contains_key("sync_mode"));
    }

    #[test]
    fn seed_zero_and_sync_mode_true_are_included() {
        let mut input = request("a cat");
        input.seed = Some(0);
        input.sync_mode = Some(true);
        let args = input.into_job(ClientId::from("c1")).arguments();
        assert_eq!(args["seed"], json!(0));
        assert_eq!(args["sync_mode"], json!(true));
    }

    #[test]
    fn request_targets_job_model() {
        let mut input = request("a cat");
        input.model_name = Some("fal-ai/flux/dev".into());
        let req = input.into_job(ClientId::from("c1")).to_request();
        assert_eq!(req.model, "fal-ai/flux/dev");
        assert_eq!(req.arguments["prompt"], json!("a cat"));
    }

    #[test]
    fn zero_dimension_falls_back_to_preset() {
        let mut input = request("a cat");
        input.image_size = Some("portrait_4_3".into());
        input.width = Some(0);
        input.height = Some(512);
        let args = input.into_job(ClientId::from("c1")).arguments();
        assert_eq!(args["image_size"], json!("portrait_4_3"));
    }
}
