//! The stored outcome of a generation job.
//!
//! Success and failure share one key namespace and carry no status tag:
//! a success is the JSON-serialized generator payload, a failure is the raw
//! error text. Readers tell them apart only by payload shape.

use std::time::Duration;

use serde_json::Value;

use crate::types::ClientId;

/// Fixed lifetime of every result record (one hour).
pub const RESULT_TTL: Duration = Duration::from_secs(3600);

/// Key prefix for result records.
pub const RESULT_KEY_PREFIX: &str = "result:";

/// Storage key for a client's result record.
pub fn result_key(client_id: &ClientId) -> String {
    format!("{RESULT_KEY_PREFIX}{client_id}")
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResultRecord {
    /// Opaque structured payload returned by the generator.
    Success(Value),
    /// Textual description of why the job failed.
    Failure(String),
}

impl ResultRecord {
    /// Encode for storage.
    pub fn to_stored(&self) -> String {
        match self {
            ResultRecord::Success(value) => value.to_string(),
            ResultRecord::Failure(message) => message.clone(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ResultRecord::Success(_))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn key_uses_result_prefix() {
        assert_eq!(result_key(&ClientId::from("abc")), "result:abc");
    }

    #[test]
    fn success_payload_round_trips() {
        let payload = json!({
            "images": [{"url": "https://cdn.example/1.jpg", "width": 1024, "height": 768}],
            "seed": 42,
            "has_nsfw_concepts": [false],
        });
        let record = ResultRecord::Success(payload.clone());
        let decoded: Value = serde_json::from_str(&record.to_stored()).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn failure_is_stored_as_raw_text() {
        let record = ResultRecord::Failure("upstream returned 502".into());
        assert_eq!(record.to_stored(), "upstream returned 502");
        assert!(!record.is_success());
    }
}
