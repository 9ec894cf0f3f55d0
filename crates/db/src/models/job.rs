use imgq_core::types::Timestamp;
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::status::JobStatus;

/// A row from the `generation_jobs` table.
#[derive(Debug, Clone, FromRow)]
pub struct JobRow {
    pub id: Uuid,
    pub client_id: String,
    pub payload: serde_json::Value,
    pub status: String,
    /// Attempts started so far.
    pub attempt: i32,
    pub max_retries: i32,
    pub retry_delay_ms: i64,
    pub last_error: Option<String>,
    pub available_at: Timestamp,
    pub claimed_at: Option<Timestamp>,
    pub lease_expires_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl JobRow {
    pub fn status(&self) -> Option<JobStatus> {
        JobStatus::parse(&self.status)
    }
}

/// Row counts per live status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromRow)]
pub struct JobCounts {
    pub queued: i64,
    pub running: i64,
}
