//! Repository for the `generation_jobs` table.
//!
//! Claiming uses `SELECT FOR UPDATE SKIP LOCKED` so any number of worker
//! processes can poll the same table without double-delivery. A running
//! job whose lease has expired is claimable again, which is how crashed
//! attempts get redelivered.

use std::time::Duration;

use sqlx::PgPool;
use uuid::Uuid;

use crate::models::job::{JobCounts, JobRow};
use crate::models::status::JobStatus;

/// Column list for `generation_jobs` queries.
const COLUMNS: &str = "\
    id, client_id, payload, status, attempt, max_retries, retry_delay_ms, \
    last_error, available_at, claimed_at, lease_expires_at, created_at, updated_at";

/// Error text recorded when a job dies because its worker vanished.
pub const LEASE_EXPIRED_ERROR: &str = "worker lease expired";

pub struct JobRepo;

impl JobRepo {
    /// Insert a new queued job.
    pub async fn insert(
        pool: &PgPool,
        id: Uuid,
        client_id: &str,
        payload: &serde_json::Value,
        max_retries: u32,
        retry_delay: Duration,
    ) -> Result<JobRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO generation_jobs (id, client_id, payload, status, max_retries, retry_delay_ms) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, JobRow>(&query)
            .bind(id)
            .bind(client_id)
            .bind(payload)
            .bind(JobStatus::Queued.as_str())
            .bind(max_retries as i32)
            .bind(retry_delay.as_millis() as i64)
            .fetch_one(pool)
            .await
    }

    /// Atomically claim the next deliverable job and start a new attempt.
    ///
    /// Deliverable means queued and past its retry delay, or running with an
    /// expired lease and attempts remaining.
    pub async fn claim_next(pool: &PgPool, lease: Duration) -> Result<Option<JobRow>, sqlx::Error> {
        let query = format!(
            "UPDATE generation_jobs \
             SET status = $1, attempt = attempt + 1, claimed_at = NOW(), \
                 lease_expires_at = NOW() + make_interval(secs => $2::float8 / 1000), \
                 updated_at = NOW() \
             WHERE id = ( \
                 SELECT id FROM generation_jobs \
                 WHERE (status = $3 AND available_at <= NOW()) \
                    OR (status = $1 AND lease_expires_at < NOW() AND attempt <= max_retries) \
                 ORDER BY available_at ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, JobRow>(&query)
            .bind(JobStatus::Running.as_str())
            .bind(lease.as_millis() as i64)
            .bind(JobStatus::Queued.as_str())
            .fetch_optional(pool)
            .await
    }

    /// Mark a running job completed.
    ///
    /// Returns `false` if the job is not running `attempt`, e.g. because the
    /// lease lapsed and a later attempt claimed it.
    pub async fn complete(pool: &PgPool, id: Uuid, attempt: i32) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE generation_jobs \
             SET status = $2, lease_expires_at = NULL, updated_at = NOW() \
             WHERE id = $1 AND status = $3 AND attempt = $4",
        )
        .bind(id)
        .bind(JobStatus::Completed.as_str())
        .bind(JobStatus::Running.as_str())
        .bind(attempt)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Record a failed attempt: requeue after the retry delay while attempts
    /// remain, otherwise mark the job dead.
    ///
    /// Returns the updated row, or `None` if the job is not running `attempt`.
    pub async fn fail(
        pool: &PgPool,
        id: Uuid,
        attempt: i32,
        error: &str,
    ) -> Result<Option<JobRow>, sqlx::Error> {
        let query = format!(
            "UPDATE generation_jobs \
             SET status = CASE WHEN attempt <= max_retries THEN $3 ELSE $4 END, \
                 available_at = CASE WHEN attempt <= max_retries \
                     THEN NOW() + make_interval(secs => retry_delay_ms::float8 / 1000) \
                     ELSE available_at END, \
                 last_error = $2, lease_expires_at = NULL, updated_at = NOW() \
             WHERE id = $1 AND status = $5 AND attempt = $6 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, JobRow>(&query)
            .bind(id)
            .bind(error)
            .bind(JobStatus::Queued.as_str())
            .bind(JobStatus::Dead.as_str())
            .bind(JobStatus::Running.as_str())
            .bind(attempt)
            .fetch_optional(pool)
            .await
    }

    /// Kill running jobs whose lease expired on their final attempt.
    pub async fn reap_abandoned(pool: &PgPool) -> Result<Vec<JobRow>, sqlx::Error> {
        let query = format!(
            "UPDATE generation_jobs \
             SET status = $1, lease_expires_at = NULL, \
                 last_error = COALESCE(last_error, $2), updated_at = NOW() \
             WHERE status = $3 AND lease_expires_at < NOW() AND attempt > max_retries \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, JobRow>(&query)
            .bind(JobStatus::Dead.as_str())
            .bind(LEASE_EXPIRED_ERROR)
            .bind(JobStatus::Running.as_str())
            .fetch_all(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<JobRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM generation_jobs WHERE id = $1");
        sqlx::query_as::<_, JobRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn counts(pool: &PgPool) -> Result<JobCounts, sqlx::Error> {
        sqlx::query_as::<_, JobCounts>(
            "SELECT \
                 COUNT(*) FILTER (WHERE status = $1) AS queued, \
                 COUNT(*) FILTER (WHERE status = $2) AS running \
             FROM generation_jobs",
        )
        .bind(JobStatus::Queued.as_str())
        .bind(JobStatus::Running.as_str())
        .fetch_one(pool)
        .await
    }
}
