//! [`JobQueue`] backed by the `generation_jobs` table.

use std::time::Duration;

use async_trait::async_trait;
use imgq_core::generation::GenerationJob;
use imgq_core::queue::{
    AbandonedJob, Delivery, JobQueue, QueueDepth, QueueError, RetryOutcome, RetryPolicy,
};
use imgq_core::types::{ClientId, JobId};

use crate::models::job::JobRow;
use crate::models::status::JobStatus;
use crate::repositories::JobRepo;
use crate::DbPool;

/// Default lease a worker holds on a claimed job.
pub const DEFAULT_LEASE: Duration = Duration::from_secs(600);

/// Durable, multi-process job queue.
///
/// A claimed job is leased for `lease`; if the worker neither acks nor
/// fails it before the lease runs out, the job is redelivered as a new
/// attempt. A settle call from the superseded attempt then gets
/// [`QueueError::NotInFlight`].
pub struct PgJobQueue {
    pool: DbPool,
    lease: Duration,
}

impl PgJobQueue {
    pub fn new(pool: DbPool) -> Self {
        Self::with_lease(pool, DEFAULT_LEASE)
    }

    pub fn with_lease(pool: DbPool, lease: Duration) -> Self {
        Self { pool, lease }
    }
}

fn delivery_from_row(row: JobRow) -> Result<Delivery, QueueError> {
    let job: GenerationJob = serde_json::from_value(row.payload)?;
    Ok(Delivery {
        job_id: JobId(row.id),
        job,
        attempt: row.attempt.max(0) as u32,
        max_attempts: row.max_retries.max(0) as u32 + 1,
    })
}

fn attempt_column(delivery: &Delivery) -> i32 {
    i32::try_from(delivery.attempt).unwrap_or(i32::MAX)
}

#[async_trait]
impl JobQueue for PgJobQueue {
    async fn enqueue(
        &self,
        job: GenerationJob,
        policy: &RetryPolicy,
    ) -> Result<JobId, QueueError> {
        let id = JobId::generate();
        let payload = serde_json::to_value(&job)?;
        JobRepo::insert(
            &self.pool,
            id.0,
            job.client_id.as_str(),
            &payload,
            policy.max_retries,
            policy.delay,
        )
        .await
        .map_err(QueueError::backend)?;
        Ok(id)
    }

    async fn dequeue(&self) -> Result<Option<Delivery>, QueueError> {
        let claimed = JobRepo::claim_next(&self.pool, self.lease)
            .await
            .map_err(QueueError::backend)?;
        claimed.map(delivery_from_row).transpose()
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let updated = JobRepo::complete(&self.pool, delivery.job_id.0, attempt_column(delivery))
            .await
            .map_err(QueueError::backend)?;
        if updated {
            Ok(())
        } else {
            Err(QueueError::NotInFlight(delivery.job_id))
        }
    }

    async fn fail(&self, delivery: &Delivery, reason: &str) -> Result<RetryOutcome, QueueError> {
        let row = JobRepo::fail(
            &self.pool,
            delivery.job_id.0,
            attempt_column(delivery),
            reason,
        )
        .await
        .map_err(QueueError::backend)?
        .ok_or(QueueError::NotInFlight(delivery.job_id))?;

        let attempts = row.attempt.max(0) as u32;
        match row.status() {
            Some(JobStatus::Queued) => Ok(RetryOutcome::Retrying {
                next_attempt: attempts + 1,
                delay: Duration::from_millis(row.retry_delay_ms.max(0) as u64),
            }),
            _ => Ok(RetryOutcome::Exhausted { attempts }),
        }
    }

    async fn reap_abandoned(&self) -> Result<Vec<AbandonedJob>, QueueError> {
        let rows = JobRepo::reap_abandoned(&self.pool)
            .await
            .map_err(QueueError::backend)?;
        Ok(rows
            .into_iter()
            .map(|row| AbandonedJob {
                job_id: JobId(row.id),
                client_id: ClientId::from(row.client_id),
                attempts: row.attempt.max(0) as u32,
                last_error: row.last_error,
            })
            .collect())
    }

    async fn depth(&self) -> Result<QueueDepth, QueueError> {
        let counts = JobRepo::counts(&self.pool)
            .await
            .map_err(QueueError::backend)?;
        Ok(QueueDepth {
            queued: counts.queued.max(0) as usize,
            in_flight: counts.running.max(0) as usize,
        })
    }
}
