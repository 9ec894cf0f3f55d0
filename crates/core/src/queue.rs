//! At-least-once work queue with bounded automatic retry.
//!
//! The queue owns attempt accounting: a consumer takes a [`Delivery`],
//! runs it, and reports back with [`JobQueue::ack`] or [`JobQueue::fail`].
//! Both are scoped to the delivered attempt, so a consumer that outlived its
//! lease cannot settle a later attempt of the same job.
//! On failure the queue decides whether to redeliver (up to
//! [`RetryPolicy::max_retries`] additional attempts) or give up.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::generation::GenerationJob;
use crate::types::{ClientId, JobId};

/// Additional attempts after the first failed one.
pub const DEFAULT_MAX_RETRIES: u32 = 4;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Job {0} is not in flight for this attempt")]
    NotInFlight(JobId),

    #[error("Job payload could not be encoded: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Job queue backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl QueueError {
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend(Box::new(err))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Delay before a failed job becomes visible again.
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    /// First attempt plus retries.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            delay: Duration::ZERO,
        }
    }
}

/// A job handed to a consumer. `attempt` starts at 1.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub job_id: JobId,
    pub job: GenerationJob,
    pub attempt: u32,
    pub max_attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome {
    /// The job was put back and will be delivered again.
    Retrying { next_attempt: u32, delay: Duration },
    /// The attempt cap is reached; the job will not run again.
    Exhausted { attempts: u32 },
}

/// A job whose consumer vanished mid-attempt with no retries left.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbandonedJob {
    pub job_id: JobId,
    pub client_id: ClientId,
    pub attempts: u32,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueDepth {
    /// Waiting to be delivered, including jobs still inside a retry delay.
    pub queued: usize,
    pub in_flight: usize,
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: GenerationJob, policy: &RetryPolicy)
        -> Result<JobId, QueueError>;

    /// Take the next ready job, if any. Never blocks waiting for work.
    async fn dequeue(&self) -> Result<Option<Delivery>, QueueError>;

    /// The delivered attempt finished; the job is done.
    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError>;

    /// The delivered attempt failed without producing a result.
    async fn fail(&self, delivery: &Delivery, reason: &str) -> Result<RetryOutcome, QueueError>;

    /// Collect jobs whose consumer disappeared after the final attempt.
    ///
    /// Backends without leases never abandon jobs.
    async fn reap_abandoned(&self) -> Result<Vec<AbandonedJob>, QueueError> {
        Ok(Vec::new())
    }

    async fn depth(&self) -> Result<QueueDepth, QueueError>;
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct Entry {
    job_id: JobId,
    job: GenerationJob,
    attempts: u32,
    policy: RetryPolicy,
    available_at: Instant,
}

#[derive(Default)]
struct State {
    queued: VecDeque<Entry>,
    in_flight: HashMap<JobId, Entry>,
}

/// Process-local [`JobQueue`]. Jobs do not survive a restart.
#[derive(Default)]
pub struct MemoryJobQueue {
    state: Mutex<State>,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

impl State {
    /// Remove the in-flight entry for `delivery`'s attempt.
    fn take_in_flight(&mut self, delivery: &Delivery) -> Result<Entry, QueueError> {
        match self.in_flight.get(&delivery.job_id) {
            Some(entry) if entry.attempts == delivery.attempt => {}
            _ => return Err(QueueError::NotInFlight(delivery.job_id)),
        }
        self.in_flight
            .remove(&delivery.job_id)
            .ok_or(QueueError::NotInFlight(delivery.job_id))
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(
        &self,
        job: GenerationJob,
        policy: &RetryPolicy,
    ) -> Result<JobId, QueueError> {
        let job_id = JobId::generate();
        self.state.lock().await.queued.push_back(Entry {
            job_id,
            job,
            attempts: 0,
            policy: policy.clone(),
            available_at: Instant::now(),
        });
        Ok(job_id)
    }

    async fn dequeue(&self) -> Result<Option<Delivery>, QueueError> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        let Some(pos) = state.queued.iter().position(|e| e.available_at <= now) else {
            return Ok(None);
        };
        let Some(mut entry) = state.queued.remove(pos) else {
            return Ok(None);
        };
        entry.attempts += 1;
        let delivery = Delivery {
            job_id: entry.job_id,
            job: entry.job.clone(),
            attempt: entry.attempts,
            max_attempts: entry.policy.max_attempts(),
        };
        state.in_flight.insert(entry.job_id, entry);
        Ok(Some(delivery))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        self.state.lock().await.take_in_flight(delivery).map(|_| ())
    }

    async fn fail(&self, delivery: &Delivery, _reason: &str) -> Result<RetryOutcome, QueueError> {
        let mut state = self.state.lock().await;
        let mut entry = state.take_in_flight(delivery)?;

        if entry.attempts > entry.policy.max_retries {
            return Ok(RetryOutcome::Exhausted {
                attempts: entry.attempts,
            });
        }

        let delay = entry.policy.delay;
        let next_attempt = entry.attempts + 1;
        entry.available_at = Instant::now() + delay;
        state.queued.push_back(entry);
        Ok(RetryOutcome::Retrying {
            next_attempt,
            delay,
        })
    }

    async fn depth(&self) -> Result<QueueDepth, QueueError> {
        let state = self.state.lock().await;
        Ok(QueueDepth {
            queued: state.queued.len(),
            in_flight: state.in_flight.len(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
