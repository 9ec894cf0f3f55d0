//! Concurrent consumer loops over a [`JobQueue`].

use std::sync::Arc;
use std::time::Duration;

use imgq_core::queue::{JobQueue, QueueError, RetryOutcome};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::WorkerConfig;
use crate::executor::GenerationExecutor;

/// What happened to one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// A record was written and the job acknowledged.
    Recorded { success: bool },
    /// No record was written; the queue will redeliver.
    Retrying { next_attempt: u32 },
    /// No record was written and the queue gave up.
    Abandoned { attempts: u32 },
}

/// Take one ready job from `queue`, run it, and settle it.
///
/// Returns `Ok(None)` when nothing was ready. The attempt runs on its own
/// task so a panic in generation is contained and counted as a failure.
pub async fn process_next(
    queue: &dyn JobQueue,
    executor: &Arc<GenerationExecutor>,
) -> Result<Option<AttemptOutcome>, QueueError> {
    let Some(delivery) = queue.dequeue().await? else {
        return Ok(None);
    };

    tracing::debug!(
        job_id = %delivery.job_id,
        client_id = %delivery.job.client_id,
        attempt = delivery.attempt,
        max_attempts = delivery.max_attempts,
        "Job claimed",
    );

    let task_executor = Arc::clone(executor);
    let job = delivery.job.clone();
    let attempt = tokio::spawn(async move { task_executor.execute(&job).await }).await;

    let reason = match attempt {
        Ok(Ok(record)) => {
            queue.ack(&delivery).await?;
            return Ok(Some(AttemptOutcome::Recorded {
                success: record.is_success(),
            }));
        }
        Ok(Err(e)) => e.to_string(),
        Err(e) if e.is_panic() => "Worker panicked during generation".to_string(),
        Err(e) => format!("Worker task aborted: {e}"),
    };

    tracing::warn!(
        job_id = %delivery.job_id,
        attempt = delivery.attempt,
        error = %reason,
        "Job attempt failed without a result",
    );

    match queue.fail(&delivery, &reason).await? {
        RetryOutcome::Retrying {
            next_attempt,
            delay,
        } => {
            tracing::info!(
                job_id = %delivery.job_id,
                next_attempt,
                delay_ms = delay.as_millis() as u64,
                "Job scheduled for retry",
            );
            Ok(Some(AttemptOutcome::Retrying { next_attempt }))
        }
        RetryOutcome::Exhausted { attempts } => {
            tracing::error!(job_id = %delivery.job_id, attempts, "Job retries exhausted");
            if let Err(e) = executor
                .record_abandoned(&delivery.job.client_id, attempts, &reason)
                .await
            {
                tracing::error!(
                    job_id = %delivery.job_id,
                    error = %e,
                    "Terminal failure record could not be written",
                );
            }
            Ok(Some(AttemptOutcome::Abandoned { attempts }))
        }
    }
}

/// A fixed number of consumer loops plus a reaper for abandoned leases.
pub struct WorkerPool {
    queue: Arc<dyn JobQueue>,
    executor: Arc<GenerationExecutor>,
    concurrency: usize,
    poll_interval: Duration,
    reap_interval: Duration,
}

impl WorkerPool {
    pub fn new(queue: Arc<dyn JobQueue>, executor: Arc<GenerationExecutor>) -> Self {
        let defaults = WorkerConfig::default();
        Self {
            queue,
            executor,
            concurrency: defaults.concurrency,
            poll_interval: defaults.poll_interval,
            reap_interval: defaults.reap_interval,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_reap_interval(mut self, reap_interval: Duration) -> Self {
        self.reap_interval = reap_interval;
        self
    }

    /// Run until `cancel` fires. In-flight jobs finish before their loop exits.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(
            concurrency = self.concurrency,
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Worker pool started",
        );

        let mut tasks = JoinSet::new();
        for slot in 0..self.concurrency {
            tasks.spawn(consume(
                slot,
                Arc::clone(&self.queue),
                Arc::clone(&self.executor),
                self.poll_interval,
                cancel.clone(),
            ));
        }
        tasks.spawn(reap(
            Arc::clone(&self.queue),
            Arc::clone(&self.executor),
            self.reap_interval,
            cancel.clone(),
        ));

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Worker loop terminated abnormally");
            }
        }
        tracing::info!("Worker pool stopped");
    }
}

async fn consume(
    slot: usize,
    queue: Arc<dyn JobQueue>,
    executor: Arc<GenerationExecutor>,
    poll_interval: Duration,
    cancel: CancellationToken,
) {
    loop {
        if cancel.is_cancelled() {
            break;
        }
        match process_next(queue.as_ref(), &executor).await {
            Ok(Some(_)) => continue,
            Ok(None) => {}
            Err(e) => tracing::error!(slot, error = %e, "Queue operation failed"),
        }
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(poll_interval) => {}
        }
    }
    tracing::debug!(slot, "Worker loop stopping");
}

async fn reap(
    queue: Arc<dyn JobQueue>,
    executor: Arc<GenerationExecutor>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let abandoned = match queue.reap_abandoned().await {
                    Ok(jobs) => jobs,
                    Err(e) => {
                        tracing::error!(error = %e, "Abandoned job sweep failed");
                        continue;
                    }
                };
                for job in abandoned {
                    let reason = job
                        .last_error
                        .as_deref()
                        .unwrap_or("worker stopped responding");
                    tracing::warn!(
                        job_id = %job.job_id,
                        attempts = job.attempts,
                        "Recording abandoned job",
                    );
                    if let Err(e) = executor
                        .record_abandoned(&job.client_id, job.attempts, reason)
                        .await
                    {
                        tracing::error!(job_id = %job.job_id, error = %e, "Abandoned job not recorded");
                    }
                }
            }
        }
    }
}
