//! Runs one generation job and records its outcome.

use std::sync::Arc;
use std::time::Duration;

use imgq_core::generation::GenerationJob;
use imgq_core::result::{ResultRecord, RESULT_TTL};
use imgq_core::store::{ResultStore, StoreError};
use imgq_core::types::ClientId;
use imgq_events::{CompletionSink, ResultReady};
use imgq_fal::ImageGenerator;

/// Default upper bound on a single generator call.
pub const DEFAULT_JOB_DEADLINE: Duration = Duration::from_secs(300);

/// An attempt that produced no record. Only these are worth retrying.
#[derive(Debug, thiserror::Error)]
pub enum ExecuteError {
    #[error("Failed to store result: {0}")]
    Store(#[from] StoreError),
}

/// Calls the generator and writes exactly one record per attempt.
pub struct GenerationExecutor {
    generator: Arc<dyn ImageGenerator>,
    store: Arc<dyn ResultStore>,
    completions: Arc<dyn CompletionSink>,
    deadline: Duration,
    result_ttl: Duration,
}

impl GenerationExecutor {
    pub fn new(
        generator: Arc<dyn ImageGenerator>,
        store: Arc<dyn ResultStore>,
        completions: Arc<dyn CompletionSink>,
    ) -> Self {
        Self {
            generator,
            store,
            completions,
            deadline: DEFAULT_JOB_DEADLINE,
            result_ttl: RESULT_TTL,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_result_ttl(mut self, ttl: Duration) -> Self {
        self.result_ttl = ttl;
        self
    }

    /// Call the generator under the deadline. Never fails: every error
    /// becomes a [`ResultRecord::Failure`] carrying its text.
    pub async fn generate(&self, job: &GenerationJob) -> ResultRecord {
        let request = job.to_request();
        tracing::info!(
            client_id = %job.client_id,
            model = %request.model,
            "Generating image",
        );

        match tokio::time::timeout(self.deadline, self.generator.generate(&request)).await {
            Ok(Ok(payload)) => {
                tracing::info!(client_id = %job.client_id, "Image generation completed");
                ResultRecord::Success(payload)
            }
            Ok(Err(e)) => {
                tracing::error!(client_id = %job.client_id, error = %e, "Image generation failed");
                ResultRecord::Failure(e.to_string())
            }
            Err(_) => {
                tracing::error!(
                    client_id = %job.client_id,
                    deadline_secs = self.deadline.as_secs(),
                    "Image generation timed out",
                );
                ResultRecord::Failure(format!(
                    "Generation timed out after {}s",
                    self.deadline.as_secs()
                ))
            }
        }
    }

    /// Run `job` and record the outcome.
    ///
    /// Returns `Err` only when the record could not be written.
    pub async fn execute(&self, job: &GenerationJob) -> Result<ResultRecord, ExecuteError> {
        let record = self.generate(job).await;
        self.record(&job.client_id, &record).await?;
        Ok(record)
    }

    /// Write the terminal record for a job the queue gave up on.
    pub async fn record_abandoned(
        &self,
        client_id: &ClientId,
        attempts: u32,
        reason: &str,
    ) -> Result<(), ExecuteError> {
        let record = ResultRecord::Failure(format!(
            "Job abandoned after {attempts} attempts: {reason}"
        ));
        self.record(client_id, &record).await
    }

    /// Store `record` under the client's key, then announce it.
    ///
    /// A lost announcement only delays push delivery until the next poll,
    /// so publish failures are logged and swallowed.
    async fn record(&self, client_id: &ClientId, record: &ResultRecord) -> Result<(), ExecuteError> {
        self.store
            .put(client_id, &record.to_stored(), self.result_ttl)
            .await?;

        if let Err(e) = self
            .completions
            .publish(ResultReady::new(client_id.clone()))
            .await
        {
            tracing::warn!(client_id = %client_id, error = %e, "Completion event not published");
        }
        Ok(())
    }
}
