use std::time::Duration;

use imgq_core::config::{env_parse, nonzero, ConfigError};
use imgq_core::result::RESULT_TTL;

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Jobs processed concurrently by one worker process.
    pub concurrency: usize,
    /// Sleep between queue polls when the queue is empty.
    pub poll_interval: Duration,
    /// Upper bound on one call to the generator.
    pub job_deadline: Duration,
    /// How long a claimed job stays leased before it is redelivered.
    pub lease: Duration,
    pub result_ttl: Duration,
    /// How often leases abandoned on their final attempt are reaped.
    pub reap_interval: Duration,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default |
    /// |---------------------------|---------|
    /// | `WORKER_CONCURRENCY`      | `4`     |
    /// | `WORKER_POLL_INTERVAL_MS` | `500`   |
    /// | `JOB_DEADLINE_SECS`       | `300`   |
    /// | `JOB_LEASE_SECS`          | `600`   |
    /// | `RESULT_TTL_SECS`         | `3600`  |
    /// | `REAP_INTERVAL_SECS`      | `60`    |
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            concurrency: env_parse("WORKER_CONCURRENCY", 4usize)?.max(1),
            poll_interval: Duration::from_millis(env_parse("WORKER_POLL_INTERVAL_MS", 500u64)?),
            job_deadline: Duration::from_secs(env_parse("JOB_DEADLINE_SECS", 300u64)?),
            lease: Duration::from_secs(env_parse("JOB_LEASE_SECS", 600u64)?),
            result_ttl: Duration::from_secs(env_parse(
                "RESULT_TTL_SECS",
                RESULT_TTL.as_secs(),
            )?),
            reap_interval: Duration::from_secs(env_parse("REAP_INTERVAL_SECS", 60u64)?),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject intervals of zero and a lease that could lapse while an
    /// attempt is still inside its deadline.
    pub fn validate(&self) -> Result<(), ConfigError> {
        nonzero("WORKER_POLL_INTERVAL_MS", self.poll_interval)?;
        nonzero("JOB_DEADLINE_SECS", self.job_deadline)?;
        nonzero("RESULT_TTL_SECS", self.result_ttl)?;
        nonzero("REAP_INTERVAL_SECS", self.reap_interval)?;
        if self.lease <= self.job_deadline {
            return Err(ConfigError::Invalid {
                key: "JOB_LEASE_SECS",
                value: self.lease.as_secs().to_string(),
                reason: format!(
                    "must exceed JOB_DEADLINE_SECS ({})",
                    self.job_deadline.as_secs()
                ),
            });
        }
        Ok(())
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            poll_interval: Duration::from_millis(500),
            job_deadline: Duration::from_secs(300),
            lease: Duration::from_secs(600),
            result_ttl: RESULT_TTL,
            reap_interval: Duration::from_secs(60),
        }
    }
}
