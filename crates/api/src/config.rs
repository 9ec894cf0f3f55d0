use std::str::FromStr;
use std::time::Duration;

use imgq_core::config::{env_flag, env_or, env_parse, nonzero, ConfigError};
use imgq_core::queue::{RetryPolicy, DEFAULT_MAX_RETRIES};
use imgq_core::result::RESULT_TTL;

use crate::notifications::NotifierConfig;
use crate::ws::HeartbeatConfig;

/// Which implementation backs the queue and result store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// PostgreSQL tables shared with out-of-process workers.
    Postgres,
    /// Process-local structures; workers run inside the API process.
    Memory,
}

impl Backend {
    pub fn as_str(self) -> &'static str {
        match self {
            Backend::Postgres => "postgres",
            Backend::Memory => "memory",
        }
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Backend::Postgres),
            "memory" => Ok(Backend::Memory),
            other => Err(format!("unknown backend '{other}', expected postgres or memory")),
        }
    }
}

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Upper bound on post-shutdown cleanup in seconds (default: `10`).
    pub shutdown_timeout_secs: u64,
    pub backend: Backend,
    /// Required when `backend` is [`Backend::Postgres`].
    pub database_url: Option<String>,
    pub heartbeat: HeartbeatConfig,
    pub notifier: NotifierConfig,
    /// Additional attempts after a job's first failed one.
    pub job_max_retries: u32,
    pub job_retry_delay: Duration,
    pub result_ttl: Duration,
    /// How often expired result records are deleted.
    pub retention_interval: Duration,
    /// Worker loops hosted in-process (memory backend only).
    pub inprocess_workers: usize,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                          | Default                    |
    /// |----------------------------------|----------------------------|
    /// | `HOST`                           | `0.0.0.0`                  |
    /// | `PORT`                           | `8000`                     |
    /// | `CORS_ORIGINS`                   | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS`           | `30`                       |
    /// | `SHUTDOWN_TIMEOUT_SECS`          | `10`                       |
    /// | `BACKEND`                        | `postgres`                 |
    /// | `DATABASE_URL`                   | (required for postgres)    |
    /// | `HEARTBEAT_INTERVAL_SECS`        | `15`                       |
    /// | `HEARTBEAT_MAX_MISSED`           | `2`                        |
    /// | `NOTIFIER_POLL_INTERVAL_MS`      | `2000`                     |
    /// | `REDELIVER_ON_CONNECT`           | `true`                     |
    /// | `RESULT_TTL_SECS`                | `3600`                     |
    /// | `JOB_MAX_RETRIES`                | `4`                        |
    /// | `JOB_RETRY_DELAY_SECS`           | `0`                        |
    /// | `RESULT_RETENTION_INTERVAL_SECS` | `300`                      |
    /// | `INPROCESS_WORKERS`              | `2`                        |
    pub fn from_env() -> Result<Self, ConfigError> {
        let cors_origins: Vec<String> = env_or("CORS_ORIGINS", "http://localhost:5173")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let backend_raw = env_or("BACKEND", "postgres");
        let backend = backend_raw
            .parse::<Backend>()
            .map_err(|reason| ConfigError::Invalid {
                key: "BACKEND",
                value: backend_raw.clone(),
                reason,
            })?;

        let database_url = std::env::var("DATABASE_URL").ok().filter(|s| !s.is_empty());
        if backend == Backend::Postgres && database_url.is_none() {
            return Err(ConfigError::Missing { key: "DATABASE_URL" });
        }

        let result_ttl = Duration::from_secs(env_parse("RESULT_TTL_SECS", RESULT_TTL.as_secs())?);

        let heartbeat = HeartbeatConfig {
            interval: Duration::from_secs(env_parse("HEARTBEAT_INTERVAL_SECS", 15u64)?),
            max_missed: env_parse("HEARTBEAT_MAX_MISSED", 2u32)?,
        };

        let notifier = NotifierConfig {
            poll_interval: Duration::from_millis(env_parse("NOTIFIER_POLL_INTERVAL_MS", 2000u64)?),
            redeliver_on_connect: env_flag("REDELIVER_ON_CONNECT", true)?,
            watch_ttl: result_ttl,
        };

        let config = Self {
            host: env_or("HOST", "0.0.0.0"),
            port: env_parse("PORT", 8000u16)?,
            cors_origins,
            request_timeout_secs: env_parse("REQUEST_TIMEOUT_SECS", 30u64)?,
            shutdown_timeout_secs: env_parse("SHUTDOWN_TIMEOUT_SECS", 10u64)?,
            backend,
            database_url,
            heartbeat,
            notifier,
            job_max_retries: env_parse("JOB_MAX_RETRIES", DEFAULT_MAX_RETRIES)?,
            job_retry_delay: Duration::from_secs(env_parse("JOB_RETRY_DELAY_SECS", 0u64)?),
            result_ttl,
            retention_interval: Duration::from_secs(env_parse(
                "RESULT_RETENTION_INTERVAL_SECS",
                300u64,
            )?),
            inprocess_workers: env_parse("INPROCESS_WORKERS", 2usize)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject zero intervals; the timers built from them would panic.
    pub fn validate(&self) -> Result<(), ConfigError> {
        nonzero("HEARTBEAT_INTERVAL_SECS", self.heartbeat.interval)?;
        nonzero("NOTIFIER_POLL_INTERVAL_MS", self.notifier.poll_interval)?;
        nonzero("RESULT_TTL_SECS", self.result_ttl)?;
        nonzero("RESULT_RETENTION_INTERVAL_SECS", self.retention_interval)?;
        nonzero(
            "REQUEST_TIMEOUT_SECS",
            Duration::from_secs(self.request_timeout_secs),
        )?;
        Ok(())
    }

    /// Retry policy attached to every enqueued job.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.job_max_retries, self.job_retry_delay)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn memory_config() -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            cors_origins: vec![],
            request_timeout_secs: 30,
            shutdown_timeout_secs: 10,
            backend: Backend::Memory,
            database_url: None,
            heartbeat: HeartbeatConfig::default(),
            notifier: NotifierConfig::default(),
            job_max_retries: DEFAULT_MAX_RETRIES,
            job_retry_delay: Duration::ZERO,
            result_ttl: RESULT_TTL,
            retention_interval: Duration::from_secs(300),
            inprocess_workers: 0,
        }
    }

    #[test]
    fn default_intervals_are_valid() {
        memory_config().validate().unwrap();
    }

    #[test]
    fn zero_notifier_poll_is_rejected() {
        let mut config = memory_config();
        config.notifier.poll_interval = Duration::ZERO;
        assert_matches!(
            config.validate(),
            Err(ConfigError::Invalid { key: "NOTIFIER_POLL_INTERVAL_MS", .. })
        );
    }

    #[test]
    fn zero_heartbeat_is_rejected() {
        let mut config = memory_config();
        config.heartbeat.interval = Duration::ZERO;
        assert_matches!(
            config.validate(),
            Err(ConfigError::Invalid { key: "HEARTBEAT_INTERVAL_SECS", .. })
        );
    }

    #[test]
    fn zero_retention_interval_is_rejected() {
        let mut config = memory_config();
        config.retention_interval = Duration::ZERO;
        assert_matches!(
            config.validate(),
            Err(ConfigError::Invalid { key: "RESULT_RETENTION_INTERVAL_SECS", .. })
        );
    }

    #[test]
    fn backend_parses_case_insensitively() {
        assert_eq!("Memory".parse::<Backend>(), Ok(Backend::Memory));
        assert_eq!("postgresql".parse::<Backend>(), Ok(Backend::Postgres));
        assert!("redis".parse::<Backend>().is_err());
    }

    #[test]
    fn backend_names_round_trip() {
        for backend in [Backend::Postgres, Backend::Memory] {
            assert_eq!(backend.as_str().parse::<Backend>(), Ok(backend));
        }
    }
}
