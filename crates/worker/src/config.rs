//! Worker configuration loaded from environment variables.
//!
//! Read once at startup by the binary. Every value has a default except
//! `DATABASE_URL`; bad values are reported as [`ConfigError`].

use std::str::FromStr;
use std::time::Duration;

use resq_core::retry::{RetryPolicy, DEFAULT_MAX_RETRIES};

use crate::reaper::ReaperSettings;
use crate::runner::WorkerSettings;

const DEFAULT_ENGINE_URL: &str = "http://localhost:8000";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
const DEFAULT_DISPATCH_TIMEOUT_SECS: u64 = 600;
const DEFAULT_STALE_JOB_TIMEOUT_SECS: u64 = 1800;
const DEFAULT_REAPER_INTERVAL_SECS: u64 = 300;

/// Upper bound for every duration setting (30 days).
const MAX_DURATION_SECS: u64 = 30 * 24 * 60 * 60;

/// Log output format for the worker binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Errors raised while reading worker configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} must be {expected}, got {value:?}")]
    Invalid {
        var: &'static str,
        expected: &'static str,
        value: String,
    },

    #[error(
        "STALE_JOB_TIMEOUT_SECS ({stale_secs}) must be greater than \
         DISPATCH_TIMEOUT_SECS ({dispatch_secs})"
    )]
    StaleTimeoutTooShort { stale_secs: u64, dispatch_secs: u64 },
}

/// Worker configuration loaded from environment variables.
///
/// Read once at startup; nothing re-reads the environment afterwards.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Postgres connection string for the Job Store.
    pub database_url: String,
    /// Pool size. One worker needs very few connections.
    pub database_max_connections: u32,
    /// Base URL of the research engine.
    pub engine_url: String,
    /// Name recorded in `jobs.claimed_by` and in log lines.
    pub worker_name: String,
    /// Pause between claim cycles.
    pub poll_interval: Duration,
    /// Hard bound on one research engine call.
    pub dispatch_timeout: Duration,
    /// How long a job may sit in `processing` before it is presumed orphaned.
    pub stale_timeout: Duration,
    /// How often the stale-job sweep runs.
    pub reaper_interval: Duration,
    pub retry_policy: RetryPolicy,
    pub log_format: LogFormat,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default                 |
    /// |----------------------------|-------------------------|
    /// | `DATABASE_URL`             | required                |
    /// | `DATABASE_MAX_CONNECTIONS` | `5`                     |
    /// | `AI_ENGINE_URL`            | `http://localhost:8000` |
    /// | `WORKER_NAME`              | `worker-<pid>`          |
    /// | `POLL_INTERVAL_SECS`       | `5`                     |
    /// | `DISPATCH_TIMEOUT_SECS`    | `600`                   |
    /// | `STALE_JOB_TIMEOUT_SECS`   | `1800`                  |
    /// | `REAPER_INTERVAL_SECS`     | `300`                   |
    /// | `MAX_RETRIES`              | `3`                     |
    /// | `LOG_FORMAT`               | `text`                  |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`WorkerConfig::from_env`] with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let database_url = get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let database_max_connections: u32 = parse_or(
            &get,
            "DATABASE_MAX_CONNECTIONS",
            DEFAULT_MAX_CONNECTIONS,
            "a positive integer",
        )?;
        if database_max_connections == 0 {
            return Err(ConfigError::Invalid {
                var: "DATABASE_MAX_CONNECTIONS",
                expected: "a positive integer",
                value: "0".into(),
            });
        }

        let engine_url = get("AI_ENGINE_URL").unwrap_or_else(|| DEFAULT_ENGINE_URL.into());

        let worker_name =
            get("WORKER_NAME").unwrap_or_else(|| format!("worker-{}", std::process::id()));

        let poll_interval = positive_secs(&get, "POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL_SECS)?;
        let dispatch_timeout =
            positive_secs(&get, "DISPATCH_TIMEOUT_SECS", DEFAULT_DISPATCH_TIMEOUT_SECS)?;
        let stale_timeout =
            positive_secs(&get, "STALE_JOB_TIMEOUT_SECS", DEFAULT_STALE_JOB_TIMEOUT_SECS)?;
        let reaper_interval =
            positive_secs(&get, "REAPER_INTERVAL_SECS", DEFAULT_REAPER_INTERVAL_SECS)?;

        // A live dispatch must never look stale to the reaper.
        if stale_timeout <= dispatch_timeout {
            return Err(ConfigError::StaleTimeoutTooShort {
                stale_secs: stale_timeout.as_secs(),
                dispatch_secs: dispatch_timeout.as_secs(),
            });
        }

        let max_retries: i32 = parse_or(&get, "MAX_RETRIES", DEFAULT_MAX_RETRIES, "an integer >= 1")?;
        let retry_policy = RetryPolicy::new(max_retries).map_err(|_| ConfigError::Invalid {
            var: "MAX_RETRIES",
            expected: "an integer >= 1",
            value: max_retries.to_string(),
        })?;

        let log_format = match get("LOG_FORMAT").as_deref().map(str::to_ascii_lowercase) {
            None => LogFormat::Text,
            Some(v) if v == "text" => LogFormat::Text,
            Some(v) if v == "json" => LogFormat::Json,
            Some(v) => {
                return Err(ConfigError::Invalid {
                    var: "LOG_FORMAT",
                    expected: "`text` or `json`",
                    value: v,
                })
            }
        };

        Ok(Self {
            database_url,
            database_max_connections,
            engine_url,
            worker_name,
            poll_interval,
            dispatch_timeout,
            stale_timeout,
            reaper_interval,
            retry_policy,
            log_format,
        })
    }

    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            name: self.worker_name.clone(),
            poll_interval: self.poll_interval,
            dispatch_timeout: self.dispatch_timeout,
            retry_policy: self.retry_policy,
        }
    }

    pub fn reaper_settings(&self) -> ReaperSettings {
        ReaperSettings {
            stale_timeout: self.stale_timeout,
            interval: self.reaper_interval,
            retry_policy: self.retry_policy,
        }
    }
}

fn parse_or<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
    expected: &'static str,
) -> Result<T, ConfigError> {
    match get(var) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            var,
            expected,
            value: raw,
        }),
    }
}

fn positive_secs(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: u64,
) -> Result<Duration, ConfigError> {
    const EXPECTED: &str = "a number of seconds between 1 and 2592000";
    let secs: u64 = parse_or(get, var, default, EXPECTED)?;
    if secs == 0 || secs > MAX_DURATION_SECS {
        return Err(ConfigError::Invalid {
            var,
            expected: EXPECTED,
            value: secs.to_string(),
        });
    }
    Ok(Duration::from_secs(secs))
}
