//! Sync engine configuration.

use furrow_core::RetryPolicy;
use std::env;
use std::time::Duration;

/// Tunables for the sync engine.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Backoff schedule and attempt cap for failed pushes
    pub retry: RetryPolicy,
    /// How long settled outbox entries and resolved conflicts are kept
    pub retention: chrono::Duration,
    /// Maximum pushes in flight at once (distinct entities only)
    pub push_concurrency: usize,
    /// Bound on each push's wall-clock time; expiry counts as a failure
    pub push_timeout: Duration,
    /// How often the monitor probes the remote for reachability
    pub probe_interval: Duration,
    /// How often a cycle runs with no other trigger
    pub sync_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            retention: chrono::Duration::days(7),
            push_concurrency: 4,
            push_timeout: Duration::from_secs(30),
            probe_interval: Duration::from_secs(30),
            sync_interval: Duration::from_secs(60),
        }
    }
}

impl SyncConfig {
    /// Load configuration from `FURROW_*` environment variables, falling
    /// back to defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(v) = read_var("FURROW_MAX_RETRY_ATTEMPTS")? {
            config.retry.max_attempts = v as u32;
        }
        if let Some(v) = read_var("FURROW_RETENTION_DAYS")? {
            config.retention = chrono::Duration::days(v as i64);
        }
        if let Some(v) = read_var("FURROW_PUSH_CONCURRENCY")? {
            config.push_concurrency = (v as usize).max(1);
        }
        if let Some(v) = read_var("FURROW_PUSH_TIMEOUT_SECS")? {
            config.push_timeout = Duration::from_secs(v);
        }
        if let Some(v) = read_var("FURROW_PROBE_INTERVAL_SECS")? {
            config.probe_interval = Duration::from_secs(v);
        }
        if let Some(v) = read_var("FURROW_SYNC_INTERVAL_SECS")? {
            config.sync_interval = Duration::from_secs(v);
        }

        Ok(config)
    }
}

fn read_var(key: &'static str) -> Result<Option<u64>, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
        Err(_) => Ok(None),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}
