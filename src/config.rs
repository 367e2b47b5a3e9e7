//! Configuration for Store backends and Queue defaults.
//!
//! Follows the teacher's `from_env()` convention (see `RedisQueue::from_env`
//! in the retrieved corpus): construct programmatically for tests, or via
//! `from_env()` for production, reading a small set of environment
//! variables with sane defaults.

use std::env;

/// Global default for a Queue's job timeout when none is set on the job
/// (spec.md §3, "Queue" — `default_timeout`).
pub const DEFAULT_QUEUE_TIMEOUT_SECS: u64 = 180;

/// Safety cap on watch/transaction retries before surfacing
/// `CoreError::WatchContention` (spec.md §9 Design Notes).
pub const MAX_WATCH_ATTEMPTS: u32 = 1000;

/// Connection configuration for `RedisStore`.
#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    pub redis_url: String,
}

impl RedisStoreConfig {
    /// Loads a `.env` file if present, then reads `REDIS_URL` from the
    /// environment.
    pub fn from_env() -> Result<Self, String> {
        dotenvy::dotenv().ok();
        let redis_url =
            env::var("REDIS_URL").map_err(|_| "REDIS_URL environment variable not set".to_string())?;
        Ok(Self { redis_url })
    }
}

/// Construction options for a `Queue` (spec.md §6 "Configuration options").
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub name: String,
    pub default_timeout: u64,
    pub async_mode: bool,
}

impl QueueConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default_timeout: DEFAULT_QUEUE_TIMEOUT_SECS,
            async_mode: true,
        }
    }

    /// Reads overrides from `QUEUE_DEFAULT_TIMEOUT_SECS` / `QUEUE_ASYNC_MODE`,
    /// falling back to the defaults above when unset or unparsable.
    pub fn from_env(name: impl Into<String>) -> Self {
        let default_timeout = env::var("QUEUE_DEFAULT_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_QUEUE_TIMEOUT_SECS);
        let async_mode = env::var("QUEUE_ASYNC_MODE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(true);
        Self {
            name: name.into(),
            default_timeout,
            async_mode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_config_defaults() {
        let cfg = QueueConfig::new("default");
        assert_eq!(cfg.default_timeout, DEFAULT_QUEUE_TIMEOUT_SECS);
        assert!(cfg.async_mode);
    }
}
