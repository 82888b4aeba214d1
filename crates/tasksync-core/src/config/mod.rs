//! Sync engine configuration.
//!
//! Every tunable of the engine lives in [`SyncConfig`]. Values come from a
//! JSON file (all fields optional) and can be overridden by `TASKSYNC_*`
//! environment variables.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::sync::RetryPolicy;
use crate::util::normalize_text_option;

/// Retry schedule as stored in configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            base_delay_ms: duration_millis(policy.base_delay),
            max_delay_ms: duration_millis(policy.max_delay),
            max_attempts: policy.max_attempts,
        }
    }
}

/// Tunables for the sync engine and its background worker
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    pub retry: RetryConfig,
    /// Upper bound for a single push or pull call
    pub request_timeout_ms: u64,
    /// Maximum tasks pushed per cycle
    pub batch_size: usize,
    /// Period of scheduled cycles
    pub sync_interval_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            request_timeout_ms: 10_000,
            batch_size: 100,
            sync_interval_secs: 60,
        }
    }
}

impl SyncConfig {
    /// Parse a JSON configuration document
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from `path`, falling back to defaults when absent
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw).map_err(|error| {
            Error::Config(format!("Failed to load config at {}: {error}", path.display()))
        })
    }

    /// Apply `TASKSYNC_*` overrides read through `lookup`
    ///
    /// `lookup` is usually `|key| std::env::var(key).ok()`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let read = |key: &str| normalize_text_option(lookup(key));

        if let Some(value) = read("TASKSYNC_RETRY_BASE_DELAY_MS") {
            self.retry.base_delay_ms = parse_override("TASKSYNC_RETRY_BASE_DELAY_MS", &value)?;
        }
        if let Some(value) = read("TASKSYNC_RETRY_MAX_DELAY_MS") {
            self.retry.max_delay_ms = parse_override("TASKSYNC_RETRY_MAX_DELAY_MS", &value)?;
        }
        if let Some(value) = read("TASKSYNC_RETRY_MAX_ATTEMPTS") {
            self.retry.max_attempts = parse_override("TASKSYNC_RETRY_MAX_ATTEMPTS", &value)?;
        }
        if let Some(value) = read("TASKSYNC_REQUEST_TIMEOUT_MS") {
            self.request_timeout_ms = parse_override("TASKSYNC_REQUEST_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = read("TASKSYNC_BATCH_SIZE") {
            self.batch_size = parse_override("TASKSYNC_BATCH_SIZE", &value)?;
        }
        if let Some(value) = read("TASKSYNC_SYNC_INTERVAL_SECS") {
            self.sync_interval_secs = parse_override("TASKSYNC_SYNC_INTERVAL_SECS", &value)?;
        }

        self.validate()
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(Error::Config("retry.max_attempts must be at least 1".into()));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(Error::Config(
                "retry.base_delay_ms must not exceed retry.max_delay_ms".into(),
            ));
        }
        if self.request_timeout_ms == 0 {
            return Err(Error::Config("request_timeout_ms must be positive".into()));
        }
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be positive".into()));
        }
        if self.sync_interval_secs == 0 {
            return Err(Error::Config("sync_interval_secs must be positive".into()));
        }
        Ok(())
    }

    /// Backoff schedule derived from `retry`
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
            max_attempts: self.retry.max_attempts,
        }
    }

    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub const fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }
}

fn parse_override<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::Config(format!("{key} has invalid value {value:?}")))
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_retry_policy() {
        let config = SyncConfig::default();
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config =
            SyncConfig::from_json_str(r#"{"batch_size": 25, "retry": {"max_attempts": 8}}"#)
                .unwrap();
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.retry.max_attempts, 8);
        assert_eq!(config.retry.base_delay_ms, 2_000);
        assert_eq!(config.request_timeout_ms, 10_000);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(SyncConfig::from_json_str(r#"{"batchsize": 25}"#).is_err());
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(SyncConfig::from_json_str(r#"{"batch_size": 0}"#).is_err());
        assert!(SyncConfig::from_json_str(
            r#"{"retry": {"base_delay_ms": 10000, "max_delay_ms": 10}}"#
        )
        .is_err());
    }

    #[test]
    fn overrides_take_precedence() {
        let env = HashMap::from([
            ("TASKSYNC_BATCH_SIZE", "7"),
            ("TASKSYNC_REQUEST_TIMEOUT_MS", " 2500 "),
            ("TASKSYNC_SYNC_INTERVAL_SECS", ""),
        ]);
        let mut config = SyncConfig::default();
        config
            .apply_overrides(|key| env.get(key).map(ToString::to_string))
            .unwrap();

        assert_eq!(config.batch_size, 7);
        assert_eq!(config.request_timeout(), Duration::from_millis(2_500));
        assert_eq!(config.sync_interval_secs, 60);
    }

    #[test]
    fn malformed_override_is_an_error() {
        let mut config = SyncConfig::default();
        let result = config.apply_overrides(|key| {
            (key == "TASKSYNC_RETRY_MAX_ATTEMPTS").then(|| "many".to_string())
        });
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let config = SyncConfig::load_from_path(&tmp.path().join("tasksync.json")).unwrap();
        assert_eq!(config, SyncConfig::default());
    }
}
