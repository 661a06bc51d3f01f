//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `cleanup_interval_secs` or `default_ttl_secs` is 0
    /// - `retry_attempts` is 0 or exceeds 100
    /// - `retry_backoff_ms` exceeds 60 seconds
    /// - `busy_timeout_ms` exceeds 5 minutes
    ///
    /// Returns `ConfigError::Missing` if `db_path` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.db_path.as_os_str().is_empty() {
            return Err(ConfigError::Missing {
                field: "db_path".into(),
                hint: "Set SIMPLECACHE_DB_PATH environment variable".into(),
            });
        }

        if self.cleanup_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "cleanup_interval_secs".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if self.default_ttl_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "default_ttl_secs".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if self.retry_attempts == 0 {
            return Err(ConfigError::Invalid { field: "retry_attempts".into(), reason: "must be at least 1".into() });
        }
        if self.retry_attempts > 100 {
            return Err(ConfigError::Invalid { field: "retry_attempts".into(), reason: "must not exceed 100".into() });
        }

        if self.retry_backoff_ms > 60_000 {
            return Err(ConfigError::Invalid {
                field: "retry_backoff_ms".into(),
                reason: "must not exceed 1 minute (60000ms)".into(),
            });
        }

        if self.busy_timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "busy_timeout_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        Ok(())
    }
}
