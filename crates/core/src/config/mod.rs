//! Cache configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (SIMPLECACHE_*)
//! 2. TOML config file (if SIMPLECACHE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::store::RetryPolicy;

mod validation;

pub use validation::ConfigError;

/// Cache configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (SIMPLECACHE_*)
/// 2. TOML config file (if SIMPLECACHE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the SQLite cache database.
    ///
    /// Set via SIMPLECACHE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Whether the session property layer is consulted and written.
    ///
    /// Set via SIMPLECACHE_ENABLE_MEM_CACHE environment variable.
    #[serde(default = "default_true")]
    pub enable_mem_cache: bool,

    /// Minimum time between two cleanup sweeps, in seconds.
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,

    /// Expiration applied by `set` when the caller passes none, in seconds.
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,

    /// Attempts made against a locked database before giving up.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Pause between two attempts against a locked database, in milliseconds.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// SQLite busy handler timeout, in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Directory holding legacy cache files to import once.
    ///
    /// Set via SIMPLECACHE_LEGACY_DIR environment variable.
    #[serde(default)]
    pub legacy_dir: Option<PathBuf>,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./simplecache.db")
}

fn default_true() -> bool {
    true
}

fn default_cleanup_interval_secs() -> u64 {
    4 * 60 * 60
}

fn default_ttl_secs() -> u64 {
    30 * 24 * 60 * 60
}

fn default_retry_attempts() -> u32 {
    10
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_busy_timeout_ms() -> u64 {
    30_000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            enable_mem_cache: true,
            cleanup_interval_secs: default_cleanup_interval_secs(),
            default_ttl_secs: default_ttl_secs(),
            retry_attempts: default_retry_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            busy_timeout_ms: default_busy_timeout_ms(),
            legacy_dir: None,
        }
    }
}

impl AppConfig {
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Retry settings for locked-database handling.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy { attempts: self.retry_attempts, backoff: Duration::from_millis(self.retry_backoff_ms) }
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `SIMPLECACHE_`
    /// 2. TOML file from `SIMPLECACHE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("SIMPLECACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("SIMPLECACHE_")
                .ignore(&["config_file"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        Self::from_figment(figment)
    }

    /// Extract and validate a configuration from an assembled figment.
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
