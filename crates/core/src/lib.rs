//! Core of simplecache: a two-layer TTL cache.
//!
//! This crate provides:
//! - The cache engine over a session property bag and SQLite
//! - Validity tokens, bounded lock retry and the cleanup sweep
//! - Busy-task tracking for an orderly shutdown
//! - Legacy file import and a memoization helper
//! - Unified error types and layered configuration

pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod legacy;
pub mod lifecycle;
pub mod memoize;
pub mod memory;
pub mod store;

pub use config::{AppConfig, ConfigError};
pub use engine::{Host, SimpleCache};
pub use error::Error;
pub use lifecycle::{AbortSignal, BusyRegistry, NeverAbort, ShutdownToken};
pub use memoize::{CacheHolder, CallKey, CallOptions, try_use_cache, use_cache};
pub use memory::{PropertyBag, SessionProperties};
pub use store::{CacheDb, CacheRow, RetryPolicy};
