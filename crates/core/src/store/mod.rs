//! SQLite-backed persistent layer.
//!
//! This module provides the durable half of the cache using SQLite
//! with async access via tokio-rusqlite. It supports:
//!
//! - Integrity probe with drop-and-recreate repair on open
//! - WAL mode for concurrent access
//! - Replace and ignore-on-conflict write flavours
//! - Bounded retry when another writer holds the lock

pub mod connection;
pub mod entries;
pub mod retry;
pub mod schema;

pub use crate::Error;

pub use connection::CacheDb;
pub use entries::CacheRow;
pub use retry::{Attempt, RetryPolicy, with_retry};
