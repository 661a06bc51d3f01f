//! Unified error types for simplecache.
//!
//! None of these escape `get`/`set`: the engine logs them and degrades to a
//! miss or a write that was not applied.

use rmcp::model::{ErrorCode, ErrorData as McpError};
use tokio_rusqlite::rusqlite;

/// Unified error types for the cache and its hosts.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., empty key).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// No valid cache entry for the given key.
    #[error("CACHE_MISS: {0}")]
    CacheMiss(String),

    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Database stayed locked for every retry attempt.
    #[error("CACHE_BUSY: database still locked after {attempts} attempts")]
    StoreBusy { attempts: u32 },

    /// Stored text could not be decoded.
    #[error("CORRUPT_ENTRY: {0}")]
    CorruptEntry(String),

    /// Persistent store could neither be opened nor recreated.
    #[error("STORE_UNAVAILABLE: {0}")]
    StoreUnavailable(String),

    /// A legacy cache item could not be parsed.
    #[error("CORRUPT_LEGACY_SOURCE: {0}")]
    CorruptLegacySource(String),

    /// Filesystem operation failed.
    #[error("IO_ERROR: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error means the database is temporarily locked by another writer.
    pub fn is_busy(&self) -> bool {
        match self {
            Error::Database(tokio_rusqlite::Error::Error(e)) => matches!(
                e.sqlite_error_code(),
                Some(rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked)
            ),
            Error::StoreBusy { .. } => true,
            _ => false,
        }
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let (code, message) = match &err {
            Error::InvalidInput(msg) => (-32602, msg.clone()),
            Error::CacheMiss(msg) => (-32001, msg.clone()),
            Error::Database(e) => (-32002, e.to_string()),
            Error::StoreBusy { .. } => (-32003, err.to_string()),
            Error::CorruptEntry(msg) => (-32004, msg.clone()),
            Error::StoreUnavailable(msg) => (-32005, msg.clone()),
            Error::CorruptLegacySource(msg) => (-32006, msg.clone()),
            Error::Io(e) => (-32007, e.to_string()),
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sqlite_failure(code: i32) -> Error {
        rusqlite::Error::SqliteFailure(rusqlite::ffi::Error::new(code), None).into()
    }

    #[test]
    fn test_error_display() {
        let err = Error::CacheMiss("abc123".to_string());
        assert!(err.to_string().contains("CACHE_MISS"));
        assert!(err.to_string().contains("abc123"));
    }

    #[test]
    fn test_error_to_mcp_error() {
        let err = Error::CacheMiss("abc123".to_string());
        let mcp_err: McpError = err.into();
        assert_eq!(mcp_err.code.0, -32001);
    }

    #[test]
    fn test_busy_classification() {
        assert!(sqlite_failure(rusqlite::ffi::SQLITE_BUSY).is_busy());
        assert!(sqlite_failure(rusqlite::ffi::SQLITE_LOCKED).is_busy());
        assert!(!sqlite_failure(rusqlite::ffi::SQLITE_CORRUPT).is_busy());
        assert!(!Error::CorruptEntry("x".into()).is_busy());
    }
}
