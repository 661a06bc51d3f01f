//! Cache MCP tools.
//!
//! Thin wrappers over the engine's get, set and cleanup operations.

pub mod cleanup;
pub mod get;
pub mod set;

pub use cleanup::{CacheCleanupParams, cleanup_impl};
pub use get::{CacheGetParams, get_impl};
pub use set::{CacheSetParams, set_impl};

use rmcp::{ErrorData as McpError, model::{CallToolResult, Content}};
use serde::Serialize;
use simplecache_core::Error;

fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize output: {e}")))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

fn require_key(key: &str) -> Result<(), Error> {
    if key.trim().is_empty() {
        return Err(Error::InvalidInput("key must not be empty".to_string()));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn output_of<T: serde::de::DeserializeOwned>(result: &CallToolResult) -> T {
    let content_val = serde_json::to_value(&result.content[0]).unwrap();
    let text = content_val
        .get("text")
        .and_then(|v| v.as_str())
        .expect("Expected text field in content");
    serde_json::from_str(text).unwrap()
}
