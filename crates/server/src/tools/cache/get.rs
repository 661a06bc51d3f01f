//! cache_get tool implementation.
//!
//! Retrieves a cached value by key.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use simplecache_core::{Error, SimpleCache};

use super::{json_result, require_key};

/// Parameters for the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetParams {
    /// The key the value was stored under.
    pub key: String,

    /// Checksum the value was stored with, if any.
    #[serde(default)]
    pub checksum: String,
}

/// Output from the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetOutput {
    pub key: String,
    /// The cached value.
    pub value: Value,
}

/// Implementation of the cache_get tool.
pub async fn get_impl(cache: &SimpleCache, params: CacheGetParams) -> Result<CallToolResult, McpError> {
    require_key(&params.key)?;

    let value = cache
        .get::<Value>(&params.key, &params.checksum)
        .await
        .ok_or_else(|| Error::CacheMiss(params.key.clone()))?;

    json_result(&CacheGetOutput { key: params.key, value })
}
