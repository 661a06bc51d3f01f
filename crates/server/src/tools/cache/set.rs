//! cache_set tool implementation.
//!
//! Stores a value in both cache layers.

use std::time::Duration;

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use simplecache_core::{Error, SimpleCache};

use super::{json_result, require_key};

/// Parameters for the cache_set tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheSetParams {
    /// The key to store the value under.
    pub key: String,

    /// Any JSON value.
    pub value: Value,

    /// Optional checksum; later reads must present the same one.
    #[serde(default)]
    pub checksum: String,

    /// Lifetime in seconds (default: the configured TTL).
    #[serde(default)]
    pub ttl_secs: Option<u64>,
}

/// Output from the cache_set tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheSetOutput {
    pub key: String,
    /// Seconds until the entry expires.
    pub expires_in_secs: u64,
}

/// Implementation of the cache_set tool.
pub async fn set_impl(cache: &SimpleCache, params: CacheSetParams) -> Result<CallToolResult, McpError> {
    require_key(&params.key)?;
    if params.ttl_secs == Some(0) {
        return Err(Error::InvalidInput("ttl_secs must be greater than 0".to_string()).into());
    }

    let ttl = params.ttl_secs.map_or_else(|| cache.default_ttl(), Duration::from_secs);
    cache
        .set(&params.key, &params.value, &params.checksum, Some(ttl))
        .await;

    json_result(&CacheSetOutput { key: params.key, expires_in_secs: ttl.as_secs() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::cache::output_of;
    use serde_json::json;
    use simplecache_core::Host;

    fn params(key: &str, ttl_secs: Option<u64>) -> CacheSetParams {
        CacheSetParams { key: key.to_string(), value: json!([1, 2, 3]), checksum: "v1".to_string(), ttl_secs }
    }

    #[tokio::test]
    async fn test_set_impl_stores_value() {
        let cache = SimpleCache::open_in_memory(Host::default()).await.unwrap();

        let result = set_impl(&cache, params("list", Some(60))).await.unwrap();
        let output: CacheSetOutput = output_of(&result);

        assert_eq!(output.expires_in_secs, 60);
        assert_eq!(cache.get::<Value>("list", "v1").await, Some(json!([1, 2, 3])));
    }

    #[tokio::test]
    async fn test_set_impl_default_ttl() {
        let cache = SimpleCache::open_in_memory(Host::default()).await.unwrap();

        let result = set_impl(&cache, params("list", None)).await.unwrap();
        let output: CacheSetOutput = output_of(&result);

        assert_eq!(output.expires_in_secs, cache.default_ttl().as_secs());
    }

    #[tokio::test]
    async fn test_set_impl_rejects_bad_input() {
        let cache = SimpleCache::open_in_memory(Host::default()).await.unwrap();

        assert!(set_impl(&cache, params("", None)).await.is_err());
        assert!(set_impl(&cache, params("list", Some(0))).await.is_err());
        assert!(cache.get::<Value>("list", "v1").await.is_none());
    }
}
