//! cache_cleanup tool implementation.
//!
//! Runs the expiry sweep on demand.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use simplecache_core::SimpleCache;

use super::json_result;

/// Parameters for the cache_cleanup tool. It takes none.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CacheCleanupParams {}

/// Output from the cache_cleanup tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheCleanupOutput {
    /// False when a sweep was already running or the cache is stopping.
    pub ran: bool,
}

/// Implementation of the cache_cleanup tool.
pub async fn cleanup_impl(cache: &SimpleCache, _params: CacheCleanupParams) -> Result<CallToolResult, McpError> {
    let ran = cache.do_cleanup().await;
    json_result(&CacheCleanupOutput { ran })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::cache::output_of;
    use simplecache_core::{CacheRow, Host};

    #[tokio::test]
    async fn test_cleanup_impl_removes_expired() {
        let cache = SimpleCache::open_in_memory(Host::default()).await.unwrap();
        let db = cache.store().unwrap();
        db.upsert(&CacheRow::new("old", 1, "1", 0)).await.unwrap();
        db.upsert(&CacheRow::new("new", i64::MAX, "2", 0)).await.unwrap();

        let result = cleanup_impl(&cache, CacheCleanupParams::default()).await.unwrap();
        let output: CacheCleanupOutput = output_of(&result);

        assert!(output.ran);
        assert_eq!(db.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_cleanup_impl_after_shutdown() {
        let cache = SimpleCache::open_in_memory(Host::default()).await.unwrap();
        cache.shutdown().await;

        let result = cleanup_impl(&cache, CacheCleanupParams::default()).await.unwrap();
        let output: CacheCleanupOutput = output_of(&result);
        assert!(!output.ran);
    }
}
