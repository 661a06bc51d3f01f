//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the cache tools.
use crate::tools::cache::{CacheCleanupParams, CacheGetParams, CacheSetParams, cleanup_impl, get_impl, set_impl};

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};
use simplecache_core::SimpleCache;

/// The MCP server handler for simplecache.
#[derive(Clone)]
pub struct SimpleCacheServer {
    cache: SimpleCache,
    tool_router: ToolRouter<Self>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl SimpleCacheServer {
    pub fn new(cache: SimpleCache) -> Self {
        Self { cache, tool_router: Self::tool_router() }
    }

    /// Look up a cached value.
    #[tool(description = "Get a cached JSON value by key. A checksum, when given, must match the one it was stored with.")]
    async fn cache_get(&self, params: Parameters<CacheGetParams>) -> Result<CallToolResult, McpError> {
        get_impl(&self.cache, params.0).await
    }

    /// Store a value in memory and on disk.
    #[tool(description = "Store a JSON value under a key, optionally with a checksum and a lifetime in seconds.")]
    async fn cache_set(&self, params: Parameters<CacheSetParams>) -> Result<CallToolResult, McpError> {
        set_impl(&self.cache, params.0).await
    }

    #[tool(description = "Drop expired entries now. Reports whether a sweep actually ran.")]
    async fn cache_cleanup(&self, params: Parameters<CacheCleanupParams>) -> Result<CallToolResult, McpError> {
        cleanup_impl(&self.cache, params.0).await
    }
}

impl ServerHandler for SimpleCacheServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "simplecache-mcp".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simplecache_core::Host;

    #[tokio::test]
    async fn test_tools_registered() {
        let cache = SimpleCache::open_in_memory(Host::default()).await.unwrap();
        let server = SimpleCacheServer::new(cache);

        let mut names: Vec<String> = server.tool_router.list_all().into_iter().map(|t| t.name.to_string()).collect();
        names.sort();
        assert_eq!(names, vec!["cache_cleanup", "cache_get", "cache_set"]);
    }

    #[tokio::test]
    async fn test_server_info() {
        let cache = SimpleCache::open_in_memory(Host::default()).await.unwrap();
        let info = SimpleCacheServer::new(cache).get_info();
        assert_eq!(info.server_info.name, "simplecache-mcp");
    }
}
