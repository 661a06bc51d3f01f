//! simplecache-mcp entry point.
//!
//! Boots the cache and serves it as MCP tools on stdio.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use anyhow::Result;
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use simplecache_core::{AppConfig, Host, SessionProperties, ShutdownToken, SimpleCache};
use tracing_subscriber::EnvFilter;

mod handler;
mod tools;

// Single-threaded so every operation shares the primary store connection.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    let abort = ShutdownToken::new();
    let cache = SimpleCache::initialize(&config, Host::new(SessionProperties::new(), abort.clone())).await?;

    tracing::info!(db = %config.db_path.display(), "Starting simplecache-mcp on stdio transport");

    let handler = handler::SimpleCacheServer::new(cache.clone());
    let server = serve_server(handler, stdio()).await?;

    tokio::select! {
        result = server.waiting() => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, stopping background work");
            abort.cancel();
        }
    }

    cache.shutdown().await;
    Ok(())
}
