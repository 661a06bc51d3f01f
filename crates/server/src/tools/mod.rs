//! MCP tool implementations.
//!
//! This module contains all tools exposed by the simplecache-mcp server.

pub mod cache;
