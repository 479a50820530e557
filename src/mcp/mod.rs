//! MCP (Model Context Protocol) client side.
//!
//! The `McpRpc` trait is the seam the client adapter depends on; the
//! `HttpMcpClient` is the bundled implementation speaking JSON-RPC over
//! HTTP. Anything else that can list and call tools (a stdio transport,
//! a test double) can stand in for it.

pub mod client;
pub mod error;
pub mod protocol;

pub use client::{HttpMcpClient, HttpMcpConfig};
pub use error::{McpError, McpResult};

use async_trait::async_trait;
use serde_json::Value;

use protocol::{McpTool, ToolCallResult};

/// Remote procedure calls the client adapter needs from an MCP server.
#[async_trait]
pub trait McpRpc: Send + Sync {
    /// `tools/list`
    async fn list_tools(&self) -> McpResult<Vec<McpTool>>;

    /// `tools/call`
    async fn call_tool(&self, name: &str, arguments: Value) -> McpResult<ToolCallResult>;
}
