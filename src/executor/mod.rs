//! Tool execution abstraction.
//!
//! A chatbot never knows where its tools run. It holds an
//! `Arc<dyn ToolExecutor>` injected by the caller, which is either:
//! - `McpClientAdapter`: forwards calls over MCP JSON-RPC to a remote server
//! - `McpServerAdapter`: calls the in-process `ToolServer` directly
//!
//! Both report the same error taxonomy, so swapping one for the other
//! does not change chatbot behavior.

pub mod catalog;
pub mod client_adapter;
pub mod server_adapter;

pub use client_adapter::McpClientAdapter;
pub use server_adapter::McpServerAdapter;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::ToolExecutionError;
use crate::types::{ToolDescriptor, ToolOutput};

pub type ToolResult = Result<ToolOutput, ToolExecutionError>;

/// Runs a named tool with arguments and returns its result.
///
/// Implementations hold no per-call session state and must tolerate
/// concurrent independent calls.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Execute one tool invocation.
    async fn execute(&self, tool_name: &str, arguments: &Map<String, Value>) -> ToolResult;

    /// Descriptors of the tools this executor can run.
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ToolExecutionError> {
        Ok(catalog::observability_tools())
    }

    /// Short label for logs ("mcp-client", "in-process", ...).
    fn transport(&self) -> &str;
}

/// Add the namespace filter to a call's arguments when the tool accepts one.
///
/// A namespace the model already chose is left untouched.
pub fn inject_namespace(
    descriptor: Option<&ToolDescriptor>,
    namespace: Option<&str>,
    arguments: &mut Map<String, Value>,
) {
    let (Some(descriptor), Some(namespace)) = (descriptor, namespace) else {
        return;
    };
    if namespace.is_empty() || !descriptor.accepts("namespace") {
        return;
    }
    arguments
        .entry("namespace")
        .or_insert_with(|| Value::String(namespace.to_string()));
}
