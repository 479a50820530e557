//! Executor that forwards tool calls to a remote MCP server.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use super::{ToolExecutor, ToolResult};
use crate::error::ToolExecutionError;
use crate::mcp::protocol::{McpTool, ToolCallResult, INVALID_PARAMS, METHOD_NOT_FOUND};
use crate::mcp::{McpError, McpRpc};
use crate::types::{ToolDescriptor, ToolOutput};

/// Proxies `execute` to `tools/call` on an MCP server.
///
/// Makes exactly one RPC per call; retry policy belongs to the caller.
pub struct McpClientAdapter {
    rpc: Arc<dyn McpRpc>,
}

impl McpClientAdapter {
    pub fn new(rpc: Arc<dyn McpRpc>) -> Self {
        Self { rpc }
    }
}

impl std::fmt::Debug for McpClientAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpClientAdapter").finish_non_exhaustive()
    }
}

/// Map an RPC failure onto the tool error taxonomy.
fn map_error(tool: &str, error: McpError) -> ToolExecutionError {
    match error {
        McpError::ToolNotFound(name) => ToolExecutionError::NotFound(name),
        McpError::Rpc { code, .. } if code == METHOD_NOT_FOUND => {
            ToolExecutionError::NotFound(tool.to_string())
        }
        McpError::Rpc { code, message } if code == INVALID_PARAMS => {
            // MCP servers report unknown tools as invalid params.
            let lower = message.to_lowercase();
            if lower.contains("unknown tool") || lower.contains("not found") {
                ToolExecutionError::NotFound(tool.to_string())
            } else {
                ToolExecutionError::invalid_arguments(tool, message)
            }
        }
        McpError::Rpc { code, message } => {
            ToolExecutionError::failed(tool, format!("{} (code {})", message, code))
        }
        other => ToolExecutionError::transport(tool, other.to_string()),
    }
}

/// Convert a `tools/call` result into a tool output.
fn map_result(tool: &str, result: ToolCallResult) -> ToolResult {
    if result.is_error {
        let message = result.joined_text();
        let message = if message.is_empty() {
            "tool reported an error without details".to_string()
        } else {
            message
        };
        return Err(ToolExecutionError::failed(tool, message));
    }
    if let Some(structured) = result.structured_content {
        return Ok(ToolOutput::Json(structured));
    }
    Ok(ToolOutput::Text(result.joined_text()))
}

fn to_descriptor(tool: McpTool) -> ToolDescriptor {
    ToolDescriptor::new(tool.name, tool.description.unwrap_or_default(), tool.input_schema)
}

#[async_trait]
impl ToolExecutor for McpClientAdapter {
    async fn execute(&self, tool_name: &str, arguments: &Map<String, Value>) -> ToolResult {
        debug!(tool = tool_name, "Forwarding tool call over MCP");
        let result = self
            .rpc
            .call_tool(tool_name, Value::Object(arguments.clone()))
            .await
            .map_err(|e| map_error(tool_name, e))?;
        let output = map_result(tool_name, result);
        if let Err(e) = &output {
            warn!(tool = tool_name, error = %e, "MCP tool call failed");
        }
        output
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ToolExecutionError> {
        let tools = self
            .rpc
            .list_tools()
            .await
            .map_err(|e| ToolExecutionError::transport("tools/list", e.to_string()))?;
        Ok(tools.into_iter().map(to_descriptor).collect())
    }

    fn transport(&self) -> &str {
        "mcp-client"
    }
}
