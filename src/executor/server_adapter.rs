//! Executor that runs tools inside this process.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use super::{ToolExecutor, ToolResult};
use crate::error::ToolExecutionError;
use crate::tools::ToolServer;
use crate::types::ToolDescriptor;

/// Calls the in-process `ToolServer` directly, with no RPC hop.
pub struct McpServerAdapter {
    server: Arc<ToolServer>,
}

impl McpServerAdapter {
    pub fn new(server: Arc<ToolServer>) -> Self {
        Self { server }
    }
}

impl std::fmt::Debug for McpServerAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpServerAdapter")
            .field("tools", &self.server.len())
            .finish()
    }
}

#[async_trait]
impl ToolExecutor for McpServerAdapter {
    async fn execute(&self, tool_name: &str, arguments: &Map<String, Value>) -> ToolResult {
        debug!(tool = tool_name, "Calling in-process tool");
        let output = self.server.execute(tool_name, arguments).await;
        if let Err(e) = &output {
            warn!(tool = tool_name, error = %e, "In-process tool call failed");
        }
        output
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ToolExecutionError> {
        Ok(self.server.descriptors())
    }

    fn transport(&self) -> &str {
        "in-process"
    }
}
