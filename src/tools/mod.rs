//! In-process tool server.
//!
//! This module defines the `Tool` trait and the `ToolServer` registry that
//! the server-side executor calls directly.
//!
//! Key concepts:
//! - **Tool trait**: every tool provides its name, description, JSON Schema
//!   for parameters, and an execute method
//! - **ToolServer**: holds the registered tools, validates arguments against
//!   each tool's schema and dispatches calls by name
//! - Tool implementations report failures with `anyhow`; the server turns
//!   them into `ToolExecutionError::Failed` so callers see one taxonomy

pub mod insight;
pub mod prometheus;
pub mod promql;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

use crate::error::ToolExecutionError;
use crate::executor::ToolResult;
use crate::types::{ToolDescriptor, ToolOutput};

pub use prometheus::PrometheusClient;

/// Trait that all tools must implement.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g. "execute_promql").
    fn name(&self) -> &str;

    /// What the tool does. The model reads this to decide when to use it.
    fn description(&self) -> &str;

    /// JSON Schema describing the tool's input parameters.
    fn parameters_schema(&self) -> Value;

    /// Execute the tool with already validated JSON arguments.
    async fn execute(&self, params: Value) -> Result<ToolOutput>;

    fn to_descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(self.name(), self.description(), self.parameters_schema())
    }
}

/// Registry of tools served in-process.
#[derive(Default)]
pub struct ToolServer {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolServer {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Register a tool. A later tool with the same name replaces the earlier one.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.retain(|t| t.name() != tool.name());
        self.tools.push(tool);
    }

    /// Descriptors of all registered tools, in registration order.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(|t| t.to_descriptor()).collect()
    }

    fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.iter().find(|t| t.name() == name).map(|t| t.as_ref())
    }

    /// Validate the arguments and run the named tool.
    pub async fn execute(&self, name: &str, arguments: &Map<String, Value>) -> ToolResult {
        let tool = self
            .find(name)
            .ok_or_else(|| ToolExecutionError::NotFound(name.to_string()))?;

        validate_arguments(name, &tool.parameters_schema(), arguments)?;

        debug!(tool = name, args = arguments.len(), "Executing in-process tool");
        tool.execute(Value::Object(arguments.clone()))
            .await
            .map_err(|e| ToolExecutionError::failed(name, format!("{:#}", e)))
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Check required arguments and primitive JSON types against a schema.
fn validate_arguments(
    tool: &str,
    schema: &Value,
    arguments: &Map<String, Value>,
) -> Result<(), ToolExecutionError> {
    let required = schema
        .get("required")
        .and_then(|r| r.as_array())
        .into_iter()
        .flatten()
        .filter_map(|v| v.as_str());
    for name in required {
        if arguments.get(name).is_none_or(Value::is_null) {
            return Err(ToolExecutionError::invalid_arguments(
                tool,
                format!("missing required argument '{}'", name),
            ));
        }
    }

    let Some(properties) = schema.get("properties").and_then(|p| p.as_object()) else {
        return Ok(());
    };
    for (name, value) in arguments {
        let Some(expected) = properties
            .get(name)
            .and_then(|p| p.get("type"))
            .and_then(|t| t.as_str())
        else {
            continue;
        };
        if value.is_null() {
            continue;
        }
        let matches = match expected {
            "string" => value.is_string(),
            "integer" => value.is_i64() || value.is_u64(),
            "number" => value.is_number(),
            "boolean" => value.is_boolean(),
            "array" => value.is_array(),
            "object" => value.is_object(),
            _ => true,
        };
        if !matches {
            return Err(ToolExecutionError::invalid_arguments(
                tool,
                format!("argument '{}' must be of type {}", name, expected),
            ));
        }
    }
    Ok(())
}

/// Read a string argument, treating blank strings as absent.
pub(crate) fn optional_str<'a>(params: &'a Value, name: &str) -> Option<&'a str> {
    params
        .get(name)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

pub(crate) fn required_str<'a>(params: &'a Value, name: &str) -> Result<&'a str> {
    optional_str(params, name)
        .ok_or_else(|| anyhow::anyhow!("Missing required parameter: {}", name))
}

/// Create a server with all observability tools backed by one Prometheus client.
pub fn create_observability_server(client: PrometheusClient) -> ToolServer {
    let client = Arc::new(client);
    let mut server = ToolServer::new();
    server.register(Box::new(promql::SearchMetricsTool::new(client.clone())));
    server.register(Box::new(promql::MetricMetadataTool::new(client.clone())));
    server.register(Box::new(promql::ExecutePromqlTool::new(client.clone())));
    server.register(Box::new(promql::LabelValuesTool::new(client)));
    server.register(Box::new(insight::SuggestQueriesTool::new()));
    server.register(Box::new(insight::ExplainResultsTool::new()));
    server
}
