//! Core data types shared by the chatbots, provider clients and executors.
//!
//! This module defines the conversation turns, tool descriptors and
//! request/response shapes that every provider translates to and from
//! its own wire format.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// --- Message Roles ---

/// The role of a turn in the conversation.
///
/// - `System`: instructions and context for the model
/// - `User`: the human's question
/// - `Assistant`: the model's reply, possibly carrying tool calls
/// - `Tool`: the result of a tool invocation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

// --- Tool Call ---

/// A tool invocation requested by the model.
///
/// `arguments` keeps the JSON-encoded object exactly as the provider
/// produced it; the tool loop decodes it right before execution so a
/// malformed payload becomes a recoverable tool error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    /// Identifier used to match the result back to the request
    pub id: String,
    /// Name of the tool to invoke (e.g. "execute_promql")
    pub name: String,
    /// JSON-encoded argument object
    pub arguments: String,
}

// --- Tool Descriptor ---

/// Provider-neutral description of a tool.
///
/// Every chatbot translates this into its provider's function-calling
/// schema. The translation must keep every tool and every property.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    /// JSON Schema describing the tool's input object
    pub input_schema: Value,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }

    /// Returns true if the schema declares a property with this name.
    pub fn accepts(&self, property: &str) -> bool {
        self.input_schema
            .get("properties")
            .and_then(|p| p.get(property))
            .is_some()
    }

    /// Names listed under the schema's `required` array.
    pub fn required(&self) -> Vec<&str> {
        self.input_schema
            .get("required")
            .and_then(|r| r.as_array())
            .map(|r| r.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default()
    }
}

// --- Tool Output ---

/// Successful tool result, either plain text or structured JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    Text(String),
    Json(Value),
}

impl ToolOutput {
    /// Render the output as the text fed back to the model.
    pub fn to_text(&self) -> String {
        match self {
            ToolOutput::Text(text) => text.clone(),
            ToolOutput::Json(value) => match value {
                Value::String(s) => s.clone(),
                other => serde_json::to_string(other).unwrap_or_default(),
            },
        }
    }
}

// --- Messages ---

/// A single turn in the conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Tool calls requested by an assistant turn
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// For tool turns, the id of the originating call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// For tool turns, the name of the tool (Gemini keys results by name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// For tool turns, whether the content describes a failure
    #[serde(default)]
    pub is_error: bool,
}

impl Message {
    fn bare(role: Role, content: String) -> Self {
        Self {
            role,
            content,
            tool_calls: vec![],
            tool_call_id: None,
            tool_name: None,
            is_error: false,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::bare(Role::System, content.into())
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::bare(Role::User, content.into())
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::bare(Role::Assistant, content.into())
    }

    /// Create an assistant turn that requests tools.
    pub fn assistant_with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::bare(Role::Assistant, content.into())
        }
    }

    /// Create a successful tool result turn.
    pub fn tool_result(call: &ToolCall, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(call.id.clone()),
            tool_name: Some(call.name.clone()),
            ..Self::bare(Role::Tool, content.into())
        }
    }

    /// Create a failed tool result turn.
    pub fn tool_error(call: &ToolCall, content: impl Into<String>) -> Self {
        Self {
            is_error: true,
            ..Self::tool_result(call, content)
        }
    }
}

// --- Chat Request / Response ---

/// A provider-neutral request for one model turn.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Model selector sent on the wire (provider prefix already stripped)
    pub model: String,
    pub messages: Vec<Message>,
    /// Empty for models that cannot call tools natively
    pub tools: Vec<ToolDescriptor>,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// One model turn: text, tool calls, or both.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

impl ChatResponse {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_descriptor_accepts_namespace() {
        let tool = ToolDescriptor::new(
            "execute_promql",
            "Run a query",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "namespace": {"type": "string"}
                },
                "required": ["query"]
            }),
        );
        assert!(tool.accepts("namespace"));
        assert!(!tool.accepts("pattern"));
        assert_eq!(tool.required(), vec!["query"]);
    }

    #[test]
    fn test_tool_output_text() {
        assert_eq!(ToolOutput::Text("ok".into()).to_text(), "ok");
        assert_eq!(ToolOutput::Json(json!({"count": 7})).to_text(), r#"{"count":7}"#);
        assert_eq!(ToolOutput::Json(json!("plain")).to_text(), "plain");
    }

    #[test]
    fn test_tool_error_turn() {
        let call = ToolCall {
            id: "call_1".into(),
            name: "search_metrics".into(),
            arguments: "{}".into(),
        };
        let msg = Message::tool_error(&call, "Error: boom");
        assert_eq!(msg.role, Role::Tool);
        assert!(msg.is_error);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(msg.tool_name.as_deref(), Some("search_metrics"));
    }
}
