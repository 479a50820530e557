//! OpenAI-compatible chat completions client.
//!
//! Used for OpenAI itself and for local inference servers that expose the
//! same API (LlamaStack, vLLM).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{decode_response, LlmProvider, ProviderResult};
use crate::error::ProviderError;
use crate::types::{ChatRequest, ChatResponse, Role, ToolCall};

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

pub struct OpenAiCompatibleProvider {
    name: String,
    api_key: String,
    api_base: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiCompatibleProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatibleProvider")
            .field("name", &self.name)
            .field("api_base", &self.api_base)
            .finish()
    }
}

// --- API Request Types (OpenAI format) ---

#[derive(Serialize)]
struct ApiRequest {
    model: String,
    messages: Vec<ApiMessage>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool>,
}

#[derive(Serialize)]
struct ApiMessage {
    role: &'static str,
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl ApiMessage {
    fn text(role: &'static str, content: &str) -> Self {
        Self {
            role,
            content: Some(content.to_string()),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Serialize)]
struct ApiTool {
    r#type: &'static str,
    function: ApiFunction,
}

#[derive(Serialize)]
struct ApiFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Serialize, Debug, Clone)]
struct ApiToolCall {
    id: String,
    #[serde(default = "function_type")]
    r#type: String,
    function: ApiToolCallFunction,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Serialize, Debug, Clone)]
struct ApiToolCallFunction {
    name: String,
    arguments: String,
}

// --- API Response Types ---

#[derive(Deserialize, Debug)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Deserialize, Debug)]
struct ApiChoice {
    message: ApiResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ApiResponseToolCall>>,
}

/// Local servers may omit the call id or send arguments as an object.
#[derive(Deserialize, Debug)]
struct ApiResponseToolCall {
    #[serde(default)]
    id: String,
    function: ApiResponseFunction,
}

#[derive(Deserialize, Debug)]
struct ApiResponseFunction {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

impl ApiResponseToolCall {
    fn into_tool_call(self) -> ToolCall {
        let id = if self.id.is_empty() {
            format!("call_{}", uuid::Uuid::new_v4().simple())
        } else {
            self.id
        };
        let arguments = match self.function.arguments {
            serde_json::Value::String(raw) => raw,
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
        };
        ToolCall {
            id,
            name: self.function.name,
            arguments,
        }
    }
}

// --- Implementation ---

impl OpenAiCompatibleProvider {
    pub fn new(
        name: impl Into<String>,
        api_key: String,
        api_base: Option<String>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            name: name.into(),
            api_key,
            api_base: api_base.unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            client,
        }
    }

    fn build_api_request(&self, request: &ChatRequest) -> ApiRequest {
        let messages = request
            .messages
            .iter()
            .map(|msg| match msg.role {
                Role::System => ApiMessage::text("system", &msg.content),
                Role::User => ApiMessage::text("user", &msg.content),
                Role::Assistant => {
                    let tool_calls = if msg.tool_calls.is_empty() {
                        None
                    } else {
                        Some(
                            msg.tool_calls
                                .iter()
                                .map(|tc| ApiToolCall {
                                    id: tc.id.clone(),
                                    r#type: function_type(),
                                    function: ApiToolCallFunction {
                                        name: tc.name.clone(),
                                        arguments: tc.arguments.clone(),
                                    },
                                })
                                .collect(),
                        )
                    };
                    ApiMessage {
                        role: "assistant",
                        content: if msg.content.is_empty() {
                            None
                        } else {
                            Some(msg.content.clone())
                        },
                        tool_calls,
                        tool_call_id: None,
                    }
                }
                Role::Tool => ApiMessage {
                    role: "tool",
                    content: Some(msg.content.clone()),
                    tool_calls: None,
                    tool_call_id: msg.tool_call_id.clone(),
                },
            })
            .collect();

        let tools = request
            .tools
            .iter()
            .map(|t| ApiTool {
                r#type: "function",
                function: ApiFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.input_schema.clone(),
                },
            })
            .collect();

        ApiRequest {
            model: request.model.clone(),
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            tools,
        }
    }

    fn parse_response(api_response: ApiResponse) -> ProviderResult<ChatResponse> {
        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::invalid_response("no choices returned"))?;

        debug!(
            finish_reason = choice.finish_reason.as_deref().unwrap_or("none"),
            "Chat completion parsed"
        );

        let content = choice.message.content.unwrap_or_default();
        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(ApiResponseToolCall::into_tool_call)
            .collect();

        Ok(ChatResponse { content, tool_calls })
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    async fn chat_completion(&self, request: &ChatRequest) -> ProviderResult<ChatResponse> {
        let api_request = self.build_api_request(request);
        let url = format!("{}/chat/completions", self.api_base.trim_end_matches('/'));

        debug!(
            provider = %self.name,
            model = %api_request.model,
            messages = api_request.messages.len(),
            tools = api_request.tools.len(),
            "Sending chat completion request"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("Content-Type", "application/json")
            .json(&api_request)
            .send()
            .await?;

        let api_response: ApiResponse = decode_response(response).await?;
        Self::parse_response(api_response)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Message, ToolDescriptor};
    use serde_json::json;

    fn provider() -> OpenAiCompatibleProvider {
        OpenAiCompatibleProvider::new("OpenAI", "sk-test".into(), None, reqwest::Client::new())
    }

    #[test]
    fn test_tools_use_function_shape() {
        let req = provider().build_api_request(&ChatRequest {
            model: "gpt-4o-mini".into(),
            messages: vec![Message::system("sys"), Message::user("hi")],
            tools: vec![ToolDescriptor::new(
                "execute_promql",
                "Run PromQL",
                json!({"type": "object", "properties": {"query": {"type": "string"}}, "required": ["query"]}),
            )],
            max_tokens: 4096,
            temperature: 0.0,
        });
        let body = serde_json::to_value(&req).unwrap();
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "execute_promql");
        assert_eq!(body["tools"][0]["function"]["parameters"]["required"][0], "query");
        assert_eq!(body["messages"][0]["role"], "system");
    }

    #[test]
    fn test_tool_turns_keep_call_ids() {
        let call = ToolCall {
            id: "call_1".into(),
            name: "list_pods".into(),
            arguments: "{}".into(),
        };
        let req = provider().build_api_request(&ChatRequest {
            model: "gpt-4o-mini".into(),
            messages: vec![
                Message::user("pods?"),
                Message::assistant_with_tool_calls("", vec![call.clone()]),
                Message::tool_result(&call, r#"{"count":7}"#),
            ],
            tools: vec![],
            max_tokens: 4096,
            temperature: 0.0,
        });
        let body = serde_json::to_value(&req).unwrap();
        assert!(body.get("tools").is_none());
        assert!(body["messages"][1]["content"].is_null());
        assert_eq!(body["messages"][1]["tool_calls"][0]["id"], "call_1");
        assert_eq!(body["messages"][2]["role"], "tool");
        assert_eq!(body["messages"][2]["tool_call_id"], "call_1");
    }

    #[test]
    fn test_parse_response_without_choices() {
        let api: ApiResponse = serde_json::from_value(json!({"choices": []})).unwrap();
        let err = OpenAiCompatibleProvider::parse_response(api).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse(_)));
    }

    #[test]
    fn test_parse_tool_call_response() {
        let api: ApiResponse = serde_json::from_value(json!({
            "choices": [{
                "finish_reason": "tool_calls",
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_abc",
                        "type": "function",
                        "function": {"name": "list_pods", "arguments": "{\"namespace\":\"demo\"}"}
                    }]
                }
            }]
        }))
        .unwrap();
        let resp = OpenAiCompatibleProvider::parse_response(api).unwrap();
        assert!(resp.has_tool_calls());
        assert_eq!(resp.content, "");
        assert_eq!(resp.tool_calls[0].name, "list_pods");
    }

    #[test]
    fn test_object_arguments_and_missing_id() {
        let api: ApiResponse = serde_json::from_value(json!({
            "choices": [{
                "message": {
                    "content": "",
                    "tool_calls": [
                        {"function": {"name": "execute_promql", "arguments": {"query": "up"}}},
                        {"id": "", "type": "function", "function": {"name": "list_pods"}}
                    ]
                }
            }]
        }))
        .unwrap();
        let resp = OpenAiCompatibleProvider::parse_response(api).unwrap();
        let first = &resp.tool_calls[0];
        assert!(first.id.starts_with("call_"));
        let args: serde_json::Value = serde_json::from_str(&first.arguments).unwrap();
        assert_eq!(args, json!({"query": "up"}));

        let second = &resp.tool_calls[1];
        assert!(second.id.starts_with("call_"));
        assert_ne!(second.id, first.id);
        assert_eq!(second.arguments, "");
    }
}
