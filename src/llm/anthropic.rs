//! Anthropic (Claude) Messages API client.
//!
//! Differences from the OpenAI format that matter here:
//! - the system prompt is a top-level field, not a message
//! - tool definitions use "input_schema" directly
//! - tool results are sent as user messages with "tool_result" content blocks
//! - roles must strictly alternate, so consecutive tool results (and any user
//!   text that follows them) are merged into a single user message

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{decode_response, LlmProvider, ProviderResult};
use crate::types::{ChatRequest, ChatResponse, Role, ToolCall};

pub const DEFAULT_API_BASE: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

/// Anthropic API client.
pub struct AnthropicProvider {
    api_key: String,
    api_base: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for AnthropicProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicProvider")
            .field("api_base", &self.api_base)
            .finish()
    }
}

// --- API Request Types ---

#[derive(Serialize)]
struct ApiRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool>,
}

#[derive(Serialize, Debug)]
struct ApiMessage {
    role: &'static str,
    content: ApiContent,
}

/// Content can be a simple string or an array of content blocks.
#[derive(Serialize, Debug)]
#[serde(untagged)]
enum ApiContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl ApiContent {
    fn into_blocks(self) -> Vec<ContentBlock> {
        match self {
            ApiContent::Text(text) => vec![ContentBlock::Text { text }],
            ApiContent::Blocks(blocks) => blocks,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
    /// Block types we do not consume (e.g. "thinking").
    #[serde(other, skip_serializing)]
    Unknown,
}

#[derive(Serialize)]
struct ApiTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

// --- API Response Types ---

#[derive(Deserialize, Debug)]
struct ApiResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

// --- Implementation ---

impl AnthropicProvider {
    pub fn new(api_key: String, api_base: Option<String>, client: reqwest::Client) -> Self {
        Self {
            api_key,
            api_base: api_base.unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            client,
        }
    }

    /// Append a turn, merging it into the previous one when the role repeats.
    fn push_turn(messages: &mut Vec<ApiMessage>, role: &'static str, content: ApiContent) {
        match messages.last_mut() {
            Some(last) if last.role == role => {
                let previous = std::mem::replace(&mut last.content, ApiContent::Blocks(vec![]));
                let mut blocks = previous.into_blocks();
                blocks.extend(content.into_blocks());
                last.content = ApiContent::Blocks(blocks);
            }
            _ => messages.push(ApiMessage { role, content }),
        }
    }

    /// Convert our internal request to the Messages API format.
    fn build_api_request(&self, request: &ChatRequest) -> ApiRequest {
        let mut system: Option<String> = None;
        let mut api_messages: Vec<ApiMessage> = Vec::new();

        for msg in &request.messages {
            match msg.role {
                Role::System => {
                    system = Some(match system {
                        Some(existing) => format!("{}\n\n{}", existing, msg.content),
                        None => msg.content.clone(),
                    });
                }
                Role::User => {
                    Self::push_turn(&mut api_messages, "user", ApiContent::Text(msg.content.clone()));
                }
                Role::Assistant => {
                    if msg.tool_calls.is_empty() {
                        Self::push_turn(
                            &mut api_messages,
                            "assistant",
                            ApiContent::Text(msg.content.clone()),
                        );
                        continue;
                    }
                    let mut blocks = Vec::new();
                    if !msg.content.is_empty() {
                        blocks.push(ContentBlock::Text {
                            text: msg.content.clone(),
                        });
                    }
                    for tc in &msg.tool_calls {
                        let input: serde_json::Value = serde_json::from_str(&tc.arguments)
                            .ok()
                            .filter(|v: &serde_json::Value| v.is_object())
                            .unwrap_or_else(|| serde_json::json!({}));
                        blocks.push(ContentBlock::ToolUse {
                            id: tc.id.clone(),
                            name: tc.name.clone(),
                            input,
                        });
                    }
                    Self::push_turn(&mut api_messages, "assistant", ApiContent::Blocks(blocks));
                }
                Role::Tool => {
                    let block = ContentBlock::ToolResult {
                        tool_use_id: msg.tool_call_id.clone().unwrap_or_default(),
                        content: msg.content.clone(),
                        is_error: msg.is_error,
                    };
                    Self::push_turn(&mut api_messages, "user", ApiContent::Blocks(vec![block]));
                }
            }
        }

        let tools: Vec<ApiTool> = request
            .tools
            .iter()
            .map(|t| ApiTool {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t.input_schema.clone(),
            })
            .collect();

        ApiRequest {
            model: request.model.clone(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            system,
            messages: api_messages,
            tools,
        }
    }

    /// Parse the API response into our internal ChatResponse.
    fn parse_response(api_response: ApiResponse) -> ChatResponse {
        let mut content = String::new();
        let mut tool_calls = Vec::new();

        for block in api_response.content {
            match block {
                ContentBlock::Text { text } => content.push_str(&text),
                ContentBlock::ToolUse { id, name, input } => {
                    tool_calls.push(ToolCall {
                        id,
                        name,
                        arguments: serde_json::to_string(&input).unwrap_or_else(|_| "{}".into()),
                    });
                }
                ContentBlock::ToolResult { .. } | ContentBlock::Unknown => {}
            }
        }

        debug!(
            stop_reason = api_response.stop_reason.as_deref().unwrap_or("none"),
            tool_calls = tool_calls.len(),
            "Anthropic response parsed"
        );

        ChatResponse { content, tool_calls }
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn chat_completion(&self, request: &ChatRequest) -> ProviderResult<ChatResponse> {
        let api_request = self.build_api_request(request);
        let url = format!("{}/v1/messages", self.api_base.trim_end_matches('/'));

        debug!(
            model = %api_request.model,
            messages = api_request.messages.len(),
            tools = api_request.tools.len(),
            "Sending Anthropic request"
        );

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&api_request)
            .send()
            .await?;

        let api_response: ApiResponse = decode_response(response).await?;
        Ok(Self::parse_response(api_response))
    }

    fn name(&self) -> &str {
        "Anthropic"
    }
}
