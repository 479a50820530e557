//! Google Gemini generateContent client.
//!
//! Gemini differs from the other providers in three ways that matter here:
//! - the assistant role is called "model" and the system prompt travels
//!   as `systemInstruction`
//! - function calls carry no id, and results are keyed by function name
//! - its schema dialect rejects some JSON Schema keywords, so descriptors
//!   are rewritten (not trimmed) before sending

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;

use super::{decode_response, LlmProvider, ProviderResult};
use crate::error::ProviderError;
use crate::types::{ChatRequest, ChatResponse, Role, ToolCall, ToolDescriptor};

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";

/// Schema keywords Gemini does not accept and that carry no information.
const DROPPED_KEYWORDS: &[&str] = &["$schema", "$id", "additionalProperties", "title"];

/// Google Gemini client.
pub struct GoogleProvider {
    api_key: String,
    api_base: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for GoogleProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleProvider")
            .field("api_base", &self.api_base)
            .finish()
    }
}

// ── Gemini wire types ──

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiContent {
    role: String,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
    },
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: GeminiFunctionCall,
    },
    FunctionResponse {
        #[serde(rename = "functionResponse")]
        function_response: GeminiFunctionResponse,
    },
    /// Part kinds we pass through untouched (e.g. executableCode).
    Other(Value),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiFunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiFunctionResponse {
    name: String,
    response: Value,
}

#[derive(Debug, Clone, Serialize)]
struct GeminiToolDecl {
    #[serde(rename = "functionDeclarations")]
    function_declarations: Vec<GeminiFunctionDeclaration>,
}

#[derive(Debug, Clone, Serialize)]
struct GeminiFunctionDeclaration {
    name: String,
    description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct GeminiApiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

// --- Implementation ---

impl GoogleProvider {
    pub fn new(api_key: String, api_base: Option<String>, client: reqwest::Client) -> Self {
        Self {
            api_key,
            api_base: api_base.unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            client,
        }
    }

    /// Convert conversation turns to Gemini contents, merging repeated roles.
    fn to_gemini_contents(request: &ChatRequest) -> Vec<GeminiContent> {
        let mut contents: Vec<GeminiContent> = Vec::new();

        for msg in &request.messages {
            let (role, parts) = match msg.role {
                Role::System => continue,
                Role::User => ("user", vec![GeminiPart::Text { text: msg.content.clone() }]),
                Role::Assistant => {
                    let mut parts = Vec::new();
                    if !msg.content.is_empty() {
                        parts.push(GeminiPart::Text { text: msg.content.clone() });
                    }
                    for tc in &msg.tool_calls {
                        let args = serde_json::from_str::<Value>(&tc.arguments)
                            .ok()
                            .filter(Value::is_object)
                            .unwrap_or_else(|| json!({}));
                        parts.push(GeminiPart::FunctionCall {
                            function_call: GeminiFunctionCall {
                                name: tc.name.clone(),
                                args,
                            },
                        });
                    }
                    ("model", parts)
                }
                Role::Tool => {
                    let key = if msg.is_error { "error" } else { "content" };
                    let name = msg
                        .tool_name
                        .clone()
                        .or_else(|| msg.tool_call_id.clone())
                        .unwrap_or_default();
                    (
                        "user",
                        vec![GeminiPart::FunctionResponse {
                            function_response: GeminiFunctionResponse {
                                name,
                                response: json!({ key: msg.content }),
                            },
                        }],
                    )
                }
            };

            if parts.is_empty() {
                continue;
            }
            match contents.last_mut() {
                Some(last) if last.role == role => last.parts.extend(parts),
                _ => contents.push(GeminiContent {
                    role: role.to_string(),
                    parts,
                }),
            }
        }

        contents
    }

    /// Convert descriptors to Gemini function declarations.
    fn to_gemini_tools(tools: &[ToolDescriptor]) -> Vec<GeminiToolDecl> {
        if tools.is_empty() {
            return vec![];
        }
        vec![GeminiToolDecl {
            function_declarations: tools
                .iter()
                .map(|t| {
                    let has_properties = t
                        .input_schema
                        .get("properties")
                        .and_then(Value::as_object)
                        .is_some_and(|p| !p.is_empty());
                    GeminiFunctionDeclaration {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        parameters: has_properties.then(|| to_gemini_schema(&t.input_schema)),
                    }
                })
                .collect(),
        }]
    }

    fn from_gemini_response(resp: GeminiApiResponse) -> ProviderResult<ChatResponse> {
        let candidate = resp
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::invalid_response("no response candidates from Gemini"))?;

        let content = candidate.content.filter(|c| !c.parts.is_empty()).ok_or_else(|| {
            ProviderError::invalid_response(format!(
                "no response parts from Gemini (finishReason: {}); the model may have been blocked",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            ))
        })?;

        let mut text = String::new();
        let mut tool_calls = Vec::new();
        for part in content.parts {
            match part {
                GeminiPart::Text { text: t } => text.push_str(&t),
                GeminiPart::FunctionCall { function_call } => tool_calls.push(ToolCall {
                    id: format!("call_{}", uuid::Uuid::new_v4().simple()),
                    name: function_call.name,
                    arguments: serde_json::to_string(&function_call.args)
                        .unwrap_or_else(|_| "{}".into()),
                }),
                GeminiPart::FunctionResponse { .. } | GeminiPart::Other(_) => {}
            }
        }

        Ok(ChatResponse {
            content: text,
            tool_calls,
        })
    }
}

/// Rewrite a JSON Schema into the dialect Gemini accepts.
///
/// `default` values are folded into the description instead of being lost.
fn to_gemini_schema(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, value) in map {
                if DROPPED_KEYWORDS.contains(&key.as_str()) || key == "default" {
                    continue;
                }
                let converted = match key.as_str() {
                    "properties" => match value {
                        Value::Object(props) => Value::Object(
                            props
                                .iter()
                                .map(|(name, prop)| (name.clone(), to_gemini_schema(prop)))
                                .collect(),
                        ),
                        other => other.clone(),
                    },
                    "items" => to_gemini_schema(value),
                    _ => value.clone(),
                };
                out.insert(key.clone(), converted);
            }
            if let Some(default) = map.get("default") {
                let note = format!("Default: {}.", render_default(default));
                let description = match out.get("description").and_then(Value::as_str) {
                    Some(existing) if !existing.is_empty() => format!("{} {}", existing, note),
                    _ => note,
                };
                out.insert("description".into(), Value::String(description));
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

fn render_default(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl LlmProvider for GoogleProvider {
    async fn chat_completion(&self, request: &ChatRequest) -> ProviderResult<ChatResponse> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.api_base.trim_end_matches('/'),
            request.model
        );

        let system = request
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let contents = Self::to_gemini_contents(request);
        let content_count = contents.len();

        let mut body = json!({
            "contents": contents,
            "generationConfig": {
                "temperature": request.temperature,
                "maxOutputTokens": request.max_tokens,
            },
        });
        if !system.is_empty() {
            body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
        }
        let tools = Self::to_gemini_tools(&request.tools);
        if !tools.is_empty() {
            body["tools"] = serde_json::to_value(&tools)?;
        }

        debug!(model = %request.model, contents = content_count, "Sending Gemini request");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let api_response: GeminiApiResponse = decode_response(response).await?;
        Self::from_gemini_response(api_response)
    }

    fn name(&self) -> &str {
        "Google Gemini"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;

    fn request(messages: Vec<Message>) -> ChatRequest {
        ChatRequest {
            model: "gemini-2.5-flash".into(),
            messages,
            tools: vec![],
            max_tokens: 4096,
            temperature: 0.0,
        }
    }

    #[test]
    fn test_contents_filter_system_and_rename_assistant() {
        let contents = GoogleProvider::to_gemini_contents(&request(vec![
            Message::system("sys"),
            Message::user("hello"),
            Message::assistant("hi"),
        ]));
        assert_eq!(contents.len(), 2);
        assert_eq!(contents[0].role, "user");
        assert_eq!(contents[1].role, "model");
    }

    #[test]
    fn test_function_responses_are_merged_and_named() {
        let a = ToolCall {
            id: "call_1".into(),
            name: "search_metrics".into(),
            arguments: r#"{"pattern":"gpu"}"#.into(),
        };
        let b = ToolCall {
            id: "call_2".into(),
            name: "execute_promql".into(),
            arguments: "not json".into(),
        };
        let contents = GoogleProvider::to_gemini_contents(&request(vec![
            Message::user("gpu?"),
            Message::assistant_with_tool_calls("", vec![a.clone(), b.clone()]),
            Message::tool_result(&a, "DCGM_FI_DEV_GPU_UTIL"),
            Message::tool_error(&b, "Error: bad query"),
        ]));

        assert_eq!(contents.len(), 3);
        let body = serde_json::to_value(&contents[2]).unwrap();
        assert_eq!(body["role"], "user");
        assert_eq!(body["parts"][0]["functionResponse"]["name"], "search_metrics");
        assert_eq!(
            body["parts"][0]["functionResponse"]["response"]["content"],
            "DCGM_FI_DEV_GPU_UTIL"
        );
        assert_eq!(
            body["parts"][1]["functionResponse"]["response"]["error"],
            "Error: bad query"
        );

        let model_turn = serde_json::to_value(&contents[1]).unwrap();
        assert_eq!(model_turn["parts"][1]["functionCall"]["args"], json!({}));
    }

    #[test]
    fn test_schema_translation_keeps_every_property() {
        let tools = vec![ToolDescriptor::new(
            "execute_promql",
            "Run PromQL",
            json!({
                "$schema": "http://json-schema.org/draft-07/schema#",
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "query": {"type": "string", "description": "PromQL"},
                    "time_range": {"type": "string", "description": "Range", "default": "now"},
                    "labels": {"type": "array", "items": {"type": "string", "title": "label"}}
                },
                "required": ["query"]
            }),
        )];
        let decls = GoogleProvider::to_gemini_tools(&tools);
        let params = decls[0].function_declarations[0].parameters.clone().unwrap();

        assert!(params.get("$schema").is_none());
        assert!(params.get("additionalProperties").is_none());
        let props = params["properties"].as_object().unwrap();
        assert_eq!(props.len(), 3);
        assert_eq!(params["properties"]["time_range"]["description"], "Range Default: now.");
        assert!(params["properties"]["time_range"].get("default").is_none());
        assert!(params["properties"]["labels"]["items"].get("title").is_none());
        assert_eq!(params["required"][0], "query");
    }

    #[test]
    fn test_tools_without_properties_omit_parameters() {
        let tools = vec![ToolDescriptor::new(
            "list_namespaces",
            "List namespaces",
            json!({"type": "object", "properties": {}}),
        )];
        let decls = GoogleProvider::to_gemini_tools(&tools);
        assert!(decls[0].function_declarations[0].parameters.is_none());
        assert!(GoogleProvider::to_gemini_tools(&[]).is_empty());
    }

    #[test]
    fn test_response_with_function_call() {
        let resp: GeminiApiResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [
                    {"functionCall": {"name": "search_metrics", "args": {"pattern": "pod"}}}
                ]},
                "finishReason": "STOP"
            }]
        }))
        .unwrap();
        let parsed = GoogleProvider::from_gemini_response(resp).unwrap();
        assert_eq!(parsed.tool_calls.len(), 1);
        assert!(parsed.tool_calls[0].id.starts_with("call_"));
        assert_eq!(parsed.tool_calls[0].arguments, r#"{"pattern":"pod"}"#);
    }

    #[test]
    fn test_blocked_response_is_an_error() {
        let resp: GeminiApiResponse = serde_json::from_value(json!({
            "candidates": [{"finishReason": "SAFETY"}]
        }))
        .unwrap();
        let err = GoogleProvider::from_gemini_response(resp).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));

        let empty: GeminiApiResponse = serde_json::from_value(json!({})).unwrap();
        assert!(GoogleProvider::from_gemini_response(empty).is_err());
    }
}
