//! Fallback bot for local models without native tool calling.
//!
//! The model is told to request a tool by writing a single line
//!
//! ```text
//! USE TOOL: execute_promql({"query": "up"})
//! ```
//!
//! and the reply is parsed deterministically. A reply without such a line
//! is the final answer and is returned as-is.

use async_trait::async_trait;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::tool_loop::{iteration_limit_message, trim_history, CANCELLED_MESSAGE, EMPTY_ANSWER_MESSAGE};
use super::{prompt, BotProfile, ChatBot, ChatBotKind, ChatOutcome, ChatStatus, ProgressCallback, ToolLoop};
use crate::error::{ConfigurationError, ParsingError};
use crate::executor::ToolExecutor;
use crate::factory::ChatbotSettings;
use crate::llm::openai_compatible::OpenAiCompatibleProvider;
use crate::llm::{http_client, LlmProvider};
use crate::types::{Message, ToolCall, ToolDescriptor};

const TOOL_LINE_PATTERN: &str = r"(?im)^[\s>*`-]*use tool:\s*([A-Za-z_][A-Za-z0-9_]*)\s*\((.*)\)[\s`.]*$";

const FREE_TEXT_INSTRUCTIONS: &str = "---

**TOOL REQUEST FORMAT:**

You cannot call functions directly. To use a tool, reply with exactly one line:

USE TOOL: tool_name({\"argument\": \"value\"})

and nothing else. You will then receive the tool output and can either request
another tool the same way or write the final answer. Request one tool at a time.
When you have enough data, answer in plain markdown without any USE TOOL line.";

/// Find a tool request in a model reply.
///
/// Exactly one distinct tool may be requested; its arguments may be empty,
/// a JSON object, or `key=value` pairs.
pub fn parse_tool_request(
    text: &str,
    tools: &[ToolDescriptor],
) -> Result<(String, Map<String, Value>), ParsingError> {
    let Ok(re) = Regex::new(TOOL_LINE_PATTERN) else {
        return Err(ParsingError::NoToolRequest);
    };

    let mut requests: Vec<(String, String)> = Vec::new();
    for cap in re.captures_iter(text) {
        if let (Some(name), Some(args)) = (cap.get(1), cap.get(2)) {
            requests.push((name.as_str().to_string(), args.as_str().to_string()));
        }
    }

    let Some((name, raw_args)) = requests.first().cloned() else {
        return Err(ParsingError::NoToolRequest);
    };
    let mut distinct: Vec<String> = Vec::new();
    for (n, _) in &requests {
        if !distinct.contains(n) {
            distinct.push(n.clone());
        }
    }
    if distinct.len() > 1 {
        return Err(ParsingError::Ambiguous(distinct));
    }
    if !tools.iter().any(|t| t.name == name) {
        return Err(ParsingError::UnknownTool(name));
    }

    let arguments = parse_free_text_arguments(&name, &raw_args)?;

    // Repeating a request is fine; asking the same tool for two things is not.
    let mut variants = vec![raw_args.trim().to_string()];
    for (_, raw) in requests.iter().skip(1) {
        let raw = raw.trim();
        let same = raw == raw_args.trim()
            || parse_free_text_arguments(&name, raw).is_ok_and(|other| other == arguments);
        if !same && !variants.iter().any(|v| v == raw) {
            variants.push(raw.to_string());
        }
    }
    if variants.len() > 1 {
        return Err(ParsingError::Ambiguous(
            variants.iter().map(|raw| format!("{}({})", name, raw)).collect(),
        ));
    }

    Ok((name, arguments))
}

/// Parse `{...}` or `key=value, key2="value 2"` argument text.
pub fn parse_free_text_arguments(tool: &str, raw: &str) -> Result<Map<String, Value>, ParsingError> {
    let raw = raw.trim();
    let invalid = |reason: String| ParsingError::InvalidArguments {
        tool: tool.to_string(),
        reason,
    };
    if raw.is_empty() {
        return Ok(Map::new());
    }
    if raw.starts_with('{') {
        return match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(invalid("expected a JSON object".to_string())),
            Err(e) => Err(invalid(format!("invalid JSON: {}", e))),
        };
    }

    let mut arguments = Map::new();
    for pair in split_top_level(raw) {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        let Some((key, value)) = pair.split_once('=') else {
            return Err(invalid(format!("expected key=value, got '{}'", pair)));
        };
        let key = unquote(key.trim());
        if key.is_empty() {
            return Err(invalid(format!("empty argument name in '{}'", pair)));
        }
        let value = value.trim();
        let value = serde_json::from_str::<Value>(value)
            .unwrap_or_else(|_| Value::String(unquote(value).to_string()));
        arguments.insert(key.to_string(), value);
    }
    Ok(arguments)
}

/// Split on commas outside quotes and brackets.
fn split_top_level(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quote: Option<char> = None;
    let mut depth = 0i32;
    let mut start = 0;
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match (quote, c) {
            (Some(_), '\\') => escaped = true,
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '{' | '[' | '(') => depth += 1,
            (None, '}' | ']' | ')') => depth -= 1,
            (None, ',') if depth == 0 => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

fn unquote(text: &str) -> &str {
    for q in ['"', '\''] {
        if text.len() >= 2 && text.starts_with(q) && text.ends_with(q) {
            return &text[1..text.len() - 1];
        }
    }
    text
}

/// Tool list rendered into the prompt.
fn tool_listing(tools: &[ToolDescriptor]) -> String {
    let mut out = String::from("**Tools you can request:**\n");
    for tool in tools {
        let properties: Vec<String> = tool
            .input_schema
            .get("properties")
            .and_then(|p| p.as_object())
            .map(|p| p.keys().cloned().collect())
            .unwrap_or_default();
        let required = tool.required();
        let args: Vec<String> = properties
            .iter()
            .map(|p| {
                if required.contains(&p.as_str()) {
                    p.clone()
                } else {
                    format!("{}?", p)
                }
            })
            .collect();
        out.push_str(&format!("- {}({}): {}\n", tool.name, args.join(", "), tool.description));
    }
    out
}

pub struct DeterministicChatBot {
    model_name: String,
    tool_loop: ToolLoop,
}

impl DeterministicChatBot {
    pub const MAX_TOOL_RESULT_LEN: usize = 5_000;

    /// Connect to the local OpenAI-compatible endpoint from `settings`.
    pub fn new(
        model_name: impl Into<String>,
        executor: Arc<dyn ToolExecutor>,
        settings: &ChatbotSettings,
    ) -> Result<Self, ConfigurationError> {
        let client = http_client(settings.request_timeout)
            .map_err(|e| ConfigurationError::HttpClient(e.to_string()))?;
        let provider = OpenAiCompatibleProvider::new(
            "Local",
            settings.local_api_token.clone(),
            Some(settings.llama_stack_url.clone()),
            client,
        );
        Ok(Self::with_provider(model_name, Arc::new(provider), executor, settings))
    }

    pub fn with_provider(
        model_name: impl Into<String>,
        provider: Arc<dyn LlmProvider>,
        executor: Arc<dyn ToolExecutor>,
        settings: &ChatbotSettings,
    ) -> Self {
        let model_name = model_name.into();
        let profile = BotProfile::new(
            ChatBotKind::Deterministic.label(),
            model_name.clone(),
            FREE_TEXT_INSTRUCTIONS,
            Self::MAX_TOOL_RESULT_LEN,
        )
        .with_limits(settings.max_iterations, settings.max_history_messages);
        Self {
            model_name,
            tool_loop: ToolLoop::new(provider, executor, profile),
        }
    }

    pub fn profile(&self) -> &BotProfile {
        self.tool_loop.profile()
    }

    async fn run(
        &self,
        question: &str,
        namespace: Option<&str>,
        progress: Option<&ProgressCallback>,
        cancel: &CancellationToken,
    ) -> ChatOutcome {
        let profile = self.tool_loop.profile();
        let tools = self.tool_loop.tool_descriptors().await;
        let system = format!(
            "{}\n\n{}",
            prompt::system_prompt(profile.instructions, namespace),
            tool_listing(&tools)
        );

        // `messages` is what the model sees; `transcript` keeps the tool turns.
        let mut messages = vec![Message::system(system), Message::user(question)];
        let mut transcript = messages.clone();
        let mut tool_calls = 0;

        let finish = |answer: String, status, iterations, tool_calls, transcript: Vec<Message>| ChatOutcome {
            answer,
            status,
            iterations,
            tool_calls,
            transcript,
        };

        for iteration in 1..=profile.max_iterations {
            if cancel.is_cancelled() {
                return finish(CANCELLED_MESSAGE.into(), ChatStatus::Cancelled, iteration - 1, tool_calls, transcript);
            }
            trim_history(&mut messages, profile.max_history_messages);

            info!(bot = profile.label, model = %profile.wire_model, iteration, "Requesting free-text turn");
            let request = self.tool_loop.request(&messages, &[]);
            let response = self.tool_loop.provider().chat_completion(&request).await;
            if cancel.is_cancelled() {
                return finish(CANCELLED_MESSAGE.into(), ChatStatus::Cancelled, iteration, tool_calls, transcript);
            }
            let reply = match response {
                Ok(response) => response.content,
                Err(e) => {
                    error!(bot = profile.label, error = %e, "Provider call failed");
                    let answer = self.tool_loop.provider_error_message(&e);
                    return finish(answer, ChatStatus::ProviderFailed, iteration, tool_calls, transcript);
                }
            };

            let (name, arguments) = match parse_tool_request(&reply, &tools) {
                Ok(request) => request,
                Err(reason) => {
                    if reason != ParsingError::NoToolRequest {
                        warn!(bot = profile.label, error = %reason, "Unusable tool request, returning reply as answer");
                    }
                    let answer = if reply.trim().is_empty() {
                        EMPTY_ANSWER_MESSAGE.to_string()
                    } else {
                        reply
                    };
                    transcript.push(Message::assistant(answer.clone()));
                    info!(bot = profile.label, iterations = iteration, tool_calls, "Conversation completed");
                    return finish(answer, ChatStatus::Answered, iteration, tool_calls, transcript);
                }
            };

            let call = ToolCall {
                id: format!("text_{}", iteration),
                name: name.clone(),
                arguments: Value::Object(arguments).to_string(),
            };
            tool_calls += 1;
            let turn = self.tool_loop.invoke_tool(&call, namespace, &tools, progress).await;
            debug!(tool = %name, is_error = turn.is_error, "Free-text tool request handled");

            messages.push(Message::assistant(reply.clone()));
            messages.push(Message::user(format!(
                "TOOL RESULT ({}):\n{}\n\nAnswer the original question if this is enough, otherwise request one more tool.",
                name, turn.content
            )));
            transcript.push(Message::assistant_with_tool_calls(reply, vec![call]));
            transcript.push(turn);
        }

        warn!(bot = profile.label, max_iterations = profile.max_iterations, "Hit iteration cap");
        finish(
            iteration_limit_message(profile.max_iterations, ""),
            ChatStatus::IterationLimit,
            profile.max_iterations,
            tool_calls,
            transcript,
        )
    }
}

#[async_trait]
impl ChatBot for DeterministicChatBot {
    fn kind(&self) -> ChatBotKind {
        ChatBotKind::Deterministic
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn converse(
        &self,
        question: &str,
        namespace: Option<&str>,
        progress: Option<&ProgressCallback>,
        cancel: &CancellationToken,
    ) -> ChatOutcome {
        self.run(question, namespace, progress, cancel).await
    }

    async fn test_tools(&self) -> bool {
        self.tool_loop.check_tools().await
    }
}
