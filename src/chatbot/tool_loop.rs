//! The agentic tool loop shared by every native tool-calling bot.
//!
//! ```text
//! [system, question]
//!     |
//!     v
//! provider turn ──(no tool calls)──> final answer
//!     |
//!     └──(tool calls)──> execute each ──> append results ──> next turn
//! ```
//!
//! The loop stops at the first answer, at the iteration cap, on a provider
//! failure, or at the first call boundary after the cancellation token fires.

use serde_json::{Map, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{prompt, ChatOutcome, ChatStatus, ProgressCallback};
use crate::error::ToolExecutionError;
use crate::executor::{catalog, inject_namespace, ToolExecutor};
use crate::llm::LlmProvider;
use crate::types::{ChatRequest, Message, Role, ToolCall, ToolDescriptor};

pub const DEFAULT_MAX_ITERATIONS: usize = 10;
pub const DEFAULT_MAX_HISTORY_MESSAGES: usize = 24;
pub const DEFAULT_MAX_TOKENS: u32 = 4096;
pub const TRUNCATION_SUFFIX: &str = "\n... [Result truncated due to size]";
pub const CANCELLED_MESSAGE: &str = "Request cancelled before the analysis completed.";
pub const EMPTY_ANSWER_MESSAGE: &str = "The model returned an empty answer. Please try rephrasing the question.";

/// Per-bot settings for the tool loop.
#[derive(Debug, Clone)]
pub struct BotProfile {
    /// Provider name used in error sentences ("OpenAI", "Google", ...)
    pub label: &'static str,
    /// Model selector sent on the wire
    pub wire_model: String,
    /// Model-specific block appended to the system prompt
    pub instructions: &'static str,
    /// Longest tool result fed back to the model, in characters
    pub max_tool_result_len: usize,
    pub max_iterations: usize,
    pub max_history_messages: usize,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Unwrap answers the model put inside a markdown code fence
    pub strip_code_fences: bool,
}

impl BotProfile {
    pub fn new(
        label: &'static str,
        wire_model: impl Into<String>,
        instructions: &'static str,
        max_tool_result_len: usize,
    ) -> Self {
        Self {
            label,
            wire_model: wire_model.into(),
            instructions,
            max_tool_result_len,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_history_messages: DEFAULT_MAX_HISTORY_MESSAGES,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: 0.0,
            strip_code_fences: false,
        }
    }

    pub fn with_limits(mut self, max_iterations: usize, max_history_messages: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self.max_history_messages = max_history_messages;
        self
    }

    pub fn with_code_fence_stripping(mut self) -> Self {
        self.strip_code_fences = true;
        self
    }
}

/// Cut a tool result to at most `max_chars` characters, marking the cut.
pub fn truncate_result(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}{}", &text[..idx], TRUNCATION_SUFFIX),
        None => text.to_string(),
    }
}

/// Remove a markdown code fence wrapped around the whole answer.
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    if !(trimmed.starts_with("```") && trimmed.ends_with("```")) || trimmed.len() < 6 {
        return text.to_string();
    }
    let mut lines: Vec<&str> = trimmed.lines().collect();
    if lines.first().is_some_and(|l| l.starts_with("```")) {
        lines.remove(0);
    }
    if lines.last().is_some_and(|l| l.trim() == "```") {
        lines.pop();
    }
    lines.join("\n").trim().to_string()
}

/// Drop the oldest exchanges until the conversation fits `max_messages`.
///
/// The system prompt and the question are always kept, and messages are
/// only dropped in whole groups starting at an assistant turn, so a tool
/// result never loses the call it answers. Returns the number of messages
/// removed.
pub fn trim_history(messages: &mut Vec<Message>, max_messages: usize) -> usize {
    if max_messages == 0 || messages.len() <= max_messages {
        return 0;
    }
    let head = messages.len().min(2);
    let boundaries: Vec<usize> = (head..messages.len())
        .filter(|&i| messages[i].role == Role::Assistant)
        .collect();
    let excess = messages.len() - max_messages;
    let cut = boundaries
        .iter()
        .copied()
        .find(|&b| b - head >= excess)
        .or_else(|| boundaries.last().copied())
        .unwrap_or(head);
    if cut <= head {
        return 0;
    }
    messages.drain(head..cut);
    cut - head
}

/// Decode a call's JSON argument string into an object.
pub fn parse_arguments(call: &ToolCall) -> Result<Map<String, Value>, ToolExecutionError> {
    let raw = call.arguments.trim();
    if raw.is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(Value::Null) => Ok(Map::new()),
        Ok(other) => Err(ToolExecutionError::invalid_arguments(
            &call.name,
            format!("expected a JSON object, got {}", other),
        )),
        Err(e) => Err(ToolExecutionError::invalid_arguments(
            &call.name,
            format!("arguments are not valid JSON: {}", e),
        )),
    }
}

/// Progress line reported for each tool invocation.
pub fn progress_line(tool_name: &str) -> String {
    format!("🔧 Using tool: {}", tool_name)
}

/// Answer returned when the iteration cap is reached.
pub fn iteration_limit_message(max_iterations: usize, partial: &str) -> String {
    let base = format!(
        "Analysis incomplete after {} iterations. Please try a more specific question.",
        max_iterations
    );
    if partial.trim().is_empty() {
        base
    } else {
        format!("{}\n\n{}", base, partial.trim())
    }
}

/// Runs conversations against one provider with one executor.
pub struct ToolLoop {
    provider: Arc<dyn LlmProvider>,
    executor: Arc<dyn ToolExecutor>,
    profile: BotProfile,
}

impl ToolLoop {
    pub fn new(provider: Arc<dyn LlmProvider>, executor: Arc<dyn ToolExecutor>, profile: BotProfile) -> Self {
        Self {
            provider,
            executor,
            profile,
        }
    }

    pub fn profile(&self) -> &BotProfile {
        &self.profile
    }

    pub(crate) fn provider(&self) -> &dyn LlmProvider {
        self.provider.as_ref()
    }

    /// Tools to offer the model: the executor's list, or the built-in catalog.
    pub async fn tool_descriptors(&self) -> Vec<ToolDescriptor> {
        match self.executor.list_tools().await {
            Ok(tools) if !tools.is_empty() => tools,
            Ok(_) => {
                warn!(transport = self.executor.transport(), "Executor advertised no tools, using built-in catalog");
                catalog::observability_tools()
            }
            Err(e) => {
                warn!(transport = self.executor.transport(), error = %e, "Failed to list tools, using built-in catalog");
                catalog::observability_tools()
            }
        }
    }

    /// True when the executor lists at least one tool.
    ///
    /// Unlike `tool_descriptors` this never falls back to the catalog, so a
    /// broken or empty backend is reported.
    pub async fn check_tools(&self) -> bool {
        match self.executor.list_tools().await {
            Ok(tools) if !tools.is_empty() => {
                info!(transport = self.executor.transport(), tools = tools.len(), "Tool backend ready");
                true
            }
            Ok(_) => {
                error!(transport = self.executor.transport(), "Tool backend has no registered tools");
                false
            }
            Err(e) => {
                error!(transport = self.executor.transport(), error = %e, "Tool backend check failed");
                false
            }
        }
    }

    /// Execute one tool call and build the tool turn for the conversation.
    ///
    /// Failures become error turns; nothing here aborts the loop.
    pub async fn invoke_tool(
        &self,
        call: &ToolCall,
        namespace: Option<&str>,
        tools: &[ToolDescriptor],
        progress: Option<&ProgressCallback>,
    ) -> Message {
        if let Some(progress) = progress {
            progress(&progress_line(&call.name));
        }
        info!(bot = self.profile.label, tool = %call.name, transport = self.executor.transport(), "Invoking tool");

        let mut arguments = match parse_arguments(call) {
            Ok(arguments) => arguments,
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Rejected tool arguments");
                return Message::tool_error(call, format!("Error: {}", e));
            }
        };
        inject_namespace(tools.iter().find(|t| t.name == call.name), namespace, &mut arguments);

        match self.executor.execute(&call.name, &arguments).await {
            Ok(output) => {
                let text = output.to_text();
                debug!(tool = %call.name, chars = text.len(), "Tool returned");
                Message::tool_result(call, truncate_result(&text, self.profile.max_tool_result_len))
            }
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool call failed");
                Message::tool_error(call, format!("Error: {}", e))
            }
        }
    }

    pub(crate) fn request(&self, messages: &[Message], tools: &[ToolDescriptor]) -> ChatRequest {
        ChatRequest {
            model: self.profile.wire_model.clone(),
            messages: messages.to_vec(),
            tools: tools.to_vec(),
            max_tokens: self.profile.max_tokens,
            temperature: self.profile.temperature,
        }
    }

    pub(crate) fn provider_error_message(&self, error: &dyn std::fmt::Display) -> String {
        format!("Error during {} tool calling: {}", self.profile.label, error)
    }

    pub(crate) fn finish_answer(&self, content: &str) -> String {
        let answer = if self.profile.strip_code_fences {
            strip_code_fences(content)
        } else {
            content.trim().to_string()
        };
        if answer.is_empty() {
            EMPTY_ANSWER_MESSAGE.to_string()
        } else {
            answer
        }
    }

    /// Run one conversation to completion.
    pub async fn run(
        &self,
        question: &str,
        namespace: Option<&str>,
        progress: Option<&ProgressCallback>,
        cancel: &CancellationToken,
    ) -> ChatOutcome {
        let tools = self.tool_descriptors().await;
        let mut messages = vec![
            Message::system(prompt::system_prompt(self.profile.instructions, namespace)),
            Message::user(question),
        ];
        let mut tool_calls = 0;
        let mut partial = String::new();

        let outcome = |answer: String, status, iterations, tool_calls, messages: Vec<Message>| ChatOutcome {
            answer,
            status,
            iterations,
            tool_calls,
            transcript: messages,
        };

        for iteration in 1..=self.profile.max_iterations {
            if cancel.is_cancelled() {
                return outcome(CANCELLED_MESSAGE.into(), ChatStatus::Cancelled, iteration - 1, tool_calls, messages);
            }

            let dropped = trim_history(&mut messages, self.profile.max_history_messages);
            if dropped > 0 {
                debug!(bot = self.profile.label, dropped, "Trimmed conversation history");
            }

            info!(bot = self.profile.label, model = %self.profile.wire_model, iteration, "Requesting model turn");
            let request = self.request(&messages, &tools);
            // An in-flight call always completes; cancellation is honored after it.
            let response = self.provider.chat_completion(&request).await;
            if cancel.is_cancelled() {
                info!(bot = self.profile.label, iteration, "Cancelled after model turn");
                return outcome(CANCELLED_MESSAGE.into(), ChatStatus::Cancelled, iteration, tool_calls, messages);
            }

            let response = match response {
                Ok(response) => response,
                Err(e) => {
                    error!(bot = self.profile.label, provider = self.provider.name(), error = %e, "Provider call failed");
                    return outcome(self.provider_error_message(&e), ChatStatus::ProviderFailed, iteration, tool_calls, messages);
                }
            };

            if !response.has_tool_calls() {
                let answer = self.finish_answer(&response.content);
                messages.push(Message::assistant(answer.clone()));
                info!(bot = self.profile.label, iterations = iteration, tool_calls, "Conversation completed");
                return outcome(answer, ChatStatus::Answered, iteration, tool_calls, messages);
            }

            if !response.content.trim().is_empty() {
                partial = response.content.clone();
            }
            messages.push(Message::assistant_with_tool_calls(
                response.content.clone(),
                response.tool_calls.clone(),
            ));

            for call in &response.tool_calls {
                if cancel.is_cancelled() {
                    return outcome(CANCELLED_MESSAGE.into(), ChatStatus::Cancelled, iteration, tool_calls, messages);
                }
                tool_calls += 1;
                let turn = self.invoke_tool(call, namespace, &tools, progress).await;
                messages.push(turn);
            }
        }

        warn!(bot = self.profile.label, max_iterations = self.profile.max_iterations, "Hit iteration cap");
        outcome(
            iteration_limit_message(self.profile.max_iterations, &partial),
            ChatStatus::IterationLimit,
            self.profile.max_iterations,
            tool_calls,
            messages,
        )
    }
}
