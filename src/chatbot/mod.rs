//! Chatbots: one per provider family, all sharing the same contract.
//!
//! ```text
//!  question ──> ChatBot::chat ──> ToolLoop ──> LlmProvider (wire protocol)
//!                                    │
//!                                    └──> ToolExecutor (client or server adapter)
//! ```
//!
//! A bot is built by the factory with its model id, credentials and an
//! injected executor. Each `chat` call starts a fresh conversation, runs the
//! tool loop until the model answers (or the iteration cap is hit) and
//! returns the answer as text. `chat` never fails: provider problems come
//! back as an error sentence instead.

pub mod anthropic;
pub mod deterministic;
pub mod google;
pub mod llama;
pub mod openai;
pub mod prompt;
pub mod tool_loop;

pub use anthropic::AnthropicChatBot;
pub use deterministic::DeterministicChatBot;
pub use google::GoogleChatBot;
pub use llama::LlamaChatBot;
pub use openai::OpenAIChatBot;
pub use tool_loop::{BotProfile, ToolLoop};

use async_trait::async_trait;
use std::fmt;
use tokio_util::sync::CancellationToken;

use crate::types::{Message, Role};

/// Receives one status line per tool invocation.
pub type ProgressCallback = dyn Fn(&str) + Send + Sync;

/// Which implementation a factory-built bot is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatBotKind {
    Anthropic,
    OpenAi,
    Google,
    Llama,
    Deterministic,
}

impl ChatBotKind {
    /// Provider name used in user-facing messages.
    pub fn label(&self) -> &'static str {
        match self {
            ChatBotKind::Anthropic => "Anthropic",
            ChatBotKind::OpenAi => "OpenAI",
            ChatBotKind::Google => "Google",
            ChatBotKind::Llama => "Llama",
            ChatBotKind::Deterministic => "Deterministic",
        }
    }
}

impl fmt::Display for ChatBotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How a conversation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatStatus {
    /// The model produced a final answer.
    Answered,
    /// The iteration cap was reached first.
    IterationLimit,
    /// The provider call failed; the answer describes the error.
    ProviderFailed,
    /// The caller cancelled the request.
    Cancelled,
}

/// Result of one conversation, with its transcript for inspection.
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub answer: String,
    pub status: ChatStatus,
    /// Model turns requested
    pub iterations: usize,
    /// Tool invocations attempted
    pub tool_calls: usize,
    pub transcript: Vec<Message>,
}

impl ChatOutcome {
    /// Tool turns that reported an error.
    pub fn tool_errors(&self) -> impl Iterator<Item = &Message> {
        self.transcript
            .iter()
            .filter(|m| m.role == Role::Tool && m.is_error)
    }
}

/// The contract every chatbot implements.
#[async_trait]
pub trait ChatBot: Send + Sync {
    fn kind(&self) -> ChatBotKind;

    /// The model identifier the bot was built with.
    fn model_name(&self) -> &str;

    /// Run one conversation and report how it ended.
    async fn converse(
        &self,
        question: &str,
        namespace: Option<&str>,
        progress: Option<&ProgressCallback>,
        cancel: &CancellationToken,
    ) -> ChatOutcome;

    /// Whether the tool backend is reachable and has tools registered.
    async fn test_tools(&self) -> bool;

    /// Answer a question. Errors are reported in the returned text.
    async fn chat(
        &self,
        question: &str,
        namespace: Option<&str>,
        progress: Option<&ProgressCallback>,
    ) -> String {
        let cancel = CancellationToken::new();
        self.converse(question, namespace, progress, &cancel)
            .await
            .answer
    }
}

/// Model selector after the provider prefix (`openai/gpt-4o-mini` -> `gpt-4o-mini`).
pub(crate) fn provider_model(model_name: &str) -> &str {
    model_name
        .split_once('/')
        .map(|(_, model)| model)
        .unwrap_or(model_name)
}

impl fmt::Debug for dyn ChatBot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatBot")
            .field("kind", &self.kind())
            .field("model", &self.model_name())
            .finish()
    }
}
