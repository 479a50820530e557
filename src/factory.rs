//! Chatbot factory: picks the implementation for a model identifier.
//!
//! ```text
//! "anthropic/<model>"  -> AnthropicChatBot   (API key required)
//! "openai/<model>"     -> OpenAIChatBot      (API key required)
//! "google/<model>"     -> GoogleChatBot      (API key required)
//! "*llama-3.1*|3.3*"   -> LlamaChatBot       (LlamaStack, native tools)
//! anything else        -> DeterministicChatBot (free-text tool requests)
//! ```
//!
//! All configuration problems surface here, never later inside `chat()`.

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::chatbot::{
    AnthropicChatBot, ChatBot, DeterministicChatBot, GoogleChatBot, LlamaChatBot, OpenAIChatBot,
};
use crate::chatbot::tool_loop::{DEFAULT_MAX_HISTORY_MESSAGES, DEFAULT_MAX_ITERATIONS};
use crate::error::ConfigurationError;
use crate::executor::ToolExecutor;

pub const DEFAULT_LLAMA_STACK_URL: &str = "http://localhost:8321/v1/openai/v1";
pub const DEFAULT_LOCAL_API_TOKEN: &str = "dummy";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Local model families that support native tool calling.
const TOOL_CAPABLE_LLAMA: &[&str] = &["llama-3.1", "llama-3.3", "llama3.1", "llama3.3"];

/// Hosted providers selected by a model prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Anthropic,
    OpenAi,
    Google,
}

impl Provider {
    /// Match a model prefix, ignoring case.
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix.to_ascii_lowercase().as_str() {
            "anthropic" => Some(Provider::Anthropic),
            "openai" => Some(Provider::OpenAi),
            "google" => Some(Provider::Google),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Provider::Anthropic => "anthropic",
            Provider::OpenAi => "openai",
            Provider::Google => "google",
        }
    }

    /// Environment variable conventionally holding this provider's key.
    pub fn api_key_env(&self) -> &'static str {
        match self {
            Provider::Anthropic => "ANTHROPIC_API_KEY",
            Provider::OpenAi => "OPENAI_API_KEY",
            Provider::Google => "GOOGLE_API_KEY",
        }
    }
}

/// A parsed model identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelId {
    /// `provider/model` for a hosted provider
    External { provider: Provider, model: String },
    /// Anything else, served by the local endpoint
    Local(String),
}

impl ModelId {
    pub fn parse(raw: &str) -> Result<Self, ConfigurationError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ConfigurationError::InvalidModel(raw.to_string()));
        }
        if let Some((prefix, model)) = raw.split_once('/') {
            if let Some(provider) = Provider::from_prefix(prefix) {
                let model = model.trim();
                if model.is_empty() {
                    return Err(ConfigurationError::InvalidModel(raw.to_string()));
                }
                return Ok(ModelId::External {
                    provider,
                    model: model.to_string(),
                });
            }
        }
        Ok(ModelId::Local(raw.to_string()))
    }

    pub fn provider(&self) -> Option<Provider> {
        match self {
            ModelId::External { provider, .. } => Some(*provider),
            ModelId::Local(_) => None,
        }
    }
}

/// True for local Llama models that can call tools natively.
pub fn is_tool_capable_llama(model: &str) -> bool {
    let lower = model.to_lowercase();
    TOOL_CAPABLE_LLAMA.iter().any(|family| lower.contains(family))
}

/// Endpoints and limits shared by all chatbots.
#[derive(Debug, Clone)]
pub struct ChatbotSettings {
    /// Overrides for the hosted API base URLs (mainly for tests and proxies)
    pub anthropic_api_base: Option<String>,
    pub openai_api_base: Option<String>,
    pub google_api_base: Option<String>,
    /// OpenAI-compatible endpoint serving local models
    pub llama_stack_url: String,
    /// Bearer token for the local endpoint
    pub local_api_token: String,
    pub max_iterations: usize,
    pub max_history_messages: usize,
    pub request_timeout: Duration,
}

impl Default for ChatbotSettings {
    fn default() -> Self {
        Self {
            anthropic_api_base: None,
            openai_api_base: None,
            google_api_base: None,
            llama_stack_url: DEFAULT_LLAMA_STACK_URL.to_string(),
            local_api_token: DEFAULT_LOCAL_API_TOKEN.to_string(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_history_messages: DEFAULT_MAX_HISTORY_MESSAGES,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl ChatbotSettings {
    /// Defaults with `LLAMA_STACK_URL` and `LLM_API_TOKEN` applied.
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        if let Some(url) = non_empty_env("LLAMA_STACK_URL") {
            settings.llama_stack_url = url;
        }
        if let Some(token) = non_empty_env("LLM_API_TOKEN") {
            settings.local_api_token = token;
        }
        settings
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Create a chatbot for `model` with settings taken from the environment.
pub fn create_chatbot(
    model: &str,
    api_key: Option<&str>,
    executor: Option<Arc<dyn ToolExecutor>>,
) -> Result<Box<dyn ChatBot>, ConfigurationError> {
    create_chatbot_with(model, api_key, executor, &ChatbotSettings::from_env())
}

/// Create a chatbot for `model` with explicit settings.
pub fn create_chatbot_with(
    model: &str,
    api_key: Option<&str>,
    executor: Option<Arc<dyn ToolExecutor>>,
    settings: &ChatbotSettings,
) -> Result<Box<dyn ChatBot>, ConfigurationError> {
    let executor = executor.ok_or(ConfigurationError::MissingToolExecutor)?;
    let model_id = ModelId::parse(model)?;
    let model = model.trim();

    let bot: Box<dyn ChatBot> = match model_id {
        ModelId::External { provider, .. } => {
            let api_key = api_key
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .ok_or_else(|| ConfigurationError::MissingApiKey {
                    provider: provider.name().to_string(),
                    model: model.to_string(),
                })?;
            match provider {
                Provider::Anthropic => Box::new(AnthropicChatBot::new(model, api_key, executor, settings)?),
                Provider::OpenAi => Box::new(OpenAIChatBot::new(model, api_key, executor, settings)?),
                Provider::Google => Box::new(GoogleChatBot::new(model, api_key, executor, settings)?),
            }
        }
        ModelId::Local(name) if is_tool_capable_llama(&name) => {
            Box::new(LlamaChatBot::new(name, executor, settings)?)
        }
        ModelId::Local(name) => Box::new(DeterministicChatBot::new(name, executor, settings)?),
    };

    info!(model, kind = %bot.kind(), "Created chatbot");
    Ok(bot)
}
