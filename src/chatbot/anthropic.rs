//! Claude models through the Anthropic Messages API.

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::prompt::CLAUDE_INSTRUCTIONS;
use super::{provider_model, BotProfile, ChatBot, ChatBotKind, ChatOutcome, ProgressCallback, ToolLoop};
use crate::error::ConfigurationError;
use crate::executor::ToolExecutor;
use crate::factory::ChatbotSettings;
use crate::llm::anthropic::AnthropicProvider;
use crate::llm::{http_client, LlmProvider};

pub struct AnthropicChatBot {
    model_name: String,
    tool_loop: ToolLoop,
}

impl AnthropicChatBot {
    /// Claude handles large tool results well.
    pub const MAX_TOOL_RESULT_LEN: usize = 15_000;

    pub fn new(
        model_name: impl Into<String>,
        api_key: &str,
        executor: Arc<dyn ToolExecutor>,
        settings: &ChatbotSettings,
    ) -> Result<Self, ConfigurationError> {
        let client = http_client(settings.request_timeout)
            .map_err(|e| ConfigurationError::HttpClient(e.to_string()))?;
        let provider = AnthropicProvider::new(api_key.to_string(), settings.anthropic_api_base.clone(), client);
        Ok(Self::with_provider(model_name, Arc::new(provider), executor, settings))
    }

    /// Build the bot on top of an existing provider client.
    pub fn with_provider(
        model_name: impl Into<String>,
        provider: Arc<dyn LlmProvider>,
        executor: Arc<dyn ToolExecutor>,
        settings: &ChatbotSettings,
    ) -> Self {
        let model_name = model_name.into();
        let profile = BotProfile::new(
            ChatBotKind::Anthropic.label(),
            provider_model(&model_name),
            CLAUDE_INSTRUCTIONS,
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
}

#[async_trait]
impl ChatBot for AnthropicChatBot {
    fn kind(&self) -> ChatBotKind {
        ChatBotKind::Anthropic
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
        self.tool_loop.run(question, namespace, progress, cancel).await
    }

    async fn test_tools(&self) -> bool {
        self.tool_loop.check_tools().await
    }
}
