//! Llama 3.1/3.3 models served by LlamaStack's OpenAI-compatible endpoint.
//!
//! These models call tools natively, so they share the regular tool loop.
//! They get a tighter result budget and PromQL-specific instructions.

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::prompt::LLAMA_INSTRUCTIONS;
use super::{BotProfile, ChatBot, ChatBotKind, ChatOutcome, ProgressCallback, ToolLoop};
use crate::error::ConfigurationError;
use crate::executor::ToolExecutor;
use crate::factory::ChatbotSettings;
use crate::llm::openai_compatible::OpenAiCompatibleProvider;
use crate::llm::{http_client, LlmProvider};

pub struct LlamaChatBot {
    model_name: String,
    tool_loop: ToolLoop,
}

impl LlamaChatBot {
    pub const MAX_TOOL_RESULT_LEN: usize = 8_000;

    /// Connect to LlamaStack using the endpoint and token from `settings`.
    pub fn new(
        model_name: impl Into<String>,
        executor: Arc<dyn ToolExecutor>,
        settings: &ChatbotSettings,
    ) -> Result<Self, ConfigurationError> {
        let client = http_client(settings.request_timeout)
            .map_err(|e| ConfigurationError::HttpClient(e.to_string()))?;
        let provider = OpenAiCompatibleProvider::new(
            "LlamaStack",
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
        // LlamaStack serves models under their full id.
        let profile = BotProfile::new(
            ChatBotKind::Llama.label(),
            model_name.clone(),
            LLAMA_INSTRUCTIONS,
            Self::MAX_TOOL_RESULT_LEN,
        )
        .with_limits(settings.max_iterations, settings.max_history_messages)
        .with_code_fence_stripping();
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
impl ChatBot for LlamaChatBot {
    fn kind(&self) -> ChatBotKind {
        ChatBotKind::Llama
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::McpServerAdapter;
    use crate::tools::ToolServer;

    #[test]
    fn test_profile_keeps_full_model_id() {
        let executor = Arc::new(McpServerAdapter::new(Arc::new(ToolServer::new())));
        let bot = LlamaChatBot::new("meta-llama/Llama-3.1-8B-Instruct", executor, &ChatbotSettings::default()).unwrap();
        assert_eq!(bot.kind(), ChatBotKind::Llama);
        assert_eq!(bot.profile().wire_model, "meta-llama/Llama-3.1-8B-Instruct");
        assert_eq!(bot.profile().max_tool_result_len, 8_000);
        assert!(bot.profile().instructions.contains("LLAMA-SPECIFIC"));
    }
}
