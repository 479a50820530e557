//! GPT models through the OpenAI chat completions API.

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::prompt::GPT_INSTRUCTIONS;
use super::{provider_model, BotProfile, ChatBot, ChatBotKind, ChatOutcome, ProgressCallback, ToolLoop};
use crate::error::ConfigurationError;
use crate::executor::ToolExecutor;
use crate::factory::ChatbotSettings;
use crate::llm::openai_compatible::OpenAiCompatibleProvider;
use crate::llm::{http_client, LlmProvider};

pub struct OpenAIChatBot {
    model_name: String,
    tool_loop: ToolLoop,
}

impl OpenAIChatBot {
    pub const MAX_TOOL_RESULT_LEN: usize = 10_000;

    pub fn new(
        model_name: impl Into<String>,
        api_key: &str,
        executor: Arc<dyn ToolExecutor>,
        settings: &ChatbotSettings,
    ) -> Result<Self, ConfigurationError> {
        let client = http_client(settings.request_timeout)
            .map_err(|e| ConfigurationError::HttpClient(e.to_string()))?;
        let provider = OpenAiCompatibleProvider::new(
            "OpenAI",
            api_key.to_string(),
            settings.openai_api_base.clone(),
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
            ChatBotKind::OpenAi.label(),
            provider_model(&model_name),
            GPT_INSTRUCTIONS,
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
impl ChatBot for OpenAIChatBot {
    fn kind(&self) -> ChatBotKind {
        ChatBotKind::OpenAi
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
    use crate::llm::mock::MockProvider;
    use crate::tools::ToolServer;

    fn rt() -> tokio::runtime::Runtime {
        tokio::runtime::Runtime::new().unwrap()
    }

    #[test]
    fn test_profile() {
        let executor = Arc::new(McpServerAdapter::new(Arc::new(ToolServer::new())));
        let bot = OpenAIChatBot::new("openai/gpt-4o-mini", "sk-test", executor, &ChatbotSettings::default()).unwrap();
        assert_eq!(bot.kind(), ChatBotKind::OpenAi);
        assert_eq!(bot.profile().wire_model, "gpt-4o-mini");
        assert_eq!(bot.profile().max_tool_result_len, 10_000);
        assert!(bot.profile().strip_code_fences);
    }

    #[test]
    fn test_fenced_answer_is_unwrapped() {
        rt().block_on(async {
            let provider = Arc::new(MockProvider::new());
            provider.expect_text("```markdown\n**All pods healthy**\n```");
            let executor = Arc::new(McpServerAdapter::new(Arc::new(ToolServer::new())));
            let bot = OpenAIChatBot::with_provider("openai/gpt-4o", provider.clone(), executor, &ChatbotSettings::default());
            assert_eq!(bot.chat("status?", None, None).await, "**All pods healthy**");
            assert!(provider.requests()[0].messages[0].content.contains("GPT-SPECIFIC"));
        });
    }
}
