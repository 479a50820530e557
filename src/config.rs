//! Configuration management for obsbot.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::chatbot::tool_loop::{DEFAULT_MAX_HISTORY_MESSAGES, DEFAULT_MAX_ITERATIONS};
use crate::factory::{
    ChatbotSettings, ModelId, DEFAULT_LLAMA_STACK_URL, DEFAULT_LOCAL_API_TOKEN,
    DEFAULT_REQUEST_TIMEOUT_SECS,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_anthropic_api_base")]
    pub anthropic_api_base: String,
    #[serde(default = "default_openai_api_base")]
    pub openai_api_base: String,
    #[serde(default = "default_google_api_base")]
    pub google_api_base: String,
    #[serde(default = "default_llama_stack_url")]
    pub llama_stack_url: String,
    /// Bearer token for the local endpoint
    #[serde(default = "default_local_api_token")]
    pub local_api_token: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Short names for model ids, e.g. `gpt-4o-mini = "openai/gpt-4o-mini"`
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
}

fn default_anthropic_api_base() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_openai_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_google_api_base() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_llama_stack_url() -> String {
    DEFAULT_LLAMA_STACK_URL.to_string()
}

fn default_local_api_token() -> String {
    DEFAULT_LOCAL_API_TOKEN.to_string()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_max_history_messages")]
    pub max_history_messages: usize,
}

fn default_max_iterations() -> usize {
    DEFAULT_MAX_ITERATIONS
}

fn default_max_history_messages() -> usize {
    DEFAULT_MAX_HISTORY_MESSAGES
}

/// Where tools run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolMode {
    /// In-process tool server talking to Prometheus directly
    Server,
    /// Remote MCP server over HTTP
    Client,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_tool_mode")]
    pub mode: ToolMode,
    #[serde(default = "default_mcp_url")]
    pub mcp_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mcp_auth_token: Option<String>,
    #[serde(default = "default_prometheus_url")]
    pub prometheus_url: String,
    /// Bearer token for Prometheus/Thanos
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prometheus_token: Option<String>,
    #[serde(default = "default_tool_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_tool_mode() -> ToolMode {
    ToolMode::Server
}

fn default_mcp_url() -> String {
    "http://localhost:8085/mcp".to_string()
}

fn default_prometheus_url() -> String {
    "http://localhost:9090".to_string()
}

fn default_tool_timeout_secs() -> u64 {
    30
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "meta-llama/Llama-3.1-8B-Instruct".to_string(),
            api_key: None,
            anthropic_api_base: default_anthropic_api_base(),
            openai_api_base: default_openai_api_base(),
            google_api_base: default_google_api_base(),
            llama_stack_url: default_llama_stack_url(),
            local_api_token: default_local_api_token(),
            request_timeout_secs: default_request_timeout_secs(),
            aliases: BTreeMap::new(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_history_messages: default_max_history_messages(),
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            mode: default_tool_mode(),
            mcp_url: default_mcp_url(),
            mcp_auth_token: None,
            prometheus_url: default_prometheus_url(),
            prometheus_token: None,
            timeout_secs: default_tool_timeout_secs(),
        }
    }
}

impl AppConfig {
    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".obsbot").join("config.toml"))
    }

    /// Load from the default location, creating it on first run.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if !config_path.exists() {
            Self::save_default_to(&config_path)?;
            tracing::info!(path = %config_path.display(), "Created default config");
        }
        Self::load_from(&config_path)
    }

    /// Load from `path` and apply environment overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(model) = env_value("OBSBOT_MODEL") {
            self.llm.model = model;
        }
        if let Some(url) = env_value("LLAMA_STACK_URL") {
            self.llm.llama_stack_url = url;
        }
        if let Some(token) = env_value("LLM_API_TOKEN") {
            self.llm.local_api_token = token;
        }
        if let Some(url) = env_value("MCP_SERVER_URL") {
            self.tools.mcp_url = url;
        }
        if let Some(url) = env_value("PROMETHEUS_URL") {
            self.tools.prometheus_url = url;
        }
        if let Some(token) = env_value("THANOS_TOKEN") {
            self.tools.prometheus_token = Some(token);
        }
    }

    fn validate(&self) -> Result<()> {
        if self.agent.max_iterations == 0 {
            bail!("agent.max_iterations must be at least 1");
        }
        if self.llm.request_timeout_secs == 0 {
            bail!("llm.request_timeout_secs must be at least 1");
        }
        Ok(())
    }

    /// Expand an alias to a full model id; other names pass through.
    pub fn resolve_model(&self, name: &str) -> String {
        self.llm
            .aliases
            .get(name.trim())
            .cloned()
            .unwrap_or_else(|| name.trim().to_string())
    }

    /// API key for `model`: explicit value, then `llm.api_key`, then the
    /// provider's environment variable. Local models need none.
    pub fn api_key(&self, model: &str, explicit: Option<&str>) -> Option<String> {
        let non_blank = |k: &str| (!k.trim().is_empty()).then(|| k.trim().to_string());
        if let Some(key) = explicit.and_then(non_blank) {
            return Some(key);
        }
        let provider = ModelId::parse(model).ok()?.provider()?;
        if let Some(key) = self.llm.api_key.as_deref().and_then(non_blank) {
            return Some(key);
        }
        env_value(provider.api_key_env())
    }

    /// Factory settings derived from this config.
    pub fn chatbot_settings(&self) -> ChatbotSettings {
        ChatbotSettings {
            anthropic_api_base: Some(self.llm.anthropic_api_base.clone()),
            openai_api_base: Some(self.llm.openai_api_base.clone()),
            google_api_base: Some(self.llm.google_api_base.clone()),
            llama_stack_url: self.llm.llama_stack_url.clone(),
            local_api_token: self.llm.local_api_token.clone(),
            max_iterations: self.agent.max_iterations,
            max_history_messages: self.agent.max_history_messages,
            request_timeout: Duration::from_secs(self.llm.request_timeout_secs),
        }
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tools.timeout_secs.max(1))
    }

    pub fn save_default() -> Result<PathBuf> {
        let config_path = Self::config_path()?;
        Self::save_default_to(&config_path)?;
        Ok(config_path)
    }

    pub fn save_default_to(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        let content =
            toml::to_string_pretty(&Self::default()).context("Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
