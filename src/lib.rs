//! obsbot: a multi-provider observability chatbot.
//!
//! The factory turns a model id into a [`ChatBot`]; every bot runs its tool
//! calls through an injected [`ToolExecutor`], either the in-process tool
//! server or a remote MCP server.

pub mod chatbot;
pub mod config;
pub mod error;
pub mod executor;
pub mod factory;
pub mod llm;
pub mod mcp;
pub mod tools;
pub mod types;

pub use chatbot::{ChatBot, ChatBotKind, ChatOutcome, ChatStatus, ProgressCallback};
pub use error::{ConfigurationError, ParsingError, ProviderError, ToolExecutionError};
pub use executor::{McpClientAdapter, McpServerAdapter, ToolExecutor, ToolResult};
pub use factory::{create_chatbot, create_chatbot_with, ChatbotSettings};
pub use types::{ToolDescriptor, ToolOutput};
