//! MCP client error types.

use thiserror::Error;

pub type McpResult<T> = Result<T, McpError>;

/// Errors raised while talking to a remote MCP server.
#[derive(Debug, Error)]
pub enum McpError {
    /// The server does not know the tool.
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// JSON-RPC level error returned by the server.
    #[error("JSON-RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The response did not follow the protocol.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// HTTP error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Session initialization failed.
    #[error("Server initialization failed: {0}")]
    InitializationFailed(String),
}

impl McpError {
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }
}
