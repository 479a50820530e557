//! Error taxonomy for the chatbot core.
//!
//! Each error kind has a fixed place where it is handled:
//! - `ConfigurationError`: returned by the factory, never deferred into `chat()`
//! - `ToolExecutionError`: caught in the tool loop and fed back to the model
//! - `ProviderError`: caught at the top of the loop and turned into a reply string
//! - `ParsingError`: deterministic fallback only, resolved as a final answer

use thiserror::Error;

/// Missing or invalid constructor input.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    /// No tool executor was supplied.
    #[error("A tool executor is required to create a chatbot")]
    MissingToolExecutor,

    /// External provider selected without an API key.
    #[error("API key required for {provider} model '{model}'")]
    MissingApiKey { provider: String, model: String },

    /// The model identifier is empty or malformed.
    #[error("Invalid model identifier: '{0}'")]
    InvalidModel(String),

    /// The HTTP client for the provider could not be built.
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// A tool invocation that did not produce a result.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ToolExecutionError {
    /// The named tool does not exist.
    #[error("Unknown tool: {0}")]
    NotFound(String),

    /// Arguments failed schema validation or could not be decoded.
    #[error("Invalid arguments for tool '{tool}': {reason}")]
    InvalidArguments { tool: String, reason: String },

    /// The transport or underlying call failed.
    #[error("Transport failure calling '{tool}': {reason}")]
    Transport { tool: String, reason: String },

    /// The tool ran and reported a failure.
    #[error("Tool '{tool}' failed: {message}")]
    Failed { tool: String, message: String },
}

impl ToolExecutionError {
    pub fn invalid_arguments(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArguments {
            tool: tool.into(),
            reason: reason.into(),
        }
    }

    pub fn transport(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transport {
            tool: tool.into(),
            reason: reason.into(),
        }
    }

    pub fn failed(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            tool: tool.into(),
            message: message.into(),
        }
    }
}

/// Upstream LLM API failure.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// HTTP request failed (connect, timeout, body read).
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider rejected our credentials.
    #[error("Authentication failed ({status}): {message}")]
    Authentication { status: u16, message: String },

    /// The provider is throttling us.
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Any other non-success status.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The response body did not have the expected shape.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// JSON encoding/decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProviderError {
    /// Classify a non-success HTTP status and its body.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let message = body.into();
        match status {
            401 | 403 => Self::Authentication { status, message },
            429 => Self::RateLimited(message),
            _ => Self::Api { status, message },
        }
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse(message.into())
    }
}

/// Free-text reply could not be read as a tool request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParsingError {
    #[error("No tool request found in reply")]
    NoToolRequest,

    #[error("Reply makes conflicting tool requests: {0:?}")]
    Ambiguous(Vec<String>),

    #[error("Reply requests unknown tool: {0}")]
    UnknownTool(String),

    #[error("Could not parse arguments for '{tool}': {reason}")]
    InvalidArguments { tool: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            ProviderError::from_status(401, "bad key"),
            ProviderError::Authentication { status: 401, .. }
        ));
        assert!(matches!(
            ProviderError::from_status(403, "forbidden"),
            ProviderError::Authentication { status: 403, .. }
        ));
        assert!(matches!(
            ProviderError::from_status(429, "slow down"),
            ProviderError::RateLimited(_)
        ));
        assert!(matches!(
            ProviderError::from_status(500, "boom"),
            ProviderError::Api { status: 500, .. }
        ));
    }

    #[test]
    fn test_error_display() {
        let errors = vec![
            (
                ConfigurationError::MissingToolExecutor.to_string(),
                "A tool executor is required to create a chatbot",
            ),
            (
                ToolExecutionError::NotFound("list_pods".to_string()).to_string(),
                "Unknown tool: list_pods",
            ),
            (
                ToolExecutionError::failed("execute_promql", "bad query").to_string(),
                "Tool 'execute_promql' failed: bad query",
            ),
            (
                ParsingError::UnknownTool("nope".to_string()).to_string(),
                "Reply requests unknown tool: nope",
            ),
        ];

        for (actual, expected) in errors {
            assert_eq!(actual, expected);
        }
    }

    #[test]
    fn test_missing_api_key_names_provider() {
        let err = ConfigurationError::MissingApiKey {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
        };
        assert!(err.to_string().contains("openai"));
        assert!(err.to_string().contains("gpt-4o-mini"));
    }
}
