//! Scripted provider for testing the tool loop without a network.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use super::{LlmProvider, ProviderResult};
use crate::error::ProviderError;
use crate::types::{ChatRequest, ChatResponse, ToolCall};

/// A scripted reply.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// A final text answer.
    Text(String),
    /// One or more tool calls.
    ToolCalls(Vec<ToolCall>),
    /// An upstream failure.
    Error(String),
}

/// Provider that replays scripted responses in order.
///
/// When the script runs out, the optional `repeat` response is returned
/// forever; without one, the provider reports an invalid response.
#[derive(Debug, Default)]
pub struct MockProvider {
    script: Mutex<VecDeque<MockResponse>>,
    repeat: Mutex<Option<MockResponse>>,
    requests: Mutex<Vec<ChatRequest>>,
}

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expect_text(&self, text: impl Into<String>) -> &Self {
        guard(&self.script).push_back(MockResponse::Text(text.into()));
        self
    }

    /// Script a single tool call with JSON-encoded arguments.
    pub fn expect_tool_call(&self, name: impl Into<String>, arguments: impl Into<String>) -> &Self {
        let index = guard(&self.script).len();
        let call = ToolCall {
            id: format!("call_{}", index),
            name: name.into(),
            arguments: arguments.into(),
        };
        guard(&self.script).push_back(MockResponse::ToolCalls(vec![call]));
        self
    }

    pub fn expect_tool_calls(&self, calls: Vec<ToolCall>) -> &Self {
        guard(&self.script).push_back(MockResponse::ToolCalls(calls));
        self
    }

    pub fn expect_error(&self, message: impl Into<String>) -> &Self {
        guard(&self.script).push_back(MockResponse::Error(message.into()));
        self
    }

    /// Response returned once the script is exhausted.
    pub fn repeat(&self, response: MockResponse) -> &Self {
        *guard(&self.repeat) = Some(response);
        self
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<ChatRequest> {
        guard(&self.requests).clone()
    }

    pub fn call_count(&self) -> usize {
        guard(&self.requests).len()
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    async fn chat_completion(&self, request: &ChatRequest) -> ProviderResult<ChatResponse> {
        guard(&self.requests).push(request.clone());

        let next = guard(&self.script)
            .pop_front()
            .or_else(|| guard(&self.repeat).clone());

        match next {
            Some(MockResponse::Text(content)) => Ok(ChatResponse {
                content,
                tool_calls: vec![],
            }),
            Some(MockResponse::ToolCalls(tool_calls)) => Ok(ChatResponse {
                content: String::new(),
                tool_calls,
            }),
            Some(MockResponse::Error(message)) => Err(ProviderError::Api {
                status: 500,
                message,
            }),
            None => Err(ProviderError::invalid_response("mock script exhausted")),
        }
    }

    fn name(&self) -> &str {
        "Mock"
    }
}
