//! LLM provider clients.
//!
//! Each upstream API has its own request/response format. The
//! `LlmProvider` trait hides those differences behind one call that takes
//! the provider-neutral `ChatRequest` and returns a `ChatResponse`, so the
//! tool loop never needs to know which wire protocol it is talking to.

pub mod anthropic;
pub mod google;
pub mod mock;
pub mod openai_compatible;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::error::ProviderError;
use crate::types::{ChatRequest, ChatResponse};

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Trait that all LLM provider clients implement.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send one non-streaming completion request.
    async fn chat_completion(&self, request: &ChatRequest) -> ProviderResult<ChatResponse>;

    /// Display name used in logs and error strings.
    fn name(&self) -> &str;
}

/// Build the shared HTTP client used by provider clients.
pub fn http_client(timeout: Duration) -> ProviderResult<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

/// Check the status of a provider response and decode its JSON body.
pub(crate) async fn decode_response<T: DeserializeOwned>(
    response: reqwest::Response,
) -> ProviderResult<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::from_status(status.as_u16(), body));
    }

    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|e| {
        ProviderError::invalid_response(format!("{} (body: {})", e, preview(&body, 200)))
    })
}

fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
