//! Minimal Prometheus/Thanos HTTP API client.
//!
//! Every endpoint answers `{"status": "success", "data": ...}` on success
//! and `{"status": "error", "errorType": ..., "error": ...}` otherwise.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiResponse {
    status: String,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    error_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Client for the Prometheus query API.
#[derive(Clone)]
pub struct PrometheusClient {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for PrometheusClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrometheusClient")
            .field("base_url", &self.base_url)
            .field("authenticated", &self.token.is_some())
            .finish()
    }
}

impl PrometheusClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build Prometheus HTTP client")?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get(&self, path: &str, params: &[(&str, String)]) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "Prometheus request");

        let mut request = self.client.get(&url).query(params);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to reach Prometheus at {}", self.base_url))?;

        let status = response.status();
        let body = response.text().await.context("Failed to read Prometheus response")?;
        let parsed: ApiResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => bail!("Prometheus returned HTTP {}: {}", status, body.trim()),
            Err(e) => return Err(e).context("Prometheus returned malformed JSON"),
        };

        if parsed.status != "success" {
            bail!(
                "Prometheus error ({}): {}",
                parsed.error_type.as_deref().unwrap_or("unknown"),
                parsed.error.as_deref().unwrap_or("no details")
            );
        }
        Ok(parsed.data)
    }

    /// Instant query. Returns `{"resultType": ..., "result": [...]}`.
    pub async fn query(&self, promql: &str) -> Result<Value> {
        self.get("/api/v1/query", &[("query", promql.to_string())]).await
    }

    /// Range query between two unix timestamps with a step in seconds.
    pub async fn query_range(&self, promql: &str, start: i64, end: i64, step_secs: i64) -> Result<Value> {
        self.get(
            "/api/v1/query_range",
            &[
                ("query", promql.to_string()),
                ("start", start.to_string()),
                ("end", end.to_string()),
                ("step", format!("{}s", step_secs)),
            ],
        )
        .await
    }

    /// Values of one label, optionally restricted by a series selector.
    pub async fn label_values(&self, label: &str, selector: Option<&str>) -> Result<Vec<String>> {
        let params: Vec<(&str, String)> = selector
            .map(|s| vec![("match[]", s.to_string())])
            .unwrap_or_default();
        let data = self
            .get(&format!("/api/v1/label/{}/values", label), &params)
            .await?;
        Ok(string_array(&data))
    }

    /// All metric names known to the server.
    pub async fn metric_names(&self) -> Result<Vec<String>> {
        self.label_values("__name__", None).await
    }

    /// Metadata entries for one metric (`type`, `help`, `unit`).
    pub async fn metadata(&self, metric: &str) -> Result<Vec<Value>> {
        let data = self
            .get("/api/v1/metadata", &[("metric", metric.to_string())])
            .await?;
        Ok(data
            .get(metric)
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default())
    }
}

fn string_array(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
