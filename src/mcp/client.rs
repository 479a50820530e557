//! MCP client over HTTP ("streamable HTTP" transport).
//!
//! Every JSON-RPC message is a POST to one endpoint. The server may answer
//! with plain JSON or with a short SSE stream carrying the response, and may
//! hand out an `Mcp-Session-Id` during `initialize` that must be echoed on
//! every later request.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::error::{McpError, McpResult};
use super::protocol::{
    CallToolParams, InitializeParams, JsonRpcRequest, JsonRpcResponse, ListToolsResult, McpTool,
    ToolCallResult,
};
use super::McpRpc;

const SESSION_HEADER: &str = "mcp-session-id";

/// Connection settings for an HTTP MCP server.
#[derive(Debug, Clone)]
pub struct HttpMcpConfig {
    pub url: String,
    pub auth_token: Option<String>,
    pub timeout: Duration,
}

impl HttpMcpConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auth_token: None,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Session state: `None` until `initialize` succeeded.
#[derive(Debug, Default)]
struct Session {
    initialized: bool,
    id: Option<String>,
}

/// JSON-RPC client for one MCP server.
pub struct HttpMcpClient {
    config: HttpMcpConfig,
    client: reqwest::Client,
    next_id: AtomicU64,
    session: Mutex<Session>,
}

impl std::fmt::Debug for HttpMcpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpMcpClient")
            .field("url", &self.config.url)
            .finish()
    }
}

impl HttpMcpClient {
    pub fn new(config: HttpMcpConfig) -> McpResult<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            config,
            client,
            next_id: AtomicU64::new(1),
            session: Mutex::new(Session::default()),
        })
    }

    fn next_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// POST one message and return the raw HTTP response.
    async fn post(
        &self,
        message: &JsonRpcRequest,
        session_id: Option<&str>,
    ) -> McpResult<reqwest::Response> {
        let mut builder = self
            .client
            .post(&self.config.url)
            .header("Accept", "application/json, text/event-stream")
            .json(message);
        if let Some(token) = &self.config.auth_token {
            builder = builder.bearer_auth(token);
        }
        if let Some(id) = session_id {
            builder = builder.header(SESSION_HEADER, id);
        }
        Ok(builder.send().await?)
    }

    /// Run the initialize handshake if it has not happened yet.
    async fn ensure_session(&self) -> McpResult<Option<String>> {
        let mut session = self.session.lock().await;
        if session.initialized {
            return Ok(session.id.clone());
        }

        let id = self.next_request_id();
        let params = serde_json::to_value(InitializeParams::default())?;
        let request = JsonRpcRequest::new(id, "initialize", Some(params));
        let response = self.post(&request, None).await?;

        let session_id = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let reply = read_reply(response, id).await?;
        if let Some(error) = reply.error {
            return Err(McpError::InitializationFailed(error.message));
        }

        let notification = JsonRpcRequest::notification("notifications/initialized", None);
        let ack = self.post(&notification, session_id.as_deref()).await?;
        if !ack.status().is_success() {
            warn!(status = %ack.status(), "MCP server rejected initialized notification");
        }

        info!(url = %self.config.url, session = session_id.is_some(), "MCP session initialized");
        session.initialized = true;
        session.id = session_id.clone();
        Ok(session_id)
    }

    async fn reset_session(&self) {
        *self.session.lock().await = Session::default();
    }

    /// Send a request and return its `result`, re-initializing once if the
    /// server dropped our session.
    async fn request(&self, method: &str, params: Option<Value>) -> McpResult<Value> {
        for attempt in 0..2 {
            let session_id = self.ensure_session().await?;
            let id = self.next_request_id();
            let request = JsonRpcRequest::new(id, method, params.clone());

            debug!(method, id, "Sending MCP request");
            let response = self.post(&request, session_id.as_deref()).await?;

            if response.status() == reqwest::StatusCode::NOT_FOUND && session_id.is_some() && attempt == 0 {
                warn!("MCP session expired, re-initializing");
                self.reset_session().await;
                continue;
            }

            let reply = read_reply(response, id).await?;
            if let Some(error) = reply.error {
                return Err(McpError::Rpc {
                    code: error.code,
                    message: error.message,
                });
            }
            return reply
                .result
                .ok_or_else(|| McpError::protocol(format!("missing {} result", method)));
        }
        Err(McpError::protocol("MCP session could not be re-established"))
    }
}

/// Decode a JSON-RPC reply from a JSON or SSE response body.
async fn read_reply(response: reqwest::Response, id: u64) -> McpResult<JsonRpcResponse> {
    let status = response.status();
    let is_sse = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("text/event-stream"));
    let body = response.text().await?;

    if !status.is_success() {
        return Err(McpError::protocol(format!("HTTP {}: {}", status, body.trim())));
    }

    if is_sse {
        parse_sse_reply(&body, id)
    } else {
        Ok(serde_json::from_str(&body)?)
    }
}

/// Find the response with our id among the `data:` events of an SSE body.
fn parse_sse_reply(body: &str, id: u64) -> McpResult<JsonRpcResponse> {
    let mut data = String::new();
    let mut events = Vec::new();
    for line in body.lines().chain(std::iter::once("")) {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            if !data.is_empty() {
                events.push(std::mem::take(&mut data));
            }
            continue;
        }
        if let Some(payload) = line.strip_prefix("data:") {
            if !data.is_empty() {
                data.push('\n');
            }
            data.push_str(payload.trim_start());
        }
    }

    events
        .iter()
        .filter_map(|event| serde_json::from_str::<JsonRpcResponse>(event).ok())
        .find(|reply| reply.id == Some(id))
        .ok_or_else(|| McpError::protocol(format!("no response with id {} in event stream", id)))
}

#[async_trait]
impl McpRpc for HttpMcpClient {
    async fn list_tools(&self) -> McpResult<Vec<McpTool>> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let params = cursor.as_ref().map(|c| serde_json::json!({ "cursor": c }));
            let result: ListToolsResult = serde_json::from_value(self.request("tools/list", params).await?)
                .map_err(|e| McpError::protocol(e.to_string()))?;
            tools.extend(result.tools);
            match result.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }
        Ok(tools)
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> McpResult<ToolCallResult> {
        let params = serde_json::to_value(CallToolParams {
            name: name.to_string(),
            arguments,
        })?;
        let result = self.request("tools/call", Some(params)).await?;
        serde_json::from_value(result).map_err(|e| McpError::protocol(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn rt() -> tokio::runtime::Runtime {
        tokio::runtime::Runtime::new().unwrap()
    }

    async fn mount_handshake(server: &MockServer) {
        Mock::given(method("POST"))
            .and(body_string_contains("\"initialize\""))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("mcp-session-id", "sess-42")
                    .set_body_json(json!({
                        "jsonrpc": "2.0",
                        "id": 1,
                        "result": {"protocolVersion": "2024-11-05", "capabilities": {"tools": {}}}
                    })),
            )
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("notifications/initialized"))
            .respond_with(ResponseTemplate::new(202))
            .mount(server)
            .await;
    }

    #[test]
    fn test_parse_sse_reply_picks_matching_id() {
        let body = "event: message\ndata: {\"jsonrpc\":\"2.0\",\"method\":\"notifications/progress\"}\n\n\
                    event: message\ndata: {\"jsonrpc\":\"2.0\",\"id\":7,\"result\":{\"ok\":true}}\n\n";
        let reply = parse_sse_reply(body, 7).unwrap();
        assert_eq!(reply.result.unwrap()["ok"], true);
        assert!(parse_sse_reply(body, 8).is_err());
    }

    #[test]
    fn test_call_tool_sends_session_header() {
        rt().block_on(async {
            let server = MockServer::start().await;
            mount_handshake(&server).await;
            Mock::given(method("POST"))
                .and(body_string_contains("tools/call"))
                .and(header("mcp-session-id", "sess-42"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "jsonrpc": "2.0",
                    "id": 2,
                    "result": {"content": [{"type": "text", "text": "{\"count\": 7}"}]}
                })))
                .mount(&server)
                .await;

            let client = HttpMcpClient::new(HttpMcpConfig::new(server.uri())).unwrap();
            let result = client.call_tool("list_pods", json!({})).await.unwrap();
            assert_eq!(result.joined_text(), "{\"count\": 7}");
            assert!(!result.is_error);
        });
    }

    #[test]
    fn test_rpc_error_is_reported() {
        rt().block_on(async {
            let server = MockServer::start().await;
            mount_handshake(&server).await;
            Mock::given(method("POST"))
                .and(body_string_contains("tools/call"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "jsonrpc": "2.0",
                    "id": 2,
                    "error": {"code": -32602, "message": "Unknown tool: nope"}
                })))
                .mount(&server)
                .await;

            let client = HttpMcpClient::new(HttpMcpConfig::new(server.uri())).unwrap();
            let err = client.call_tool("nope", json!({})).await.unwrap_err();
            assert!(matches!(err, McpError::Rpc { code: -32602, .. }));
        });
    }

    #[test]
    fn test_list_tools_over_event_stream() {
        rt().block_on(async {
            let server = MockServer::start().await;
            mount_handshake(&server).await;
            let sse = "event: message\ndata: {\"jsonrpc\":\"2.0\",\"id\":2,\"result\":{\"tools\":[{\"name\":\"search_metrics\",\"inputSchema\":{\"type\":\"object\"}}]}}\n\n";
            Mock::given(method("POST"))
                .and(body_string_contains("tools/list"))
                .respond_with(
                    ResponseTemplate::new(200)
                        .insert_header("content-type", "text/event-stream")
                        .set_body_raw(sse, "text/event-stream"),
                )
                .mount(&server)
                .await;

            let client = HttpMcpClient::new(HttpMcpConfig::new(server.uri())).unwrap();
            let tools = client.list_tools().await.unwrap();
            assert_eq!(tools.len(), 1);
            assert_eq!(tools[0].name, "search_metrics");
        });
    }
}
