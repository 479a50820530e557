//! Behavior every chatbot shares, checked with a scripted provider.

mod common;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

use common::PodExecutor;
use obsbot::chatbot::tool_loop::CANCELLED_MESSAGE;
use obsbot::chatbot::{
    ChatBot, ChatBotKind, ChatStatus, DeterministicChatBot, OpenAIChatBot, ProgressCallback,
};
use obsbot::error::{ConfigurationError, ToolExecutionError};
use obsbot::executor::{McpClientAdapter, McpServerAdapter, ToolExecutor};
use obsbot::factory::{create_chatbot, ChatbotSettings};
use obsbot::llm::mock::{MockProvider, MockResponse};
use obsbot::mcp::protocol::{McpTool, ToolCallResult, ToolContent, INVALID_PARAMS};
use obsbot::mcp::{McpError, McpResult, McpRpc};
use obsbot::tools::{Tool, ToolServer};
use obsbot::types::{Role, ToolCall, ToolOutput};

fn call(id: &str, name: &str, arguments: &str) -> ToolCall {
    ToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments: arguments.to_string(),
    }
}

fn openai_bot(
    provider: Arc<MockProvider>,
    executor: Arc<dyn ToolExecutor>,
    settings: &ChatbotSettings,
) -> OpenAIChatBot {
    OpenAIChatBot::with_provider("openai/gpt-4o-mini", provider, executor, settings)
}

#[test]
fn test_factory_rejects_incomplete_configuration() {
    let executor: Arc<dyn ToolExecutor> = PodExecutor::succeeding();
    for model in ["anthropic/claude-sonnet-4", "openai/gpt-4o", "google/gemini-2.5-pro"] {
        let err = create_chatbot(model, None, Some(executor.clone())).unwrap_err();
        assert!(matches!(err, ConfigurationError::MissingApiKey { .. }));
    }
    for model in ["openai/gpt-4o", "meta-llama/Llama-3.3-70B-Instruct", "granite-3b"] {
        let err = create_chatbot(model, Some("key"), None).unwrap_err();
        assert_eq!(err, ConfigurationError::MissingToolExecutor);
    }
    for model in ["meta-llama/Llama-3.2-1B-Instruct", "qwen2.5:7b", "ibm/granite-8b"] {
        let bot = create_chatbot(model, None, Some(executor.clone())).unwrap();
        assert_eq!(bot.kind(), ChatBotKind::Deterministic, "{}", model);
    }
}

#[tokio::test]
async fn test_always_succeeding_tools_stop_at_the_cap() {
    let provider = Arc::new(MockProvider::new());
    provider.repeat(MockResponse::ToolCalls(vec![call("c", "list_pods", "{}")]));
    let executor = PodExecutor::succeeding();
    let settings = ChatbotSettings {
        max_iterations: 3,
        ..ChatbotSettings::default()
    };
    let bot = openai_bot(provider.clone(), executor.clone(), &settings);

    let outcome = bot
        .converse("loop forever", None, None, &CancellationToken::new())
        .await;
    assert_eq!(outcome.status, ChatStatus::IterationLimit);
    assert_eq!(outcome.iterations, 3);
    assert!(!outcome.answer.is_empty());
    assert_eq!(provider.call_count(), 3);
    assert_eq!(executor.calls(), 3);
}

#[tokio::test]
async fn test_always_failing_tools_are_reported_in_the_transcript() {
    let provider = Arc::new(MockProvider::new());
    provider
        .expect_tool_call("list_pods", "{}")
        .expect_text("I could not reach the cluster.");
    let executor = PodExecutor::failing();
    let bot = openai_bot(provider.clone(), executor, &ChatbotSettings::default());

    let outcome = bot
        .converse("How many pods?", None, None, &CancellationToken::new())
        .await;
    assert_eq!(outcome.status, ChatStatus::Answered);
    assert_eq!(outcome.answer, "I could not reach the cluster.");
    let errors: Vec<_> = outcome.tool_errors().collect();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].content.contains("connection refused"));

    // The model saw the failure on its second turn.
    let second = &provider.requests()[1];
    assert!(second
        .messages
        .iter()
        .any(|m| m.role == Role::Tool && m.is_error));
}

#[tokio::test]
async fn test_progress_is_reported_once_per_tool_in_order() {
    let provider = Arc::new(MockProvider::new());
    provider
        .expect_tool_calls(vec![
            call("a", "list_pods", "{}"),
            call("b", "describe_pod", "{}"),
        ])
        .expect_tool_call("list_pods", "{}")
        .expect_text("done");
    let bot = openai_bot(provider, PodExecutor::succeeding(), &ChatbotSettings::default());

    let lines = Arc::new(Mutex::new(Vec::new()));
    let sink = lines.clone();
    let record = move |line: &str| sink.lock().unwrap().push(line.to_string());
    let progress: &ProgressCallback = &record;
    let answer = bot.chat("q", None, Some(progress)).await;

    assert_eq!(answer, "done");
    assert_eq!(
        *lines.lock().unwrap(),
        vec![
            "🔧 Using tool: list_pods".to_string(),
            "🔧 Using tool: describe_pod".to_string(),
            "🔧 Using tool: list_pods".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_deterministic_returns_plain_replies_verbatim() {
    let provider = Arc::new(MockProvider::new());
    provider.expect_text("  All 12 pods are Running.\n");
    let executor = PodExecutor::succeeding();
    let bot = DeterministicChatBot::with_provider(
        "granite-3b",
        provider.clone(),
        executor.clone(),
        &ChatbotSettings::default(),
    );

    let answer = bot.chat("status?", None, None).await;
    assert_eq!(answer, "  All 12 pods are Running.\n");
    assert_eq!(provider.call_count(), 1);
    assert_eq!(executor.calls(), 0);
}

#[tokio::test]
async fn test_cancelled_request_stops_before_calling_the_model() {
    let provider = Arc::new(MockProvider::new());
    provider.expect_text("never sent");
    let bot = openai_bot(provider.clone(), PodExecutor::succeeding(), &ChatbotSettings::default());

    let cancel = CancellationToken::new();
    cancel.cancel();
    let outcome = bot.converse("q", None, None, &cancel).await;
    assert_eq!(outcome.status, ChatStatus::Cancelled);
    assert_eq!(outcome.answer, CANCELLED_MESSAGE);
    assert_eq!(provider.call_count(), 0);
}

// --- client vs server adapter ---

struct CountPods;

#[async_trait]
impl Tool for CountPods {
    fn name(&self) -> &str {
        "count_pods"
    }

    fn description(&self) -> &str {
        "Count pods in a namespace"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"namespace": {"type": "string"}},
            "required": ["namespace"]
        })
    }

    async fn execute(&self, params: Value) -> Result<ToolOutput> {
        let namespace = params["namespace"].as_str().unwrap_or_default();
        if namespace == "forbidden" {
            anyhow::bail!("namespace '{}' is not readable", namespace);
        }
        Ok(ToolOutput::Json(json!({"namespace": namespace, "count": 7})))
    }
}

fn pod_server() -> Arc<ToolServer> {
    let mut server = ToolServer::new();
    server.register(Box::new(CountPods));
    Arc::new(server)
}

/// Serves a `ToolServer` through the MCP RPC seam the way a remote server would.
struct Loopback(Arc<ToolServer>);

#[async_trait]
impl McpRpc for Loopback {
    async fn list_tools(&self) -> McpResult<Vec<McpTool>> {
        Ok(self
            .0
            .descriptors()
            .into_iter()
            .map(|d| McpTool {
                name: d.name,
                description: Some(d.description),
                input_schema: d.input_schema,
            })
            .collect())
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> McpResult<ToolCallResult> {
        let arguments: Map<String, Value> = match arguments {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        match self.0.execute(name, &arguments).await {
            Ok(ToolOutput::Text(text)) => Ok(ToolCallResult::text(text)),
            Ok(ToolOutput::Json(value)) => Ok(ToolCallResult {
                content: vec![ToolContent::Text {
                    text: value.to_string(),
                }],
                structured_content: Some(value),
                is_error: false,
            }),
            Err(ToolExecutionError::NotFound(name)) => Err(McpError::ToolNotFound(name)),
            Err(ToolExecutionError::InvalidArguments { reason, .. }) => Err(McpError::Rpc {
                code: INVALID_PARAMS,
                message: reason,
            }),
            Err(ToolExecutionError::Failed { message, .. }) => Ok(ToolCallResult::error(message)),
            Err(e) => Err(McpError::protocol(e.to_string())),
        }
    }
}

fn adapter_script() -> Arc<MockProvider> {
    let provider = Arc::new(MockProvider::new());
    provider
        .expect_tool_calls(vec![
            call("a", "count_pods", "{}"),
            call("b", "count_pods", r#"{"namespace": "forbidden"}"#),
            call("c", "count_nodes", "{}"),
            call("d", "count_pods", r#"{"namespace": 42}"#),
        ])
        .expect_text("There are 7 pods in demo.");
    provider
}

#[tokio::test]
async fn test_client_and_server_adapters_are_interchangeable() {
    let server = pod_server();
    let in_process: Arc<dyn ToolExecutor> = Arc::new(McpServerAdapter::new(server.clone()));
    let remote: Arc<dyn ToolExecutor> =
        Arc::new(McpClientAdapter::new(Arc::new(Loopback(server))));

    let mut results = Vec::new();
    for executor in [in_process, remote] {
        let bot = openai_bot(adapter_script(), executor, &ChatbotSettings::default());
        let outcome = bot
            .converse("How many pods?", Some("demo"), None, &CancellationToken::new())
            .await;
        let tool_turns: Vec<(String, bool)> = outcome
            .transcript
            .iter()
            .filter(|m| m.role == Role::Tool)
            .map(|m| (m.content.clone(), m.is_error))
            .collect();
        results.push((outcome.answer, tool_turns));
    }

    assert_eq!(results[0], results[1]);
    let (answer, turns) = &results[0];
    assert_eq!(answer, "There are 7 pods in demo.");
    assert_eq!(turns.len(), 4);
    assert!(turns[0].0.contains("\"count\":7"));
    assert!(!turns[0].1);
    assert!(turns[1].1 && turns[1].0.contains("not readable"));
    assert!(turns[2].1 && turns[2].0.contains("Unknown tool: count_nodes"));
    assert!(turns[3].1);
}

// --- tool backend readiness ---

/// An MCP server that cannot be reached.
struct Unreachable;

#[async_trait]
impl McpRpc for Unreachable {
    async fn list_tools(&self) -> McpResult<Vec<McpTool>> {
        Err(McpError::protocol("HTTP 503 Service Unavailable"))
    }

    async fn call_tool(&self, _name: &str, _arguments: Value) -> McpResult<ToolCallResult> {
        Err(McpError::protocol("HTTP 503 Service Unavailable"))
    }
}

#[tokio::test]
async fn test_tool_readiness_reflects_the_backend() {
    let settings = ChatbotSettings::default();
    fn ready(executor: Arc<dyn ToolExecutor>) -> OpenAIChatBot {
        openai_bot(Arc::new(MockProvider::new()), executor, &ChatbotSettings::default())
    }

    let populated = ready(Arc::new(McpServerAdapter::new(pod_server())));
    assert!(populated.test_tools().await);

    let remote = ready(Arc::new(McpClientAdapter::new(Arc::new(Loopback(pod_server())))));
    assert!(remote.test_tools().await);

    let empty = ready(Arc::new(McpServerAdapter::new(Arc::new(ToolServer::new()))));
    assert!(!empty.test_tools().await);

    let unreachable = ready(Arc::new(McpClientAdapter::new(Arc::new(Unreachable))));
    assert!(!unreachable.test_tools().await);

    // Conversations still fall back to the built-in catalog.
    let provider = Arc::new(MockProvider::new());
    provider.expect_text("no data");
    let bot = DeterministicChatBot::with_provider(
        "granite-3b",
        provider.clone(),
        Arc::new(McpClientAdapter::new(Arc::new(Unreachable))),
        &settings,
    );
    assert!(!bot.test_tools().await);
    assert_eq!(bot.chat("q", None, None).await, "no data");
    assert!(provider.requests()[0].messages[0].content.contains("execute_promql"));
}
