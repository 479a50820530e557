#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use obsbot::error::ToolExecutionError;
use obsbot::executor::{ToolExecutor, ToolResult};
use obsbot::factory::ChatbotSettings;
use obsbot::types::{ToolDescriptor, ToolOutput};

/// Executor with a single `list_pods` tool.
pub struct PodExecutor {
    pub fail: bool,
    calls: AtomicUsize,
    arguments: Mutex<Vec<Map<String, Value>>>,
}

impl PodExecutor {
    pub fn succeeding() -> Arc<Self> {
        Arc::new(Self {
            fail: false,
            calls: AtomicUsize::new(0),
            arguments: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            calls: AtomicUsize::new(0),
            arguments: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn arguments(&self) -> Vec<Map<String, Value>> {
        self.arguments.lock().unwrap().clone()
    }
}

pub fn list_pods_descriptor() -> ToolDescriptor {
    ToolDescriptor::new(
        "list_pods",
        "Count the pods in a namespace",
        json!({
            "type": "object",
            "properties": {"namespace": {"type": "string", "description": "Namespace"}}
        }),
    )
}

#[async_trait]
impl ToolExecutor for PodExecutor {
    async fn execute(&self, tool_name: &str, arguments: &Map<String, Value>) -> ToolResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.arguments.lock().unwrap().push(arguments.clone());
        if tool_name != "list_pods" {
            return Err(ToolExecutionError::NotFound(tool_name.to_string()));
        }
        if self.fail {
            return Err(ToolExecutionError::transport(tool_name, "connection refused"));
        }
        Ok(ToolOutput::Json(json!({"count": 7})))
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ToolExecutionError> {
        Ok(vec![list_pods_descriptor()])
    }

    fn transport(&self) -> &str {
        "stub"
    }
}

/// Settings pointing every provider at `base`.
pub fn settings_for(base: &str) -> ChatbotSettings {
    ChatbotSettings {
        anthropic_api_base: Some(base.to_string()),
        openai_api_base: Some(base.to_string()),
        google_api_base: Some(base.to_string()),
        llama_stack_url: base.to_string(),
        ..ChatbotSettings::default()
    }
}
