//! Offline helper tools: query suggestions and result explanations.
//!
//! Neither tool talks to Prometheus. They help the model pick a query and
//! read the numbers that come back.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

use super::{required_str, Tool};
use crate::executor::catalog;
use crate::types::{ToolDescriptor, ToolOutput};

const MAX_TOP_SERIES: usize = 5;

/// Keyword groups and the queries they suggest.
const SUGGESTIONS: &[(&[&str], &[(&str, &str)])] = &[
    (
        &["cpu", "processor", "compute"],
        &[
            ("CPU usage by pod (cores)", "sum(rate(container_cpu_usage_seconds_total{container!=\"\"}[5m])) by (pod)"),
            ("CPU usage by namespace (cores)", "sum(rate(container_cpu_usage_seconds_total{container!=\"\"}[5m])) by (namespace)"),
            ("CPU throttling ratio", "sum(rate(container_cpu_cfs_throttled_periods_total[5m])) by (pod) / sum(rate(container_cpu_cfs_periods_total[5m])) by (pod)"),
        ],
    ),
    (
        &["memory", "mem", "ram", "oom"],
        &[
            ("Working set memory by pod", "sum(container_memory_working_set_bytes{container!=\"\"}) by (pod)"),
            ("Memory usage by namespace", "sum(container_memory_working_set_bytes{container!=\"\"}) by (namespace)"),
            ("OOM killed containers", "kube_pod_container_status_last_terminated_reason{reason=\"OOMKilled\"}"),
        ],
    ),
    (
        &["gpu", "dcgm", "nvidia", "accelerator"],
        &[
            ("GPU utilization", "avg(DCGM_FI_DEV_GPU_UTIL) by (gpu, Hostname)"),
            ("GPU memory used", "sum(DCGM_FI_DEV_FB_USED) by (gpu, Hostname)"),
            ("GPU temperature", "max(DCGM_FI_DEV_GPU_TEMP) by (gpu, Hostname)"),
        ],
    ),
    (
        &["pod", "pods", "running", "pending", "failed", "phase"],
        &[
            ("Pods by phase", "sum(kube_pod_status_phase) by (phase)"),
            ("Running pods", "count(kube_pod_status_phase{phase=\"Running\"} == 1)"),
            ("Pods not ready", "sum(kube_pod_status_ready{condition=\"false\"}) by (pod)"),
        ],
    ),
    (
        &["restart", "restarts", "crash", "crashloop"],
        &[
            ("Container restarts in the last hour", "sum(increase(kube_pod_container_status_restarts_total[1h])) by (pod)"),
            ("Pods in CrashLoopBackOff", "kube_pod_container_status_waiting_reason{reason=\"CrashLoopBackOff\"}"),
        ],
    ),
    (
        &["network", "traffic", "bandwidth", "bytes"],
        &[
            ("Network receive rate by pod", "sum(rate(container_network_receive_bytes_total[5m])) by (pod)"),
            ("Network transmit rate by pod", "sum(rate(container_network_transmit_bytes_total[5m])) by (pod)"),
        ],
    ),
    (
        &["disk", "storage", "volume", "pvc"],
        &[
            ("PVC usage ratio", "kubelet_volume_stats_used_bytes / kubelet_volume_stats_capacity_bytes"),
            ("Filesystem usage by node", "1 - node_filesystem_avail_bytes / node_filesystem_size_bytes"),
        ],
    ),
    (
        &["vllm", "model", "inference", "llm", "token", "latency"],
        &[
            ("Requests running per model", "sum(vllm:num_requests_running) by (model_name)"),
            ("Generation throughput (tokens/s)", "sum(rate(vllm:generation_tokens_total[5m])) by (model_name)"),
            ("P95 end-to-end request latency", "histogram_quantile(0.95, sum(rate(vllm:e2e_request_latency_seconds_bucket[5m])) by (le, model_name))"),
        ],
    ),
];

const GENERAL_SUGGESTIONS: &[(&str, &str)] = &[
    ("Scrape targets that are down", "up == 0"),
    ("Pods by phase", "sum(kube_pod_status_phase) by (phase)"),
    ("CPU usage by namespace (cores)", "sum(rate(container_cpu_usage_seconds_total{container!=\"\"}[5m])) by (namespace)"),
];

/// Suggestions whose keywords appear in the intent, in table order.
pub fn suggest(intent: &str) -> Vec<(&'static str, &'static str)> {
    let words: Vec<String> = intent
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect();

    let mut out: Vec<(&str, &str)> = Vec::new();
    for (keywords, queries) in SUGGESTIONS {
        if keywords.iter().any(|k| words.iter().any(|w| w == k)) {
            for entry in queries.iter() {
                if !out.contains(entry) {
                    out.push(*entry);
                }
            }
        }
    }
    if out.is_empty() {
        out.extend_from_slice(GENERAL_SUGGESTIONS);
    }
    out
}

/// `suggest_queries`: PromQL templates for a natural-language intent.
pub struct SuggestQueriesTool {
    descriptor: ToolDescriptor,
}

impl SuggestQueriesTool {
    pub fn new() -> Self {
        Self {
            descriptor: catalog::suggest_queries(),
        }
    }
}

impl Default for SuggestQueriesTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for SuggestQueriesTool {
    fn name(&self) -> &str {
        &self.descriptor.name
    }

    fn description(&self) -> &str {
        &self.descriptor.description
    }

    fn parameters_schema(&self) -> Value {
        self.descriptor.input_schema.clone()
    }

    async fn execute(&self, params: Value) -> Result<ToolOutput> {
        let intent = required_str(&params, "intent")?;
        let suggestions: Vec<Value> = suggest(intent)
            .into_iter()
            .map(|(description, query)| json!({"description": description, "query": query}))
            .collect();
        Ok(ToolOutput::Json(json!({
            "intent": intent,
            "suggestions": suggestions,
        })))
    }
}

/// `explain_results`: plain-language summary of query results.
pub struct ExplainResultsTool {
    descriptor: ToolDescriptor,
}

impl ExplainResultsTool {
    pub fn new() -> Self {
        Self {
            descriptor: catalog::explain_results(),
        }
    }
}

impl Default for ExplainResultsTool {
    fn default() -> Self {
        Self::new()
    }
}

/// Locate `(result_type, result)` in the shapes results usually arrive in:
/// a raw API response, its `data` field, our own `execute_promql` output,
/// or a bare result array.
fn locate_result(value: &Value) -> Option<(String, &Vec<Value>)> {
    if let Some(array) = value.as_array() {
        let kind = if array.iter().any(|s| s.get("values").is_some()) {
            "matrix"
        } else {
            "vector"
        };
        return Some((kind.to_string(), array));
    }
    let object = value.get("data").filter(|d| d.is_object()).unwrap_or(value);
    let result = object.get("result")?.as_array()?;
    let kind = object
        .get("resultType")
        .or_else(|| object.get("result_type"))
        .and_then(|v| v.as_str())
        .unwrap_or("vector");
    Some((kind.to_string(), result))
}

fn sample_value(point: &Value) -> Option<f64> {
    point.get(1)?.as_str()?.parse().ok()
}

fn series_label(series: &Value) -> String {
    let Some(metric) = series.get("metric").and_then(|m| m.as_object()) else {
        return "{}".to_string();
    };
    let name = metric.get("__name__").and_then(|v| v.as_str()).unwrap_or("");
    let labels: Vec<String> = metric
        .iter()
        .filter(|(k, _)| k.as_str() != "__name__")
        .map(|(k, v)| format!("{}=\"{}\"", k, v.as_str().unwrap_or_default()))
        .collect();
    format!("{}{{{}}}", name, labels.join(", "))
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{:.4}", value)
    }
}

/// Summarize Prometheus results as text.
pub fn explain(data: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(data) else {
        let lines = data.lines().filter(|l| !l.trim().is_empty()).count();
        return format!(
            "The data is not Prometheus JSON ({} non-empty lines of text); it cannot be summarized numerically.",
            lines
        );
    };
    let Some((kind, series)) = locate_result(&value) else {
        return "The data does not contain a Prometheus result set.".to_string();
    };
    if series.is_empty() {
        return format!(
            "The {} result is empty: no series matched the query. Check metric names, label filters and the time range.",
            kind
        );
    }

    // Latest value of every series.
    let mut latest: Vec<(String, f64)> = series
        .iter()
        .filter_map(|s| {
            let value = match s.get("values").and_then(|v| v.as_array()) {
                Some(points) => points.last().and_then(sample_value),
                None => s.get("value").and_then(sample_value),
            };
            value.map(|v| (series_label(s), v))
        })
        .collect();

    let mut lines = vec![format!("Result type: {}, {} series.", kind, series.len())];
    if latest.is_empty() {
        lines.push("No numeric samples were found.".to_string());
        return lines.join("\n");
    }

    let count = latest.len() as f64;
    let min = latest.iter().map(|(_, v)| *v).fold(f64::INFINITY, f64::min);
    let max = latest.iter().map(|(_, v)| *v).fold(f64::NEG_INFINITY, f64::max);
    let sum: f64 = latest.iter().map(|(_, v)| *v).sum();
    lines.push(format!(
        "Latest values: min {}, max {}, avg {}, total {}.",
        format_number(min),
        format_number(max),
        format_number(sum / count),
        format_number(sum)
    ));

    latest.sort_by(|a, b| b.1.total_cmp(&a.1));
    lines.push("Top series:".to_string());
    for (label, value) in latest.iter().take(MAX_TOP_SERIES) {
        lines.push(format!("- {} = {}", label, format_number(*value)));
    }
    lines.join("\n")
}

#[async_trait]
impl Tool for ExplainResultsTool {
    fn name(&self) -> &str {
        &self.descriptor.name
    }

    fn description(&self) -> &str {
        &self.descriptor.description
    }

    fn parameters_schema(&self) -> Value {
        self.descriptor.input_schema.clone()
    }

    async fn execute(&self, params: Value) -> Result<ToolOutput> {
        let data = required_str(&params, "data")?;
        Ok(ToolOutput::Text(explain(data)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rt() -> tokio::runtime::Runtime {
        tokio::runtime::Runtime::new().unwrap()
    }

    #[test]
    fn test_suggest_by_keyword() {
        let gpu = suggest("How busy are the GPUs? gpu usage please");
        assert!(gpu.iter().all(|(_, q)| q.contains("DCGM")));

        let mixed = suggest("cpu and memory of my pods");
        assert!(mixed.iter().any(|(_, q)| q.contains("cpu")));
        assert!(mixed.iter().any(|(_, q)| q.contains("memory")));
        assert!(mixed.iter().any(|(_, q)| q.contains("kube_pod_status_phase")));
    }

    #[test]
    fn test_suggest_falls_back_to_general() {
        assert_eq!(suggest("anything interesting?").len(), GENERAL_SUGGESTIONS.len());
    }

    #[test]
    fn test_explain_vector() {
        let data = r#"{"status":"success","data":{"resultType":"vector","result":[
            {"metric":{"pod":"a"},"value":[1700000000,"3"]},
            {"metric":{"pod":"b"},"value":[1700000000,"7"]}
        ]}}"#;
        let text = explain(data);
        assert!(text.contains("vector, 2 series"));
        assert!(text.contains("min 3, max 7, avg 5, total 10"));
        let b = text.find("pod=\"b\"").unwrap();
        let a = text.find("pod=\"a\"").unwrap();
        assert!(b < a, "series sorted by value descending");
    }

    #[test]
    fn test_explain_matrix_uses_latest_point() {
        let data = r#"{"result_type":"matrix","result":[
            {"metric":{"__name__":"up","job":"x"},"values":[[1,"0"],[2,"1"]]}
        ]}"#;
        let text = explain(data);
        assert!(text.contains("matrix, 1 series"));
        assert!(text.contains("up{job=\"x\"} = 1"));
    }

    #[test]
    fn test_explain_empty_and_non_json() {
        assert!(explain(r#"{"resultType":"vector","result":[]}"#).contains("empty"));
        assert!(explain("just some words").contains("not Prometheus JSON"));
        assert!(explain(r#"{"foo": 1}"#).contains("does not contain"));
    }

    #[test]
    fn test_tools_execute() {
        rt().block_on(async {
            let out = SuggestQueriesTool::new()
                .execute(json!({"intent": "pod restarts"}))
                .await
                .unwrap();
            assert!(out.to_text().contains("kube_pod_container_status_restarts_total"));

            let out = ExplainResultsTool::new()
                .execute(json!({"data": "[]"}))
                .await
                .unwrap();
            assert!(out.to_text().contains("empty"));
            assert!(ExplainResultsTool::new().execute(json!({})).await.is_err());
        });
    }
}
