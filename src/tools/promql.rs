//! Tools that query Prometheus: metric discovery, metadata, PromQL
//! execution and label values.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use regex::RegexBuilder;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use super::prometheus::PrometheusClient;
use super::{optional_str, required_str, Tool};
use crate::executor::catalog;
use crate::types::{ToolDescriptor, ToolOutput};

const MAX_SEARCH_RESULTS: usize = 50;
const MIN_STEP_SECS: i64 = 15;
const RANGE_POINTS: i64 = 60;

/// `search_metrics`: metric names matching a pattern.
pub struct SearchMetricsTool {
    client: Arc<PrometheusClient>,
    descriptor: ToolDescriptor,
}

impl SearchMetricsTool {
    pub fn new(client: Arc<PrometheusClient>) -> Self {
        Self {
            client,
            descriptor: catalog::search_metrics(),
        }
    }
}

/// Case-insensitive regex match, or substring match when the pattern is not a valid regex.
pub fn filter_metric_names(names: &[String], pattern: &str) -> Vec<String> {
    let mut matched: Vec<String> = match RegexBuilder::new(pattern).case_insensitive(true).build() {
        Ok(re) => names.iter().filter(|n| re.is_match(n)).cloned().collect(),
        Err(_) => {
            let needle = pattern.to_lowercase();
            names
                .iter()
                .filter(|n| n.to_lowercase().contains(&needle))
                .cloned()
                .collect()
        }
    };
    matched.sort();
    matched.dedup();
    matched
}

#[async_trait]
impl Tool for SearchMetricsTool {
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
        let pattern = required_str(&params, "pattern")?;
        let names = self.client.metric_names().await?;
        let matched = filter_metric_names(&names, pattern);
        let total = matched.len();

        Ok(ToolOutput::Json(json!({
            "pattern": pattern,
            "total_matches": total,
            "metrics": matched.into_iter().take(MAX_SEARCH_RESULTS).collect::<Vec<_>>(),
            "truncated": total > MAX_SEARCH_RESULTS,
        })))
    }
}

/// `get_metric_metadata`: type, help text and example queries.
pub struct MetricMetadataTool {
    client: Arc<PrometheusClient>,
    descriptor: ToolDescriptor,
}

impl MetricMetadataTool {
    pub fn new(client: Arc<PrometheusClient>) -> Self {
        Self {
            client,
            descriptor: catalog::get_metric_metadata(),
        }
    }
}

/// Typical queries for a metric of the given type.
pub fn example_queries(metric: &str, metric_type: &str) -> Vec<String> {
    match metric_type {
        "counter" => vec![
            format!("rate({}[5m])", metric),
            format!("sum(rate({}[5m])) by (namespace)", metric),
            format!("increase({}[1h])", metric),
        ],
        "histogram" => {
            let base = metric.trim_end_matches("_bucket");
            vec![
                format!("histogram_quantile(0.95, sum(rate({}_bucket[5m])) by (le))", base),
                format!("rate({}_sum[5m]) / rate({}_count[5m])", base, base),
            ]
        }
        "summary" => vec![
            format!("{}{{quantile=\"0.95\"}}", metric),
            format!("rate({}_sum[5m]) / rate({}_count[5m])", metric, metric),
        ],
        _ => vec![
            metric.to_string(),
            format!("avg({}) by (namespace)", metric),
            format!("max_over_time({}[1h])", metric),
        ],
    }
}

#[async_trait]
impl Tool for MetricMetadataTool {
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
        let metric = required_str(&params, "metric_name")?;
        let entries = self.client.metadata(metric).await?;
        let entry = entries
            .first()
            .ok_or_else(|| anyhow!("No metadata found for metric '{}'", metric))?;

        let metric_type = entry.get("type").and_then(|v| v.as_str()).unwrap_or("unknown");
        Ok(ToolOutput::Json(json!({
            "metric_name": metric,
            "type": metric_type,
            "help": entry.get("help").and_then(|v| v.as_str()).unwrap_or(""),
            "unit": entry.get("unit").and_then(|v| v.as_str()).unwrap_or(""),
            "example_queries": example_queries(metric, metric_type),
        })))
    }
}

/// `execute_promql`: instant or range query.
pub struct ExecutePromqlTool {
    client: Arc<PrometheusClient>,
    descriptor: ToolDescriptor,
}

impl ExecutePromqlTool {
    pub fn new(client: Arc<PrometheusClient>) -> Self {
        Self {
            client,
            descriptor: catalog::execute_promql(),
        }
    }
}

/// Parse durations like `30s`, `5m`, `1h`, `1d`, `2w`.
///
/// `None` means an instant query (empty or `now`).
pub fn parse_time_range(range: &str) -> Result<Option<ChronoDuration>> {
    let range = range.trim();
    if range.is_empty() || range.eq_ignore_ascii_case("now") {
        return Ok(None);
    }
    let split = range
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| anyhow!("time_range '{}' has no unit (use s, m, h, d or w)", range))?;
    let (amount, unit) = range.split_at(split);
    let amount: i64 = amount
        .parse()
        .map_err(|_| anyhow!("time_range '{}' must start with a number", range))?;
    let duration = match unit {
        "s" => ChronoDuration::seconds(amount),
        "m" => ChronoDuration::minutes(amount),
        "h" => ChronoDuration::hours(amount),
        "d" => ChronoDuration::days(amount),
        "w" => ChronoDuration::weeks(amount),
        _ => return Err(anyhow!("time_range '{}' has an unknown unit '{}'", range, unit)),
    };
    if duration <= ChronoDuration::zero() {
        return Err(anyhow!("time_range '{}' must be positive", range));
    }
    Ok(Some(duration))
}

const GROUPING_KEYWORDS: &[&str] = &["by", "without", "on", "ignoring", "group_left", "group_right"];
const OPERATOR_KEYWORDS: &[&str] = &["and", "or", "unless", "bool", "offset"];
const AGGREGATIONS: &[&str] = &[
    "sum", "avg", "min", "max", "count", "group", "stddev", "stdvar", "topk", "bottomk", "quantile",
    "count_values",
];

/// Insert a `namespace` matcher into the first selector of a query.
///
/// Queries that already mention a namespace matcher are returned unchanged.
pub fn scope_query(query: &str, namespace: &str) -> String {
    if query.contains("namespace=") || query.contains("namespace!=") {
        return query.to_string();
    }
    let matcher = format!("namespace=\"{}\"", namespace);

    let bytes = query.as_bytes();
    let mut i = 0;
    let mut skip_group_depth: Option<usize> = None;
    let mut depth = 0usize;
    while i < bytes.len() {
        let c = bytes[i] as char;
        match c {
            '"' | '\'' | '`' => {
                i += 1;
                while i < bytes.len() && bytes[i] as char != c {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
                i += 1;
                continue;
            }
            '[' => {
                while i < bytes.len() && bytes[i] != b']' {
                    i += 1;
                }
                i += 1;
                continue;
            }
            '(' => depth += 1,
            ')' => {
                depth = depth.saturating_sub(1);
                if skip_group_depth == Some(depth) {
                    skip_group_depth = None;
                }
            }
            '{' if skip_group_depth.is_none() => {
                let close = query[i..].find('}').map(|p| i + p);
                let inner_empty = close.is_some_and(|p| query[i + 1..p].trim().is_empty());
                let separator = if inner_empty { "" } else { "," };
                return format!("{}{}{}{}", &query[..=i], matcher, separator, &query[i + 1..]);
            }
            _ => {}
        }

        if (c.is_ascii_alphabetic() || c == '_' || c == ':')
            && (i == 0 || !is_ident_char(bytes[i - 1] as char))
        {
            let start = i;
            while i < bytes.len() && is_ident_char(bytes[i] as char) {
                i += 1;
            }
            let ident = &query[start..i];
            if skip_group_depth.is_some() {
                continue;
            }
            let rest = query[i..].trim_start();
            if GROUPING_KEYWORDS.contains(&ident) {
                if rest.starts_with('(') {
                    skip_group_depth = Some(depth);
                }
                continue;
            }
            if rest.starts_with('(') || OPERATOR_KEYWORDS.contains(&ident) || AGGREGATIONS.contains(&ident) {
                continue;
            }
            if rest.starts_with('{') {
                // The selector's own braces are handled on the next pass.
                continue;
            }
            return format!("{}{{{}}}{}", &query[..i], matcher, &query[i..]);
        }
        i += 1;
    }
    query.to_string()
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == ':'
}

#[async_trait]
impl Tool for ExecutePromqlTool {
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
        let query = required_str(&params, "query")?;
        let query = match optional_str(&params, "namespace") {
            Some(namespace) => scope_query(query, namespace),
            None => query.to_string(),
        };
        let range = parse_time_range(optional_str(&params, "time_range").unwrap_or("now"))?;

        let data = match range {
            None => {
                info!(query = %query, "Executing instant PromQL query");
                self.client.query(&query).await?
            }
            Some(range) => {
                let end = Utc::now();
                let start = end - range;
                let step = (range.num_seconds() / RANGE_POINTS).max(MIN_STEP_SECS);
                info!(query = %query, range_secs = range.num_seconds(), step, "Executing range PromQL query");
                self.client
                    .query_range(&query, start.timestamp(), end.timestamp(), step)
                    .await?
            }
        };

        let result = data.get("result").cloned().unwrap_or(Value::Array(Vec::new()));
        let series_count = result.as_array().map(Vec::len).unwrap_or(0);
        Ok(ToolOutput::Json(json!({
            "query": query,
            "result_type": data.get("resultType").cloned().unwrap_or(Value::Null),
            "series_count": series_count,
            "result": result,
        })))
    }
}

/// `get_label_values`: values of a label, optionally within a namespace.
pub struct LabelValuesTool {
    client: Arc<PrometheusClient>,
    descriptor: ToolDescriptor,
}

impl LabelValuesTool {
    pub fn new(client: Arc<PrometheusClient>) -> Self {
        Self {
            client,
            descriptor: catalog::get_label_values(),
        }
    }
}

#[async_trait]
impl Tool for LabelValuesTool {
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
        let label = required_str(&params, "label_name")?;
        let selector = optional_str(&params, "namespace").map(|ns| format!("{{namespace=\"{}\"}}", ns));
        let values = self.client.label_values(label, selector.as_deref()).await?;

        Ok(ToolOutput::Json(json!({
            "label_name": label,
            "count": values.len(),
            "values": values,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn rt() -> tokio::runtime::Runtime {
        tokio::runtime::Runtime::new().unwrap()
    }

    fn client(server: &MockServer) -> Arc<PrometheusClient> {
        Arc::new(PrometheusClient::new(server.uri(), None, Duration::from_secs(5)).unwrap())
    }

    #[test]
    fn test_filter_metric_names() {
        let names: Vec<String> = ["kube_pod_info", "DCGM_FI_DEV_GPU_UTIL", "up", "kube_pod_status_phase"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            filter_metric_names(&names, "pod"),
            vec!["kube_pod_info", "kube_pod_status_phase"]
        );
        assert_eq!(filter_metric_names(&names, "gpu"), vec!["DCGM_FI_DEV_GPU_UTIL"]);
        assert_eq!(filter_metric_names(&names, "^kube_pod_(info|x)$"), vec!["kube_pod_info"]);
        // Invalid regex falls back to substring matching.
        assert!(filter_metric_names(&names, "pod[").is_empty());
        assert_eq!(filter_metric_names(&names, "UP"), vec!["up"]);
    }

    #[test]
    fn test_parse_time_range() {
        assert!(parse_time_range("now").unwrap().is_none());
        assert!(parse_time_range("").unwrap().is_none());
        assert_eq!(parse_time_range("5m").unwrap(), Some(ChronoDuration::minutes(5)));
        assert_eq!(parse_time_range("1h").unwrap(), Some(ChronoDuration::hours(1)));
        assert_eq!(parse_time_range("1d").unwrap(), Some(ChronoDuration::days(1)));
        assert!(parse_time_range("5").is_err());
        assert!(parse_time_range("5y").is_err());
        assert!(parse_time_range("0m").is_err());
        assert!(parse_time_range("abc").is_err());
    }

    #[test]
    fn test_scope_query_inserts_matcher() {
        assert_eq!(scope_query("up", "demo"), "up{namespace=\"demo\"}");
        assert_eq!(
            scope_query("kube_pod_info{phase=\"Running\"}", "demo"),
            "kube_pod_info{namespace=\"demo\",phase=\"Running\"}"
        );
        assert_eq!(scope_query("up{}", "demo"), "up{namespace=\"demo\"}");
        assert_eq!(
            scope_query("sum(rate(container_cpu_usage_seconds_total[5m])) by (pod)", "demo"),
            "sum(rate(container_cpu_usage_seconds_total{namespace=\"demo\"}[5m])) by (pod)"
        );
        assert_eq!(
            scope_query("sum by (pod) (kube_pod_info)", "demo"),
            "sum by (pod) (kube_pod_info{namespace=\"demo\"})"
        );
    }

    #[test]
    fn test_scope_query_keeps_existing_namespace() {
        let query = "kube_pod_info{namespace=\"other\"}";
        assert_eq!(scope_query(query, "demo"), query);
    }

    #[test]
    fn test_example_queries_by_type() {
        assert!(example_queries("http_requests_total", "counter")[0].starts_with("rate("));
        assert!(example_queries("latency_bucket", "histogram")[0].contains("latency_bucket"));
        assert_eq!(example_queries("up", "gauge")[0], "up");
    }

    #[test]
    fn test_execute_promql_with_namespace() {
        rt().block_on(async {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/api/v1/query"))
                .and(query_param("query", "kube_pod_info{namespace=\"demo\"}"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "status": "success",
                    "data": {
                        "resultType": "vector",
                        "result": [{"metric": {"pod": "a"}, "value": [1700000000, "1"]}]
                    }
                })))
                .mount(&server)
                .await;

            let tool = ExecutePromqlTool::new(client(&server));
            let out = tool
                .execute(json!({"query": "kube_pod_info", "namespace": "demo"}))
                .await
                .unwrap();
            let ToolOutput::Json(value) = out else {
                panic!("expected JSON output");
            };
            assert_eq!(value["series_count"], 1);
            assert_eq!(value["result_type"], "vector");
        });
    }

    #[test]
    fn test_execute_promql_range() {
        rt().block_on(async {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/api/v1/query_range"))
                .and(query_param("step", "60s"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "status": "success",
                    "data": {"resultType": "matrix", "result": []}
                })))
                .mount(&server)
                .await;

            let tool = ExecutePromqlTool::new(client(&server));
            let out = tool
                .execute(json!({"query": "up", "time_range": "1h"}))
                .await
                .unwrap();
            assert!(out.to_text().contains("matrix"));
        });
    }

    #[test]
    fn test_search_metrics_caps_results() {
        rt().block_on(async {
            let server = MockServer::start().await;
            let names: Vec<String> = (0..60).map(|i| format!("pod_metric_{:02}", i)).collect();
            Mock::given(method("GET"))
                .and(path("/api/v1/label/__name__/values"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "status": "success",
                    "data": names
                })))
                .mount(&server)
                .await;

            let tool = SearchMetricsTool::new(client(&server));
            let ToolOutput::Json(value) = tool.execute(json!({"pattern": "pod"})).await.unwrap() else {
                panic!("expected JSON output");
            };
            assert_eq!(value["total_matches"], 60);
            assert_eq!(value["metrics"].as_array().unwrap().len(), MAX_SEARCH_RESULTS);
            assert_eq!(value["truncated"], true);
        });
    }

    #[test]
    fn test_label_values_in_namespace() {
        rt().block_on(async {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/api/v1/label/phase/values"))
                .and(query_param("match[]", "{namespace=\"demo\"}"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "status": "success",
                    "data": ["Running", "Pending"]
                })))
                .mount(&server)
                .await;

            let tool = LabelValuesTool::new(client(&server));
            let ToolOutput::Json(value) = tool
                .execute(json!({"label_name": "phase", "namespace": "demo"}))
                .await
                .unwrap()
            else {
                panic!("expected JSON output");
            };
            assert_eq!(value["count"], 2);
        });
    }

    #[test]
    fn test_metadata_missing_metric_fails() {
        rt().block_on(async {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/api/v1/metadata"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "status": "success",
                    "data": {}
                })))
                .mount(&server)
                .await;

            let tool = MetricMetadataTool::new(client(&server));
            let err = tool.execute(json!({"metric_name": "nope"})).await.unwrap_err();
            assert!(err.to_string().contains("nope"));
        });
    }
}
