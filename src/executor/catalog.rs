//! Built-in descriptors for the observability tools.
//!
//! Used when an executor does not advertise its own tool list, and by the
//! in-process tool server so both execution paths describe tools the same way.

use serde_json::json;

use crate::types::ToolDescriptor;

pub const SEARCH_METRICS: &str = "search_metrics";
pub const GET_METRIC_METADATA: &str = "get_metric_metadata";
pub const EXECUTE_PROMQL: &str = "execute_promql";
pub const GET_LABEL_VALUES: &str = "get_label_values";
pub const SUGGEST_QUERIES: &str = "suggest_queries";
pub const EXPLAIN_RESULTS: &str = "explain_results";

pub fn search_metrics() -> ToolDescriptor {
    ToolDescriptor::new(
        SEARCH_METRICS,
        "Search for Prometheus metrics by pattern (regex supported). Essential for discovering relevant metrics.",
        json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Search pattern or regex for metric names (e.g., 'pod', 'gpu', 'memory')"
                }
            },
            "required": ["pattern"]
        }),
    )
}

pub fn get_metric_metadata() -> ToolDescriptor {
    ToolDescriptor::new(
        GET_METRIC_METADATA,
        "Get detailed metadata about a specific metric including type, help text, available labels, and query examples.",
        json!({
            "type": "object",
            "properties": {
                "metric_name": {
                    "type": "string",
                    "description": "Exact name of the metric to get metadata for"
                }
            },
            "required": ["metric_name"]
        }),
    )
}

pub fn execute_promql() -> ToolDescriptor {
    ToolDescriptor::new(
        EXECUTE_PROMQL,
        "Execute a PromQL query against Prometheus/Thanos and get results. Use this to get actual metric values.",
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Valid PromQL query to execute (use metrics discovered through search_metrics)"
                },
                "time_range": {
                    "type": "string",
                    "description": "Optional time range (e.g., '5m', '1h', '1d')",
                    "default": "now"
                },
                "namespace": {
                    "type": "string",
                    "description": "Optional Kubernetes namespace to restrict the query to"
                }
            },
            "required": ["query"]
        }),
    )
}

pub fn get_label_values() -> ToolDescriptor {
    ToolDescriptor::new(
        GET_LABEL_VALUES,
        "Get all possible values for a specific label across metrics.",
        json!({
            "type": "object",
            "properties": {
                "label_name": {
                    "type": "string",
                    "description": "Name of the label to get values for (e.g., 'namespace', 'phase', 'job')"
                },
                "namespace": {
                    "type": "string",
                    "description": "Optional Kubernetes namespace to restrict the series to"
                }
            },
            "required": ["label_name"]
        }),
    )
}

pub fn suggest_queries() -> ToolDescriptor {
    ToolDescriptor::new(
        SUGGEST_QUERIES,
        "Get PromQL query suggestions based on intent or description.",
        json!({
            "type": "object",
            "properties": {
                "intent": {
                    "type": "string",
                    "description": "What you want to query about the infrastructure (describe in natural language)"
                }
            },
            "required": ["intent"]
        }),
    )
}

pub fn explain_results() -> ToolDescriptor {
    ToolDescriptor::new(
        EXPLAIN_RESULTS,
        "Get human-readable explanation of query results and metrics data.",
        json!({
            "type": "object",
            "properties": {
                "data": {
                    "type": "string",
                    "description": "Query results or metrics data to explain"
                }
            },
            "required": ["data"]
        }),
    )
}

/// The full observability tool set, in presentation order.
pub fn observability_tools() -> Vec<ToolDescriptor> {
    vec![
        search_metrics(),
        get_metric_metadata(),
        execute_promql(),
        get_label_values(),
        suggest_queries(),
        explain_results(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_shape() {
        let tools = observability_tools();
        assert_eq!(tools.len(), 6);
        for tool in &tools {
            assert!(!tool.description.is_empty());
            assert_eq!(tool.input_schema["type"], "object");
            assert!(!tool.required().is_empty(), "{} has no required args", tool.name);
        }
    }

    #[test]
    fn test_namespace_aware_tools() {
        let aware: Vec<String> = observability_tools()
            .into_iter()
            .filter(|t| t.accepts("namespace"))
            .map(|t| t.name)
            .collect();
        assert_eq!(aware, vec![EXECUTE_PROMQL, GET_LABEL_VALUES]);
    }
}
