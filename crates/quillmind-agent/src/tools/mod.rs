//! Tool catalog (§4.6.1/§4.6.3), grounded in `BaseTool`/`ToolRegistry`
//! generalized from `ferrumyx_agent::tools::{FerrumyxTool, ToolRegistry}`.
//! Every tool call is routed through an independent circuit breaker before
//! `execute` ever runs.

pub mod analyze_paper;
pub mod ask_paper;
pub mod generate_mindmap;
pub mod search_literature;
pub mod semantic_search;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;

use crate::circuit::{degraded_response, CircuitBreakerManager};

/// `ToolResult` (§4.6.1): `{success, data?, error?, duration_ms, is_degraded}`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
    pub is_degraded: bool,
}

impl ToolOutcome {
    pub fn ok(data: Value, duration_ms: u64) -> Self {
        Self { success: true, data: Some(data), error: None, duration_ms, is_degraded: false }
    }

    pub fn failed(error: impl Into<String>, duration_ms: u64) -> Self {
        Self { success: false, data: None, error: Some(error.into()), duration_ms, is_degraded: false }
    }
}

#[async_trait]
pub trait AgentTool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters_schema(&self) -> Value;
    /// The tool's own logic. Circuit-breaker gating and timing are handled
    /// by [`ToolRegistry::invoke`], not by implementors.
    async fn execute(&self, params: Value) -> anyhow::Result<Value>;
}

/// Routes every call through the tool's circuit breaker (§4.6.1): an open
/// breaker short-circuits to a [`DegradedResponse`](crate::circuit::DegradedResponse)
/// without running `execute`; any other outcome updates the breaker.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn AgentTool>>,
    breakers: Arc<CircuitBreakerManager>,
}

impl ToolRegistry {
    pub fn new(breakers: Arc<CircuitBreakerManager>) -> Self {
        Self { tools: HashMap::new(), breakers }
    }

    pub fn register<T: AgentTool + 'static>(&mut self, tool: T) {
        let name = tool.name().to_string();
        assert!(!self.tools.contains_key(&name), "duplicate tool name: {name}");
        self.tools.insert(name, Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn AgentTool>> {
        self.tools.get(name)
    }

    /// The breaker manager backing every tool's gated dispatch, exposed so
    /// the HTTP edge can serve `GET /agent/circuit-breakers` and the
    /// privileged reset endpoint (§6) without duplicating breaker state.
    pub fn breakers(&self) -> &Arc<CircuitBreakerManager> {
        &self.breakers
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// The LLM-facing function manifest (OpenAI-style function-calling shape).
    pub fn manifest(&self) -> Value {
        let tools: Vec<Value> = self
            .tools
            .values()
            .map(|t| {
                serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": t.name(),
                        "description": t.description(),
                        "parameters": t.parameters_schema(),
                    }
                })
            })
            .collect();
        serde_json::json!(tools)
    }

    /// One-line-per-tool summary for the system prompt.
    pub fn tool_descriptions(&self) -> String {
        self.tools.values().map(|t| format!("- {}: {}", t.name(), t.description())).collect::<Vec<_>>().join("\n")
    }

    pub async fn invoke(&self, name: &str, params: Value) -> ToolOutcome {
        let started = Instant::now();

        let Some(tool) = self.tools.get(name) else {
            return ToolOutcome::failed(format!("unknown tool: {name}"), started.elapsed().as_millis() as u64);
        };

        let breaker = self.breakers.breaker(name).await;
        if !breaker.can_execute().await {
            tracing::warn!(tool = name, "circuit breaker open, returning degraded response");
            let degraded = degraded_response(name);
            // §8 testable property: an open breaker never touches the tool's
            // remote endpoint, so duration_ms is exactly 0, not measured.
            return ToolOutcome {
                success: false,
                data: Some(serde_json::to_value(&degraded).unwrap_or_default()),
                error: Some(degraded.hint.clone()),
                duration_ms: 0,
                is_degraded: true,
            };
        }

        match tool.execute(params).await {
            Ok(data) => {
                breaker.record_success().await;
                ToolOutcome::ok(data, started.elapsed().as_millis() as u64)
            }
            Err(reason) => {
                breaker.record_failure().await;
                tracing::warn!(tool = name, %reason, "tool execution failed");
                ToolOutcome::failed(reason.to_string(), started.elapsed().as_millis() as u64)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl AgentTool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes the input back."
        }
        fn parameters_schema(&self) -> Value {
            serde_json::json!({"type": "object", "properties": {"message": {"type": "string"}}})
        }
        async fn execute(&self, params: Value) -> anyhow::Result<Value> {
            Ok(serde_json::json!({"echo": params["message"]}))
        }
    }

    struct FailingTool;

    #[async_trait]
    impl AgentTool for FailingTool {
        fn name(&self) -> &str {
            "semantic_search"
        }
        fn description(&self) -> &str {
            "always fails"
        }
        fn parameters_schema(&self) -> Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(&self, _params: Value) -> anyhow::Result<Value> {
            anyhow::bail!("boom")
        }
    }

    #[tokio::test]
    async fn invoke_unknown_tool_fails_without_touching_a_breaker() {
        let registry = ToolRegistry::new(Arc::new(CircuitBreakerManager::new()));
        let outcome = registry.invoke("missing", serde_json::json!({})).await;
        assert!(!outcome.success);
        assert!(!outcome.is_degraded);
    }

    #[tokio::test]
    async fn invoke_success_returns_data() {
        let mut registry = ToolRegistry::new(Arc::new(CircuitBreakerManager::new()));
        registry.register(EchoTool);
        let outcome = registry.invoke("echo", serde_json::json!({"message": "hi"})).await;
        assert!(outcome.success);
        assert_eq!(outcome.data.unwrap()["echo"], "hi");
    }

    #[tokio::test]
    async fn repeated_failures_open_the_breaker_and_degrade() {
        let mut registry = ToolRegistry::new(Arc::new(CircuitBreakerManager::new()));
        registry.register(FailingTool);
        for _ in 0..5 {
            let outcome = registry.invoke("semantic_search", serde_json::json!({})).await;
            assert!(!outcome.success);
        }
        let degraded = registry.invoke("semantic_search", serde_json::json!({})).await;
        assert!(degraded.is_degraded);
        assert_eq!(degraded.duration_ms, 0);
    }
}
