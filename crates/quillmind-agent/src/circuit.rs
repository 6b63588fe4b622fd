//! Tool-level circuit breakers (§4.6.1), grounded in `CircuitBreaker`/
//! `CircuitBreakerManager`. The state shape (`CircuitState`/`CircuitStats`)
//! lives in `quillmind_common`; this module owns the transition logic.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use quillmind_common::circuit::{CircuitState, CircuitStats};
use serde::Serialize;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    pub fail_threshold: u32,
    pub reset_timeout: Duration,
    pub half_open_max_calls: u32,
    pub success_threshold: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            fail_threshold: 5,
            reset_timeout: Duration::from_secs(30),
            half_open_max_calls: 3,
            success_threshold: 2,
        }
    }
}

/// Per-tool overrides, grounded verbatim in `CircuitBreakerManager.TOOL_CONFIGS`.
fn config_for_tool(tool: &str) -> BreakerConfig {
    match tool {
        "search_literature" | "get_work_detail" | "get_related_works" => {
            BreakerConfig { fail_threshold: 3, reset_timeout: Duration::from_secs(60), ..BreakerConfig::default() }
        }
        "semantic_search" | "ask_paper" => BreakerConfig { fail_threshold: 5, reset_timeout: Duration::from_secs(30), ..BreakerConfig::default() },
        "analyze_paper" | "generate_mindmap" => {
            BreakerConfig { fail_threshold: 5, reset_timeout: Duration::from_secs(45), ..BreakerConfig::default() }
        }
        _ => BreakerConfig::default(),
    }
}

struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<chrono::DateTime<Utc>>,
    half_open_calls: u32,
    half_open_successes: u32,
}

impl BreakerInner {
    fn new() -> Self {
        Self { state: CircuitState::Closed, consecutive_failures: 0, opened_at: None, half_open_calls: 0, half_open_successes: 0 }
    }
}

pub struct CircuitBreaker {
    tool: String,
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    fn new(tool: impl Into<String>, config: BreakerConfig) -> Self {
        Self { tool: tool.into(), config, inner: Mutex::new(BreakerInner::new()) }
    }

    /// `can_execute`: closed always admits; open admits only once
    /// `reset_timeout` has elapsed, transitioning to half-open on admission;
    /// half-open admits up to `half_open_max_calls` probes.
    pub async fn can_execute(&self) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let elapsed = inner.opened_at.map(|at| Utc::now().signed_duration_since(at)).and_then(|d| d.to_std().ok());
                if elapsed.map(|e| e >= self.config.reset_timeout).unwrap_or(false) {
                    tracing::info!(tool = %self.tool, "circuit breaker OPEN -> HALF_OPEN");
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_calls = 1;
                    inner.half_open_successes = 0;
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if inner.half_open_calls < self.config.half_open_max_calls {
                    inner.half_open_calls += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub async fn record_success(&self) {
        let mut inner = self.inner.lock().await;
        inner.consecutive_failures = 0;
        if inner.state == CircuitState::HalfOpen {
            inner.half_open_successes += 1;
            if inner.half_open_successes >= self.config.success_threshold {
                tracing::info!(tool = %self.tool, "circuit breaker HALF_OPEN -> CLOSED");
                inner.state = CircuitState::Closed;
                inner.half_open_calls = 0;
                inner.half_open_successes = 0;
            }
        }
    }

    pub async fn record_failure(&self) {
        let mut inner = self.inner.lock().await;
        inner.consecutive_failures += 1;
        match inner.state {
            CircuitState::HalfOpen => self.open(&mut inner),
            CircuitState::Closed if inner.consecutive_failures >= self.config.fail_threshold => self.open(&mut inner),
            _ => {}
        }
    }

    fn open(&self, inner: &mut BreakerInner) {
        tracing::warn!(tool = %self.tool, failures = inner.consecutive_failures, "circuit breaker opened");
        inner.state = CircuitState::Open;
        inner.opened_at = Some(Utc::now());
        inner.half_open_calls = 0;
        inner.half_open_successes = 0;
    }

    pub async fn stats(&self) -> CircuitStats {
        let inner = self.inner.lock().await;
        CircuitStats {
            tool: self.tool.clone(),
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            opened_at: inner.opened_at,
            half_open_probes: inner.half_open_calls,
            half_open_successes: inner.half_open_successes,
        }
    }

    pub async fn is_open(&self) -> bool {
        self.inner.lock().await.state == CircuitState::Open
    }
}

/// Owns one breaker per tool name, created lazily on first access.
#[derive(Default)]
pub struct CircuitBreakerManager {
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakerManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn breaker(&self, tool: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock().await;
        breakers
            .entry(tool.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(tool, config_for_tool(tool))))
            .clone()
    }

    pub async fn all_stats(&self) -> Vec<CircuitStats> {
        let breakers = self.breakers.lock().await;
        let mut out = Vec::with_capacity(breakers.len());
        for breaker in breakers.values() {
            out.push(breaker.stats().await);
        }
        out
    }

    pub async fn reset(&self, tool: &str) -> bool {
        let breakers = self.breakers.lock().await;
        if let Some(breaker) = breakers.get(tool) {
            let mut inner = breaker.inner.lock().await;
            *inner = BreakerInner::new();
            true
        } else {
            false
        }
    }
}

/// Structured degraded response surfaced to the LLM when a breaker is open
/// (§4.6.1). Passed back as the tool's result; the agent re-enters `reason`.
#[derive(Debug, Clone, Serialize)]
pub struct DegradedResponse {
    pub status: &'static str,
    pub tool: String,
    pub alternatives: Vec<&'static str>,
    pub hint: String,
    pub instruction: &'static str,
}

const DEGRADED_INSTRUCTION: &str =
    "Try the alternative tools listed, or answer from your own knowledge. Do not tell the user to retry later.";

/// Static alternatives table (§4.6.1/§4.6.3).
fn alternatives_for(tool: &str) -> Vec<&'static str> {
    match tool {
        "search_literature" => vec!["semantic_search"],
        "ask_paper" => vec!["semantic_search"],
        "analyze_paper" => vec!["semantic_search", "ask_paper"],
        "generate_mindmap" => vec!["analyze_paper"],
        "semantic_search" => vec!["ask_paper"],
        _ => Vec::new(),
    }
}

pub fn degraded_response(tool: &str) -> DegradedResponse {
    let alternatives = alternatives_for(tool);
    DegradedResponse {
        status: "degraded",
        tool: tool.to_string(),
        hint: format!("{tool} is temporarily unavailable (circuit open)"),
        alternatives,
        instruction: DEGRADED_INSTRUCTION,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn closed_breaker_admits_calls() {
        let breaker = CircuitBreaker::new("t", BreakerConfig::default());
        assert!(breaker.can_execute().await);
    }

    #[tokio::test]
    async fn opens_after_fail_threshold_consecutive_failures() {
        let breaker = CircuitBreaker::new("t", BreakerConfig { fail_threshold: 2, ..BreakerConfig::default() });
        breaker.record_failure().await;
        assert!(!breaker.is_open().await);
        breaker.record_failure().await;
        assert!(breaker.is_open().await);
        assert!(!breaker.can_execute().await);
    }

    #[tokio::test]
    async fn half_open_probe_success_closes_circuit() {
        let breaker = CircuitBreaker::new(
            "t",
            BreakerConfig { fail_threshold: 1, reset_timeout: Duration::from_millis(0), success_threshold: 1, ..BreakerConfig::default() },
        );
        breaker.record_failure().await;
        assert!(breaker.is_open().await);
        assert!(breaker.can_execute().await);
        breaker.record_success().await;
        assert!(!breaker.is_open().await);
    }

    #[tokio::test]
    async fn half_open_failure_reopens_circuit() {
        let breaker = CircuitBreaker::new(
            "t",
            BreakerConfig { fail_threshold: 1, reset_timeout: Duration::from_millis(0), ..BreakerConfig::default() },
        );
        breaker.record_failure().await;
        assert!(breaker.can_execute().await);
        breaker.record_failure().await;
        assert!(breaker.is_open().await);
    }

    #[tokio::test]
    async fn manager_reuses_the_same_breaker_instance() {
        let manager = CircuitBreakerManager::new();
        let a = manager.breaker("semantic_search").await;
        let b = manager.breaker("semantic_search").await;
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn degraded_response_for_search_literature_suggests_alternatives() {
        let resp = degraded_response("search_literature");
        assert_eq!(resp.status, "degraded");
        assert_eq!(resp.alternatives, vec!["semantic_search"]);
    }
}
