//! Circuit-breaker state shape (§3). Transition logic lives in quillmind-agent;
//! this is the data the agent and the `/agent/circuit-breakers` endpoint share.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitStats {
    pub tool: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opened_at: Option<DateTime<Utc>>,
    pub half_open_probes: u32,
    pub half_open_successes: u32,
}
