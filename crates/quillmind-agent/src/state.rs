//! Agent state (§4.6), grounded in `AgentState`/`ToolCall`.

use quillmind_common::Message;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool invocation the reasoning step decided to make, carried alongside
/// its (eventual) result so a transcript of the turn can be reconstructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self { id: id.into(), name: name.into(), arguments, result: None }
    }
}

/// Threaded through every node of the `reason -> execute_tools -> respond`
/// loop. One `AgentState` is built per `run`/`run_stream` call and mutated
/// in place as the loop advances.
#[derive(Debug, Clone, Default)]
pub struct AgentState {
    pub messages: Vec<Message>,
    pub user_input: String,
    pub user_id: Option<String>,
    pub thread_id: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub iteration: u32,
    pub should_continue: bool,
    pub final_answer: Option<String>,
    pub thoughts: Vec<String>,
}

impl AgentState {
    pub fn new(user_input: impl Into<String>, user_id: Option<String>, thread_id: Option<String>) -> Self {
        Self {
            messages: Vec::new(),
            user_input: user_input.into(),
            user_id,
            thread_id,
            tool_calls: Vec::new(),
            iteration: 0,
            should_continue: true,
            final_answer: None,
            thoughts: Vec::new(),
        }
    }

    pub fn has_pending_tool_calls(&self) -> bool {
        self.tool_calls.iter().any(|tc| tc.result.is_none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_starts_with_no_pending_tool_calls() {
        let state = AgentState::new("hello", None, None);
        assert!(!state.has_pending_tool_calls());
        assert_eq!(state.iteration, 0);
    }

    #[test]
    fn has_pending_tool_calls_detects_unresolved_entries() {
        let mut state = AgentState::new("hello", None, None);
        state.tool_calls.push(ToolCall::new("1", "semantic_search", serde_json::json!({})));
        assert!(state.has_pending_tool_calls());
        state.tool_calls[0].result = Some(serde_json::json!({"ok": true}));
        assert!(!state.has_pending_tool_calls());
    }
}
