//! SSE-shaped streaming event emission (§4.6.2), grounded in
//! `ResearchAgent.run_stream`'s `StreamEvent` union. The ten event kinds
//! this emits cover the node-transition trace a chat client renders live.

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::graph::{Next, ResearchAgent};
use crate::state::AgentState;

/// Chars per synthetic token when chunking a completed answer (§4.6.2: "if
/// no tokens were streamed" falls back to one `answer` event split here so
/// the client still sees incremental output).
const TOKEN_CHUNK_CHARS: usize = 24;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StreamEvent {
    Conversation { thread_id: String },
    NodeStart { node: String },
    Thinking { text: String },
    ToolCall { name: String, arguments: Value },
    Papers { papers: Vec<Value>, total: u64 },
    References { references: Vec<Value> },
    Token { text: String },
    Answer { text: String },
    AnswerEnd,
    Done,
    Error { message: String },
}

impl StreamEvent {
    /// The SSE `event:` line (§6 "SSE framing").
    pub fn name(&self) -> &'static str {
        match self {
            StreamEvent::Conversation { .. } => "conversation",
            StreamEvent::NodeStart { .. } => "node_start",
            StreamEvent::Thinking { .. } => "thinking",
            StreamEvent::ToolCall { .. } => "tool_call",
            StreamEvent::Papers { .. } => "papers",
            StreamEvent::References { .. } => "references",
            StreamEvent::Token { .. } => "token",
            StreamEvent::Answer { .. } => "answer",
            StreamEvent::AnswerEnd => "answer_end",
            StreamEvent::Done => "done",
            StreamEvent::Error { .. } => "error",
        }
    }

    /// The SSE `data:` payload: the variant's fields with the internal
    /// `event` discriminant stripped back out, since `name` already carries it.
    pub fn data(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        if let Some(obj) = value.as_object_mut() {
            obj.remove("event");
        }
        value
    }
}

/// A tool result counts as a "papers" event when its first result item has
/// a `title` field (§4.6.2); everything else that carries `references` is
/// emitted as a `references` event instead.
fn papers_event(data: &Value) -> Option<StreamEvent> {
    let results = data.get("results")?.as_array()?;
    let first = results.first()?;
    first.get("title")?;
    let total = data.get("total_count").and_then(Value::as_u64).unwrap_or(results.len() as u64);
    Some(StreamEvent::Papers { papers: results.clone(), total })
}

fn references_event(data: &Value) -> Option<StreamEvent> {
    let references = data.get("references")?.as_array()?.clone();
    Some(StreamEvent::References { references })
}

/// Chunks an already-complete answer into fixed-size pieces so streaming
/// clients still see incremental `token` events even though the underlying
/// completion call in `reason`/`respond` was not itself streamed.
fn chunk_tokens(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(TOKEN_CHUNK_CHARS).map(|c| c.iter().collect()).collect()
}

impl ResearchAgent {
    /// Streaming counterpart to [`ResearchAgent::run`]. Once the receiver is
    /// dropped, further sends are skipped, but the loop still runs to
    /// completion so callers that enqueue memory-persistence work after
    /// `run_stream` returns still get a final `state`.
    pub async fn run_stream(
        &self,
        mut state: AgentState,
        thread_id: &str,
        conversation_summary: Option<&str>,
        user_context: &str,
        tx: mpsc::UnboundedSender<StreamEvent>,
    ) -> Result<AgentState> {
        let mut cancelled = false;
        let emit = |ev: StreamEvent, cancelled: &mut bool| {
            if !*cancelled && tx.send(ev).is_err() {
                *cancelled = true;
            }
        };

        emit(StreamEvent::Conversation { thread_id: thread_id.to_string() }, &mut cancelled);

        let system_prompt = match self.render_system_prompt(conversation_summary, user_context) {
            Ok(p) => p,
            Err(e) => {
                emit(StreamEvent::Error { message: e.to_string() }, &mut cancelled);
                emit(StreamEvent::Done, &mut cancelled);
                return Err(e);
            }
        };

        loop {
            emit(StreamEvent::NodeStart { node: "reason".to_string() }, &mut cancelled);
            let thoughts_before = state.thoughts.len();
            if let Err(e) = self.reason(&mut state, &system_prompt).await {
                emit(StreamEvent::Error { message: e.to_string() }, &mut cancelled);
                emit(StreamEvent::Done, &mut cancelled);
                return Err(e);
            }
            for thought in &state.thoughts[thoughts_before..] {
                emit(StreamEvent::Thinking { text: thought.clone() }, &mut cancelled);
            }

            match self.should_continue(&state) {
                Next::ExecuteTools => {
                    emit(StreamEvent::NodeStart { node: "execute_tools".to_string() }, &mut cancelled);
                    for call in state.tool_calls.clone().into_iter().filter(|tc| tc.result.is_none()) {
                        emit(StreamEvent::ToolCall { name: call.name.clone(), arguments: call.arguments.clone() }, &mut cancelled);
                        let outcome = self.tools().invoke(&call.name, call.arguments.clone()).await;

                        if let Some(data) = &outcome.data {
                            if let Some(ev) = papers_event(data) {
                                emit(ev, &mut cancelled);
                            } else if let Some(ev) = references_event(data) {
                                emit(ev, &mut cancelled);
                            }
                        }

                        let result_value = serde_json::to_value(&outcome).unwrap_or(Value::Null);
                        let content = outcome.data.map(|d| d.to_string()).unwrap_or_else(|| outcome.error.unwrap_or_default());
                        if let Some(stored) = state.tool_calls.iter_mut().find(|tc| tc.id == call.id) {
                            stored.result = Some(result_value);
                        }
                        state.messages.push(quillmind_common::Message::tool_result(call.id.clone(), content));
                    }
                    continue;
                }
                Next::Respond => {
                    emit(StreamEvent::NodeStart { node: "respond".to_string() }, &mut cancelled);
                    let answer = self.respond(&mut state);
                    for chunk in chunk_tokens(&answer) {
                        emit(StreamEvent::Token { text: chunk }, &mut cancelled);
                    }
                    emit(StreamEvent::Answer { text: answer }, &mut cancelled);
                    emit(StreamEvent::AnswerEnd, &mut cancelled);
                    emit(StreamEvent::Done, &mut cancelled);
                    return Ok(state);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::CircuitBreakerManager;
    use crate::tools::ToolRegistry;
    use async_trait::async_trait;
    use quillmind_llm::{LlmBackend, LlmRequest, LlmResponse, LlmRouter, RoutingPolicy};
    use std::sync::Arc;

    struct StubLlm;

    #[async_trait]
    impl LlmBackend for StubLlm {
        async fn complete(&self, _req: LlmRequest) -> quillmind_llm::Result<LlmResponse> {
            Ok(LlmResponse {
                content: r#"{"action":"final_answer","answer":"streamed reply"}"#.to_string(),
                model: "stub".into(),
                prompt_tokens: 1,
                completion_tokens: 1,
            })
        }
        async fn embed(&self, texts: &[String]) -> quillmind_llm::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.0; 4]).collect())
        }
        fn model_id(&self) -> &str {
            "stub"
        }
        fn is_local(&self) -> bool {
            true
        }
        fn max_context_tokens(&self) -> u32 {
            4096
        }
        fn max_output_tokens(&self) -> u32 {
            1024
        }
    }

    fn agent() -> ResearchAgent {
        let tools = Arc::new(ToolRegistry::new(Arc::new(CircuitBreakerManager::new())));
        let mut router = LlmRouter::new(RoutingPolicy::default());
        router.register_backend("local", Arc::new(StubLlm));
        ResearchAgent::new(tools, Arc::new(router), 10)
    }

    #[tokio::test]
    async fn emits_conversation_then_answer_then_done() {
        let agent = agent();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let state = AgentState::new("hello", None, Some("t1".to_string()));

        let final_state = agent.run_stream(state, "t1", None, "", tx).await.unwrap();
        assert_eq!(final_state.final_answer.as_deref(), Some("streamed reply"));

        let mut events = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            events.push(ev);
        }
        assert!(matches!(events.first(), Some(StreamEvent::Conversation { .. })));
        assert!(matches!(events.last(), Some(StreamEvent::Done)));
        assert!(events.iter().any(|e| matches!(e, StreamEvent::Answer { text } if text == "streamed reply")));
    }

    #[tokio::test]
    async fn dropped_receiver_does_not_panic_or_abort_the_loop() {
        let agent = agent();
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let state = AgentState::new("hello", None, None);
        let final_state = agent.run_stream(state, "t1", None, "", tx).await.unwrap();
        assert_eq!(final_state.final_answer.as_deref(), Some("streamed reply"));
    }

    #[test]
    fn data_strips_the_event_discriminant() {
        let ev = StreamEvent::Token { text: "hi".to_string() };
        assert_eq!(ev.name(), "token");
        let data = ev.data();
        assert!(data.get("event").is_none());
        assert_eq!(data["text"], "hi");
    }

    struct FailingLlm;

    #[async_trait]
    impl LlmBackend for FailingLlm {
        async fn complete(&self, _req: LlmRequest) -> quillmind_llm::Result<LlmResponse> {
            Err(quillmind_llm::LlmError::Unavailable("boom".to_string()))
        }
        async fn embed(&self, texts: &[String]) -> quillmind_llm::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.0; 4]).collect())
        }
        fn model_id(&self) -> &str {
            "stub"
        }
        fn is_local(&self) -> bool {
            true
        }
        fn max_context_tokens(&self) -> u32 {
            4096
        }
        fn max_output_tokens(&self) -> u32 {
            1024
        }
    }

    #[tokio::test]
    async fn done_follows_error_when_reasoning_fails() {
        let tools = Arc::new(ToolRegistry::new(Arc::new(CircuitBreakerManager::new())));
        let mut router = LlmRouter::new(RoutingPolicy::default());
        router.register_backend("local", Arc::new(FailingLlm));
        let agent = ResearchAgent::new(tools, Arc::new(router), 10);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let state = AgentState::new("hello", None, Some("t1".to_string()));
        assert!(agent.run_stream(state, "t1", None, "", tx).await.is_err());

        let mut events = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            events.push(ev);
        }
        assert!(matches!(events.last(), Some(StreamEvent::Done)));
        assert!(events.iter().any(|e| matches!(e, StreamEvent::Error { .. })));
    }

    #[test]
    fn papers_event_requires_a_title_on_the_first_result() {
        let data = serde_json::json!({"results": [{"title": "Attention Is All You Need"}], "total_count": 1});
        assert!(matches!(papers_event(&data), Some(StreamEvent::Papers { .. })));

        let no_title = serde_json::json!({"results": [{"score": 0.9}]});
        assert!(papers_event(&no_title).is_none());
    }
}
