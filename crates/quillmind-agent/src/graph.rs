//! The `reason -> execute_tools -> respond` state machine (§4.6), grounded
//! in `ResearchAgent`/`_reason_node`/`_execute_tools_node`/`_respond_node`/
//! `_should_continue`/`run`.

use std::sync::Arc;

use minijinja::{context, Environment};
use quillmind_common::{Message, Role};
use quillmind_llm::{LlmRequest, LlmRole, LlmRouter, Message as LlmMessage};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{AgentError, Result};
use crate::state::{AgentState, ToolCall};
use crate::tools::ToolRegistry;

const SYSTEM_PROMPT_TEMPLATE: &str = "\
You are QuillMind, a research assistant that helps the user work with their uploaded academic papers.

Available tools:
{{ tool_descriptions }}

{% if conversation_summary %}Earlier conversation summary: {{ conversation_summary }}
{% endif %}\
{% if user_context %}Relevant background recalled from past conversations: {{ user_context }}
{% endif %}\
Respond with a single JSON object, either:
  {\"action\": \"tool_call\", \"tool\": \"<tool name>\", \"arguments\": { ... }}
  {\"action\": \"final_answer\", \"answer\": \"<your answer to the user>\"}
Call at most one tool per turn. If a tool result says it is degraded, use one of its suggested \
alternatives or answer from your own knowledge instead of calling the same tool again.";

const FIXED_APOLOGY: &str =
    "I wasn't able to work out a confident answer to that. Could you rephrase the question or narrow it down?";

/// What the model decided to do this turn, parsed out of its JSON-mode reply.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum ReasonDecision {
    ToolCall { tool: String, #[serde(default)] arguments: Value },
    FinalAnswer { answer: String },
}

/// Where `_should_continue` routes the loop next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Next {
    ExecuteTools,
    Respond,
}

pub struct ResearchAgent {
    tools: Arc<ToolRegistry>,
    router: Arc<LlmRouter>,
    max_iterations: u32,
    jinja: Environment<'static>,
}

impl ResearchAgent {
    pub fn new(tools: Arc<ToolRegistry>, router: Arc<LlmRouter>, max_iterations: u32) -> Self {
        let mut jinja = Environment::new();
        jinja.add_template_owned("system", SYSTEM_PROMPT_TEMPLATE.to_string()).expect("system prompt template is valid jinja");
        Self { tools, router, max_iterations, jinja }
    }

    pub(crate) fn render_system_prompt(&self, conversation_summary: Option<&str>, user_context: &str) -> Result<String> {
        let tmpl = self.jinja.get_template("system").map_err(|e| AgentError::Other(e.into()))?;
        let rendered = tmpl
            .render(context! {
                tool_descriptions => self.tools.tool_descriptions(),
                conversation_summary => conversation_summary,
                user_context => if user_context.is_empty() { None } else { Some(user_context) },
            })
            .map_err(|e| AgentError::Other(e.into()))?;
        Ok(rendered)
    }

    fn to_llm_messages(&self, system_prompt: &str, messages: &[Message], user_input: &str) -> Vec<LlmMessage> {
        let mut out = vec![LlmMessage::system(system_prompt)];
        for m in messages {
            out.push(match m.role {
                Role::Assistant => LlmMessage::assistant(&m.content),
                Role::System => LlmMessage::system(&m.content),
                Role::User | Role::Tool => LlmMessage::user(&m.content),
            });
        }
        out.push(LlmMessage::user(user_input));
        out
    }

    /// `_reason_node`: asks the model whether to call a tool or answer, and
    /// mutates `state` accordingly. Emits at most one pending [`ToolCall`].
    pub(crate) async fn reason(&self, state: &mut AgentState, system_prompt: &str) -> Result<()> {
        state.iteration += 1;
        let llm_messages = self.to_llm_messages(system_prompt, &state.messages, &state.user_input);

        let mut request = LlmRequest::new(llm_messages);
        request.json_mode = true;
        let response = self.router.complete(LlmRole::Main, request).await?;

        match serde_json::from_str::<ReasonDecision>(&response.content) {
            Ok(ReasonDecision::ToolCall { tool, arguments }) => {
                state.thoughts.push(format!("decided to call {tool}"));
                state.tool_calls.push(ToolCall::new(Uuid::new_v4().to_string(), tool, arguments));
            }
            Ok(ReasonDecision::FinalAnswer { answer }) => {
                state.final_answer = Some(answer);
            }
            Err(_) => {
                // Model didn't follow the JSON contract; treat the raw reply
                // as the answer rather than failing the turn outright.
                state.thoughts.push("reply did not match the JSON action contract, using it verbatim".to_string());
                state.final_answer = Some(response.content);
            }
        }
        Ok(())
    }

    /// `_execute_tools_node`: runs every pending tool call through the
    /// breaker-gated [`ToolRegistry`] and records its result back onto the
    /// matching [`ToolCall`].
    pub(crate) async fn execute_tools(&self, state: &mut AgentState) {
        for call in state.tool_calls.iter_mut().filter(|tc| tc.result.is_none()) {
            let outcome = self.tools.invoke(&call.name, call.arguments.clone()).await;
            call.result = Some(serde_json::to_value(&outcome).unwrap_or(Value::Null));
            let content = outcome.data.map(|d| d.to_string()).unwrap_or_else(|| outcome.error.unwrap_or_default());
            state.messages.push(Message::tool_result(call.id.clone(), content));
        }
    }

    pub(crate) fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    pub(crate) fn should_continue(&self, state: &AgentState) -> Next {
        if state.iteration >= self.max_iterations {
            return Next::Respond;
        }
        if state.has_pending_tool_calls() {
            return Next::ExecuteTools;
        }
        Next::Respond
    }

    /// `_respond_node`: finalizes the turn's answer, falling back to the
    /// fixed apology when no `final_answer` was ever produced.
    pub(crate) fn respond(&self, state: &mut AgentState) -> String {
        state.should_continue = false;
        state.final_answer.clone().unwrap_or_else(|| FIXED_APOLOGY.to_string())
    }

    /// Blocking end-to-end turn: loops `reason`/`execute_tools` until
    /// `_should_continue` routes to `respond`, then returns the final answer.
    pub async fn run(&self, mut state: AgentState, conversation_summary: Option<&str>, user_context: &str) -> Result<String> {
        let system_prompt = self.render_system_prompt(conversation_summary, user_context)?;

        loop {
            self.reason(&mut state, &system_prompt).await?;
            match self.should_continue(&state) {
                Next::ExecuteTools => {
                    self.execute_tools(&mut state).await;
                    continue;
                }
                Next::Respond => return Ok(self.respond(&mut state)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::CircuitBreakerManager;
    use async_trait::async_trait;
    use quillmind_llm::{LlmBackend, LlmResponse, RoutingPolicy};

    struct ScriptedLlm {
        replies: std::sync::Mutex<Vec<&'static str>>,
    }

    #[async_trait]
    impl LlmBackend for ScriptedLlm {
        async fn complete(&self, _req: LlmRequest) -> quillmind_llm::Result<LlmResponse> {
            let mut replies = self.replies.lock().unwrap();
            let content = if replies.is_empty() { FIXED_APOLOGY.to_string() } else { replies.remove(0).to_string() };
            Ok(LlmResponse { content, model: "stub".into(), prompt_tokens: 1, completion_tokens: 1 })
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

    fn router_with(replies: Vec<&'static str>) -> LlmRouter {
        let mut router = LlmRouter::new(RoutingPolicy::default());
        router.register_backend("local", Arc::new(ScriptedLlm { replies: std::sync::Mutex::new(replies) }));
        router
    }

    #[tokio::test]
    async fn immediate_final_answer_skips_tool_execution() {
        let tools = Arc::new(ToolRegistry::new(Arc::new(CircuitBreakerManager::new())));
        let router = Arc::new(router_with(vec![r#"{"action":"final_answer","answer":"the paper is about RAG"}"#]));
        let agent = ResearchAgent::new(tools, router, 10);

        let state = AgentState::new("what is this paper about?", None, None);
        let answer = agent.run(state, None, "").await.unwrap();
        assert_eq!(answer, "the paper is about RAG");
    }

    #[tokio::test]
    async fn unparseable_reply_falls_back_to_verbatim_answer() {
        let tools = Arc::new(ToolRegistry::new(Arc::new(CircuitBreakerManager::new())));
        let router = Arc::new(router_with(vec!["not json at all"]));
        let agent = ResearchAgent::new(tools, router, 10);

        let state = AgentState::new("hi", None, None);
        let answer = agent.run(state, None, "").await.unwrap();
        assert_eq!(answer, "not json at all");
    }

    #[tokio::test]
    async fn max_iterations_forces_the_fixed_apology() {
        let tools = Arc::new(ToolRegistry::new(Arc::new(CircuitBreakerManager::new())));
        // every reply asks to call a tool that doesn't exist, so the loop
        // never reaches a final_answer and must be cut off by max_iterations.
        let router = Arc::new(router_with(vec![
            r#"{"action":"tool_call","tool":"missing","arguments":{}}"#,
            r#"{"action":"tool_call","tool":"missing","arguments":{}}"#,
        ]));
        let agent = ResearchAgent::new(tools, router, 2);

        let state = AgentState::new("hi", None, None);
        let answer = agent.run(state, None, "").await.unwrap();
        assert_eq!(answer, FIXED_APOLOGY);
    }
}
