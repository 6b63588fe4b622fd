//! Agent/chat API (§6): the turn endpoint in both blocking and SSE-streamed
//! shapes, conversation management, the tool catalog, and circuit-breaker
//! introspection. Grounded in `ferrumyx_web::handlers::chat`, generalized
//! from a broadcast-per-server model to a per-request mpsc channel since
//! this agent loop answers one caller at a time rather than fanning a
//! shared event feed out to spectators.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use quillmind_common::{Message, Role};
use quillmind_memory::{ContextBuilder, WindowStrategy};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::auth::Claims;
use crate::error::ApiError;
use crate::sse::sse_from_events;
use crate::state::SharedState;

const MAX_CONTEXT_TOKENS: usize = 6000;
const RESERVE_TOKENS: usize = 1000;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub stream: bool,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub thread_id: String,
    pub answer: String,
}

/// Runs tier 1-3 of the memory stack (§4.5) for one turn: the prior history
/// from the write-behind cache, summarized/recalled/windowed into a
/// [`quillmind_memory::PreparedContext`].
async fn prepare_turn(
    state: &SharedState,
    thread_id: &str,
    user_id: &str,
    message: &str,
) -> Result<quillmind_memory::PreparedContext, ApiError> {
    let history = state.conversation_cache.load_history(thread_id).await?;
    let builder = ContextBuilder {
        window: &state.window,
        summaries: &state.summaries,
        index: &state.index,
        router: &state.router,
        reranker: state.reranker.as_deref(),
    };
    Ok(builder
        .prepare(&history, thread_id, user_id, message, WindowStrategy::Hybrid, MAX_CONTEXT_TOKENS, RESERVE_TOKENS)
        .await?)
}

/// Best-effort tier-3 write-back (§4.5.3): never blocks the turn's response
/// on it, and a failure here is only ever logged.
fn spawn_memory_extraction(state: SharedState, user_id: String, messages: Vec<Message>) {
    tokio::spawn(async move {
        let memories = quillmind_memory::extract_memories(&state.router, &messages).await;
        if let Err(reason) = quillmind_memory::store_memories(&state.index, &state.router, &user_id, &memories).await {
            tracing::warn!(%reason, user_id, "failed to persist extracted semantic memories");
        }
    });
}

/// `POST /agent/chat`: one research-assistant turn, blocking or SSE-streamed
/// depending on `stream` (§6).
pub async fn chat(
    State(state): State<SharedState>,
    axum::extract::Extension(claims): axum::extract::Extension<Claims>,
    Json(req): Json<ChatRequest>,
) -> Result<axum::response::Response, ApiError> {
    if req.message.trim().is_empty() {
        return Err(ApiError::Validation("message must not be empty".to_string()));
    }

    let thread_id = req.conversation_id.unwrap_or_else(|| Uuid::new_v4().to_string());
    state.threads.ensure(&thread_id, &claims.user_id);
    if state.threads.is_owned_by(&thread_id, &claims.user_id) == Some(false) {
        return Err(ApiError::Forbidden("you do not own this conversation".to_string()));
    }

    let prepared = prepare_turn(&state, &thread_id, &claims.user_id, &req.message).await?;

    let mut agent_state = quillmind_agent::AgentState::new(req.message.clone(), Some(claims.user_id.clone()), Some(thread_id.clone()));
    agent_state.messages = prepared.messages;

    state.conversation_cache.append_message(&thread_id, Message::new(Role::User, req.message.clone())).await?;

    if req.stream {
        let (tx, rx) = mpsc::unbounded_channel();
        let bg_state = state.clone();
        let bg_thread_id = thread_id.clone();
        let bg_user_id = claims.user_id.clone();
        tokio::spawn(async move {
            let conversation_summary = prepared.conversation_summary.clone();
            let mut turn_messages = agent_state.messages.clone();
            turn_messages.push(Message::new(Role::User, agent_state.user_input.clone()));

            match bg_state.agent.run_stream(agent_state, &bg_thread_id, conversation_summary.as_deref(), &prepared.user_context, tx).await {
                Ok(final_state) => {
                    if let Some(answer) = &final_state.final_answer {
                        if let Err(reason) = bg_state.conversation_cache.append_message(&bg_thread_id, Message::new(Role::Assistant, answer.clone())).await {
                            tracing::warn!(%reason, thread_id = %bg_thread_id, "failed to persist streamed assistant reply");
                        }
                        turn_messages.push(Message::new(Role::Assistant, answer.clone()));
                    }
                    spawn_memory_extraction(bg_state, bg_user_id, turn_messages);
                }
                Err(reason) => {
                    tracing::warn!(%reason, thread_id = %bg_thread_id, "streamed agent turn failed");
                }
            }
        });
        return Ok(sse_from_events(rx).into_response());
    }

    let answer = state.agent.run(agent_state.clone(), prepared.conversation_summary.as_deref(), &prepared.user_context).await?;

    state.conversation_cache.append_message(&thread_id, Message::new(Role::Assistant, answer.clone())).await?;

    let mut turn_messages = agent_state.messages;
    turn_messages.push(Message::new(Role::User, req.message));
    turn_messages.push(Message::new(Role::Assistant, answer.clone()));
    spawn_memory_extraction(state.clone(), claims.user_id.clone(), turn_messages);

    Ok(Json(ChatResponse { thread_id, answer }).into_response())
}

/// `GET /agent/conversations`: every conversation owned by the caller.
pub async fn list_conversations(
    State(state): State<SharedState>,
    axum::extract::Extension(claims): axum::extract::Extension<Claims>,
) -> Json<Vec<crate::threads::ThreadSummary>> {
    Json(state.threads.list_for_owner(&claims.user_id))
}

/// `GET /agent/conversations/{id}`: the full message history of one
/// conversation the caller owns.
pub async fn get_conversation(
    State(state): State<SharedState>,
    axum::extract::Extension(claims): axum::extract::Extension<Claims>,
    Path(thread_id): Path<String>,
) -> Result<Json<Vec<Message>>, ApiError> {
    match state.threads.is_owned_by(&thread_id, &claims.user_id) {
        None => Err(ApiError::NotFound(format!("no such conversation: {thread_id}"))),
        Some(false) => Err(ApiError::Forbidden("you do not own this conversation".to_string())),
        Some(true) => Ok(Json(state.conversation_cache.load_history(&thread_id).await?)),
    }
}

/// `DELETE /agent/conversations/{id}`: cascades across every tier that holds
/// a copy of this thread's state (§4.5).
pub async fn delete_conversation(
    State(state): State<SharedState>,
    axum::extract::Extension(claims): axum::extract::Extension<Claims>,
    Path(thread_id): Path<String>,
) -> Result<axum::http::StatusCode, ApiError> {
    match state.threads.is_owned_by(&thread_id, &claims.user_id) {
        None => return Err(ApiError::NotFound(format!("no such conversation: {thread_id}"))),
        Some(false) => return Err(ApiError::Forbidden("you do not own this conversation".to_string())),
        Some(true) => {}
    }

    state.conversation_cache.invalidate(&thread_id).await?;
    state.summaries.invalidate(&thread_id).await?;
    state.threads.delete(&thread_id);
    Ok(axum::http::StatusCode::NO_CONTENT)
}

/// `GET /agent/tools`: the LLM-facing function manifest, exposed so a client
/// can render what the agent is capable of calling.
pub async fn list_tools(State(state): State<SharedState>) -> Json<Value> {
    Json(state.tools.manifest())
}

/// `POST /agent/tools/{name}/execute`: runs one tool directly, through the
/// same breaker-gated dispatch the agent loop itself uses.
pub async fn execute_tool(State(state): State<SharedState>, Path(name): Path<String>, Json(params): Json<Value>) -> Json<quillmind_agent::ToolOutcome> {
    Json(state.tools.invoke(&name, params).await)
}

/// `GET /agent/circuit-breakers`: current state of every tool's breaker.
pub async fn circuit_breakers(State(state): State<SharedState>) -> Json<Vec<quillmind_common::CircuitStats>> {
    Json(state.tools.breakers().all_stats().await)
}

#[derive(Debug, Serialize)]
pub struct ResetResult {
    pub tool: String,
    pub reset: bool,
}

/// `POST /agent/circuit-breakers/{name}/reset`: privileged manual override,
/// forcing a breaker back to closed (§6 "privileged").
pub async fn reset_circuit_breaker(State(state): State<SharedState>, Path(name): Path<String>) -> Json<ResetResult> {
    let reset = state.tools.breakers().reset(&name).await;
    Json(ResetResult { tool: name, reset })
}
