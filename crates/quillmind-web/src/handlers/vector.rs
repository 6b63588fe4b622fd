//! Vector/ingestion API (§7): indexing, pure-dense search, the full hybrid
//! pipeline, streaming grounded Q&A, and cascade delete. Grounded in
//! `ferrumyx_web::handlers::ingestion`, generalized from a job-queue shape to
//! synchronous per-request ingestion since this pipeline runs in-process
//! rather than dispatching to a worker.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use quillmind_common::{is_memory_namespace, SectionNode};
use quillmind_db::{quote_json_string, DenseHit};
use quillmind_ingestion::{ChunkerConfig, IngestRequest, IngestSource};
use quillmind_llm::{LlmRequest, LlmRole, Message as LlmMessage};
use quillmind_retrieval::{hybrid_search, SearchRequest};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use uuid::Uuid;

use crate::auth::Claims;
use crate::error::ApiError;
use crate::state::SharedState;

const GROUNDED_SYSTEM_PROMPT: &str =
    "Answer the user's question using only the excerpts provided below. If the excerpts do not contain \
     the answer, say so plainly rather than guessing.";

#[derive(Debug, Deserialize)]
pub struct IndexRequest {
    #[serde(default)]
    pub paper_id: Option<String>,
    pub title: String,
    pub filename: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub structured_chunks: Option<Vec<SectionNode>>,
    #[serde(default)]
    pub max_chunk_size: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct IndexResponse {
    pub paper_id: String,
    pub chunks_created: usize,
    pub section_types: std::collections::HashMap<String, usize>,
}

/// `POST /vector/index`: parses structure, chunks, embeds, and writes into
/// the dual index (§4.1/§4.2/§4.3), then records ownership in the
/// in-process paper registry.
pub async fn index_paper(
    State(state): State<SharedState>,
    axum::extract::Extension(claims): axum::extract::Extension<Claims>,
    Json(req): Json<IndexRequest>,
) -> Result<Json<IndexResponse>, ApiError> {
    let source = match (req.content, req.structured_chunks) {
        (Some(content), _) if !content.trim().is_empty() => IngestSource::Content(content),
        (_, Some(sections)) if !sections.is_empty() => IngestSource::StructuredChunks(sections),
        _ => return Err(ApiError::Validation("either content or structured_chunks must be provided".to_string())),
    };

    let paper_id = req.paper_id.unwrap_or_else(|| Uuid::new_v4().to_string());

    let mut chunker_config = ChunkerConfig::default();
    if let Some(max_chunk_size) = req.max_chunk_size {
        chunker_config.max_chunk_size = max_chunk_size;
    }

    let outcome =
        quillmind_ingestion::run_ingest(&state.router, IngestRequest { paper_id: paper_id.clone(), source, chunker_config }, None).await;

    if !outcome.chunks.is_empty() {
        let contents: Vec<String> = outcome.chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = state.router.embed(&contents).await?;
        state.index.insert_chunks(&outcome.chunks, &embeddings).await?;
    }

    state.papers.record(paper_id.clone(), claims.user_id.clone(), req.title, req.filename);

    Ok(Json(IndexResponse { paper_id, chunks_created: outcome.chunks_created, section_types: outcome.section_types }))
}

#[derive(Debug, Deserialize)]
pub struct SearchRequestBody {
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub paper_id: Option<String>,
}

fn default_top_k() -> usize {
    5
}

#[derive(Debug, Serialize)]
pub struct DenseSearchHit {
    pub chunk_id: String,
    pub content: String,
    pub distance: f32,
    pub relevance_score: f32,
}

impl From<DenseHit> for DenseSearchHit {
    fn from(hit: DenseHit) -> Self {
        Self { chunk_id: hit.entry.chunk_id, content: hit.entry.content, distance: hit.distance, relevance_score: hit.relevance_score }
    }
}

/// `POST /vector/search`: pure dense search, bypassing fusion and rerank —
/// useful for debugging the dense side of the dual index in isolation.
pub async fn search(State(state): State<SharedState>, Json(req): Json<SearchRequestBody>) -> Result<Json<Vec<DenseSearchHit>>, ApiError> {
    let vectors = state.router.embed(std::slice::from_ref(&req.query)).await?;
    let qv = vectors.into_iter().next().unwrap_or_default();
    let filter = req.paper_id.as_deref().map(|p| format!("paper_id = {}", quote_json_string(p)));
    let hits = state.index.dense_search(&qv, req.top_k, filter.as_deref()).await?;
    // §3: semantic-memory entries under the reserved `memory:<user-id>`
    // namespace never surface in user-facing paper search; an explicit
    // scope already can't land there, so only guard the unscoped path.
    let hits: Vec<DenseHit> = if req.paper_id.is_none() {
        hits.into_iter().filter(|h| !is_memory_namespace(&h.entry.paper_id)).collect()
    } else {
        hits
    };
    Ok(Json(hits.into_iter().map(DenseSearchHit::from).collect()))
}

#[derive(Debug, Deserialize)]
pub struct HybridSearchRequestBody {
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub paper_id: Option<String>,
    #[serde(default)]
    pub translate_query: bool,
}

/// `POST /vector/hybrid-search`: the full §4.4 pipeline.
pub async fn hybrid_search_endpoint(
    State(state): State<SharedState>,
    Json(req): Json<HybridSearchRequestBody>,
) -> Result<Json<quillmind_retrieval::SearchResponse>, ApiError> {
    let mut search_req = SearchRequest::new(req.query, req.top_k);
    search_req.translate_query = req.translate_query;
    if let Some(paper_id) = req.paper_id {
        search_req = search_req.scoped_to(paper_id);
    }
    let reranker = state.reranker.as_deref();
    let response = hybrid_search(&state.index, &state.router, reranker, search_req).await?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct QaStreamRequest {
    pub paper_id: String,
    pub question: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

/// `POST /vector/qa-stream`: hybrid-retrieves excerpts for one paper, emits
/// them as a `references` event, then streams the grounded answer
/// token-by-token (§4.4 into §6 "SSE framing").
pub async fn qa_stream(
    State(state): State<SharedState>,
    Json(req): Json<QaStreamRequest>,
) -> Result<Sse<impl futures_core::Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let mut search_req = SearchRequest::new(req.question.clone(), req.top_k).scoped_to(req.paper_id);
    search_req.use_reranker = true;
    let reranker = state.reranker.as_deref();
    let response = hybrid_search(&state.index, &state.router, reranker, search_req).await?;

    let excerpts = response
        .final_results
        .iter()
        .enumerate()
        .map(|(i, r)| format!("[{i}] {}", r.content))
        .collect::<Vec<_>>()
        .join("\n\n");
    let references = response.final_results.clone();

    let messages = vec![
        LlmMessage::system(GROUNDED_SYSTEM_PROMPT),
        LlmMessage::user(format!("Excerpts:\n{excerpts}\n\nQuestion: {}", req.question)),
    ];

    let (tx, rx) = mpsc::channel::<Event>(32);

    let references_json = serde_json::to_string(&references).unwrap_or_default();
    let _ = tx.send(Event::default().event("references").data(references_json)).await;

    let router = state.router.clone();
    tokio::spawn(async move {
        match router.complete_stream(LlmRole::Main, LlmRequest::new(messages)).await {
            Ok(mut deltas) => {
                while let Some(delta) = deltas.recv().await {
                    if !delta.text.is_empty() {
                        let payload = serde_json::json!({"text": delta.text}).to_string();
                        if tx.send(Event::default().event("token").data(payload)).await.is_err() {
                            return;
                        }
                    }
                    if delta.done {
                        break;
                    }
                }
                let _ = tx.send(Event::default().event("done").data("{}")).await;
            }
            Err(reason) => {
                let payload = serde_json::json!({"message": reason.to_string()}).to_string();
                let _ = tx.send(Event::default().event("error").data(payload)).await;
                let _ = tx.send(Event::default().event("done").data("{}")).await;
            }
        }
    });

    let stream = tokio_stream::wrappers::ReceiverStream::new(rx).map(Ok::<Event, Infallible>);
    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("ping")))
}

/// `DELETE /vector/delete/{paper_id}`: cascades the delete across both
/// indexes (§4.3 `DeleteByPaper`) and forgets the ownership record.
pub async fn delete_paper(
    State(state): State<SharedState>,
    axum::extract::Extension(claims): axum::extract::Extension<Claims>,
    Path(paper_id): Path<String>,
) -> Result<axum::http::StatusCode, ApiError> {
    match state.papers.is_owned_by(&paper_id, &claims.user_id) {
        None => return Err(ApiError::NotFound(format!("no such paper: {paper_id}"))),
        Some(false) => return Err(ApiError::Forbidden("you do not own this paper".to_string())),
        Some(true) => {}
    }

    state.index.delete_by_paper(&paper_id).await?;
    state.papers.forget(&paper_id);
    Ok(axum::http::StatusCode::NO_CONTENT)
}
