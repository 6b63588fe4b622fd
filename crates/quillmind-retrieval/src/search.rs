//! Hybrid retriever (D): translate → dense-search → sparse-search → RRF
//! fuse → rerank → top-K (§4.4).

use std::sync::Arc;
use std::time::Instant;

use quillmind_common::{is_memory_namespace, parse_chunk_id};
use quillmind_db::{quote_json_string, DualIndex};
use quillmind_llm::LlmRouter;
use serde::Serialize;
use thiserror::Error;

use crate::language::{detect_language, translate_query, Language};
use crate::reranker::{apply_rerank_scores, Reranker};
use crate::rrf::{reciprocal_rank_fusion, FusedResult, RRF_K};

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error(transparent)]
    Db(#[from] quillmind_db::DbError),
    #[error(transparent)]
    Llm(#[from] quillmind_llm::LlmError),
}

pub type Result<T> = std::result::Result<T, RetrievalError>;

/// Default breadth of the pre-fusion candidate lists (§4.4 step 3/4).
pub const DEFAULT_INITIAL_K: usize = 20;

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub top_k: usize,
    pub paper_id: Option<String>,
    pub use_reranker: bool,
    pub translate_query: bool,
    pub initial_k: usize,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, top_k: usize) -> Self {
        Self {
            query: query.into(),
            top_k,
            paper_id: None,
            use_reranker: true,
            translate_query: false,
            initial_k: DEFAULT_INITIAL_K,
        }
    }

    pub fn scoped_to(mut self, paper_id: impl Into<String>) -> Self {
        self.paper_id = Some(paper_id.into());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResultItem {
    pub chunk_id: String,
    pub content: String,
    pub score: f64,
    pub dense_rank: Option<usize>,
    pub sparse_rank: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchStats {
    pub dense_hits: usize,
    pub sparse_hits: usize,
    pub fused_candidates: usize,
    pub reranked: bool,
    pub language: &'static str,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub final_results: Vec<SearchResultItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translated_query: Option<String>,
    pub stats: SearchStats,
}

fn language_label(lang: Language) -> &'static str {
    match lang {
        Language::Zh => "zh",
        Language::En => "en",
        Language::Mixed => "mixed",
    }
}

/// Runs the full §4.4 pipeline. `index` is the dual index to search,
/// `router` supplies translation, embedding, and (if `reranker` is `None`)
/// no reranking at all.
pub async fn hybrid_search(
    index: &DualIndex,
    router: &LlmRouter,
    reranker: Option<&(dyn Reranker)>,
    req: SearchRequest,
) -> Result<SearchResponse> {
    let started = Instant::now();

    // §4.4 step 1-2: language detect + optional translation.
    let language = detect_language(&req.query);
    let (search_query, translated_query) =
        if req.translate_query && matches!(language, Language::Zh | Language::Mixed) {
            let translated = translate_query(router, &req.query).await;
            let changed = translated != req.query;
            (translated.clone(), if changed { Some(translated) } else { None })
        } else {
            (req.query.clone(), None)
        };

    // §4.4 steps 3-4 run concurrently and join before fusion (§5).
    let filter = req.paper_id.as_deref().map(|p| format!("paper_id = {}", quote_json_string(p)));
    let dense_search = async {
        let vectors = router.embed(std::slice::from_ref(&search_query)).await?;
        let qv = vectors.into_iter().next().unwrap_or_default();
        index.dense_search(&qv, req.initial_k, filter.as_deref()).await.map_err(RetrievalError::from)
    };
    let sparse_search = async {
        index
            .sparse_search(&search_query, req.initial_k, req.paper_id.as_deref())
            .await
            .map_err(RetrievalError::from)
    };
    let (mut dense_hits, mut sparse_hits) = tokio::try_join!(dense_search, sparse_search)?;

    // §3: semantic-memory entries live in the dense index under
    // `memory:<user-id>` and must never surface in unscoped paper search.
    // An explicit `paper_id` scope already can't land on that namespace
    // (a caller would have to pass the reserved prefix itself), but an
    // unscoped search has no such guard, so filter both candidate lists.
    if req.paper_id.is_none() {
        dense_hits.retain(|h| !is_memory_namespace(&h.entry.paper_id));
        sparse_hits.retain(|h| parse_chunk_id(&h.chunk_id).map(|(p, _)| !is_memory_namespace(&p)).unwrap_or(true));
    }

    // §4.4 step 5: RRF fusion.
    let mut fused: Vec<FusedResult> = reciprocal_rank_fusion(&dense_hits, &sparse_hits, RRF_K);
    let fused_candidates = fused.len();

    // §4.4 step 6: optional rerank, falling back to fused order+score.
    let mut reranked = false;
    if req.use_reranker {
        if let Some(reranker) = reranker {
            match reranker.rerank(&search_query, &fused).await {
                Ok(scores) if !scores.is_empty() => {
                    fused = apply_rerank_scores(fused, &scores);
                    reranked = true;
                }
                Ok(_) => {}
                Err(reason) => {
                    tracing::warn!(%reason, "reranker unavailable, preserving fused order");
                }
            }
        }
    }

    // §4.4 step 7: truncate to top_k.
    fused.truncate(req.top_k);

    let final_results = fused
        .into_iter()
        .map(|f| SearchResultItem {
            chunk_id: f.chunk_id,
            content: f.content.unwrap_or_default(),
            score: f.score,
            dense_rank: f.dense_rank,
            sparse_rank: f.sparse_rank,
        })
        .collect();

    Ok(SearchResponse {
        final_results,
        translated_query,
        stats: SearchStats {
            dense_hits: dense_hits.len(),
            sparse_hits: sparse_hits.len(),
            fused_candidates,
            reranked,
            language: language_label(language),
            duration_ms: started.elapsed().as_millis() as u64,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use quillmind_common::{Chunk, SectionType};
    use quillmind_llm::{LlmBackend, LlmRequest, LlmResponse, RoutingPolicy};
    use async_trait::async_trait;

    struct StubLlm;

    #[async_trait]
    impl LlmBackend for StubLlm {
        async fn complete(&self, _req: LlmRequest) -> quillmind_llm::Result<LlmResponse> {
            Ok(LlmResponse { content: "attention mechanism".into(), model: "stub".into(), prompt_tokens: 1, completion_tokens: 1 })
        }
        async fn embed(&self, texts: &[String]) -> quillmind_llm::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0, 0.0, 0.0]).collect())
        }
        fn model_id(&self) -> &str { "stub" }
        fn is_local(&self) -> bool { true }
        fn max_context_tokens(&self) -> u32 { 4096 }
        fn max_output_tokens(&self) -> u32 { 1024 }
    }

    async fn setup() -> (DualIndex, LlmRouter) {
        let dense_dir = tempfile::tempdir().unwrap().into_path();
        let sparse_dir = tempfile::tempdir().unwrap().into_path();
        let index = DualIndex::open(dense_dir, sparse_dir, 4).await.unwrap();
        let chunk = Chunk::new("p1", 0, "the transformer attention mechanism explained", SectionType::Methods, "Methods", "Methods", true);
        index.insert_chunks(&[chunk], &[vec![1.0, 0.0, 0.0, 0.0]]).await.unwrap();

        let mut router = LlmRouter::new(RoutingPolicy::default());
        router.register_backend("local", Arc::new(StubLlm));
        (index, router)
    }

    #[tokio::test]
    async fn hybrid_search_returns_results_without_reranker() {
        let (index, router) = setup().await;
        let resp = hybrid_search(&index, &router, None, SearchRequest::new("attention mechanism", 5)).await.unwrap();
        assert!(!resp.final_results.is_empty());
        assert!(resp.translated_query.is_none());
    }

    #[tokio::test]
    async fn translate_query_populates_translated_field() {
        let (index, router) = setup().await;
        let req = SearchRequest { translate_query: true, ..SearchRequest::new("注意力机制", 5) };
        let resp = hybrid_search(&index, &router, None, req).await.unwrap();
        assert_eq!(resp.translated_query.as_deref(), Some("attention mechanism"));
        assert!(!resp.final_results.is_empty());
    }

    #[tokio::test]
    async fn unscoped_search_excludes_memory_namespace_chunks() {
        let (index, router) = setup().await;
        let memory_paper = quillmind_common::memory_namespace("user-1");
        let memory_chunk =
            Chunk::new(&memory_paper, 0, "the transformer attention mechanism explained", SectionType::Other, "Other", "Other", true);
        index.insert_chunks(&[memory_chunk], &[vec![1.0, 0.0, 0.0, 0.0]]).await.unwrap();

        let resp = hybrid_search(&index, &router, None, SearchRequest::new("attention mechanism", 5)).await.unwrap();
        assert!(resp.final_results.iter().all(|r| !r.chunk_id.starts_with(&memory_paper)));
    }

    #[tokio::test]
    async fn scoped_search_respects_paper_filter() {
        let (index, router) = setup().await;
        let req = SearchRequest::new("attention", 5).scoped_to("p1");
        let resp = hybrid_search(&index, &router, None, req).await.unwrap();
        assert!(!resp.final_results.is_empty());
    }
}
