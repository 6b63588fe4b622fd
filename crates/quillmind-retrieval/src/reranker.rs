//! Reranking (§4.4 step 6). A `(query, candidate)` cross-encoder is the
//! canonical technology for this step; this design swaps the
//! in-process ML model for a call through the already-present
//! [`quillmind_llm::LlmRouter`] (light role), scoring the whole candidate
//! list in one JSON-mode completion rather than loading a dedicated
//! cross-encoder runtime solely for this one concern — see DESIGN.md. The
//! "reranker unavailable" fallback path (§4.4 step 6) is unchanged either
//! way: on any failure the fused order and scores are kept as-is.

use std::collections::HashMap;

use async_trait::async_trait;
use quillmind_llm::{LlmRequest, LlmRole, LlmRouter, Message};
use serde::Deserialize;

use crate::rrf::FusedResult;

#[async_trait]
pub trait Reranker: Send + Sync {
    /// Scores `(query, candidate.content)` pairs, returning `chunk_id ->
    /// score`. Implementations that cannot score every candidate may return
    /// a partial map — callers keep the fusion score for any chunk_id
    /// missing from the result (§4.4 step 6: "copy the best available
    /// upstream score into rerank_score").
    async fn rerank(&self, query: &str, candidates: &[FusedResult]) -> anyhow::Result<HashMap<String, f32>>;
}

const RERANK_SYSTEM_PROMPT: &str = r#"You are a relevance scorer. Given a search query and a numbered list of candidate passages, score how relevant each passage is to the query on a 0.0-1.0 scale. Reply with ONLY a JSON object mapping each passage's id to its score, e.g. {"0": 0.9, "1": 0.2}. Do not include any other text."#;

/// Scores the full candidate set in a single completion. Constructed once
/// behind an `Arc` by the caller and shared read-only across requests (§5:
/// "reranker model: thread-safe inference; lazy-loaded once").
pub struct LlmReranker {
    router: std::sync::Arc<LlmRouter>,
}

impl LlmReranker {
    pub fn new(router: std::sync::Arc<LlmRouter>) -> Self {
        Self { router }
    }
}

#[derive(Deserialize)]
struct RerankScores(HashMap<String, f32>);

#[async_trait]
impl Reranker for LlmReranker {
    async fn rerank(&self, query: &str, candidates: &[FusedResult]) -> anyhow::Result<HashMap<String, f32>> {
        if candidates.is_empty() {
            return Ok(HashMap::new());
        }

        let listing = candidates
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{i}: {}", c.content.as_deref().unwrap_or("")))
            .collect::<Vec<_>>()
            .join("\n");

        let mut req = LlmRequest::new(vec![
            Message::system(RERANK_SYSTEM_PROMPT),
            Message::user(format!("Query: {query}\n\nCandidates:\n{listing}")),
        ]);
        req.json_mode = true;

        let resp = self.router.complete(LlmRole::Light, req).await?;
        let scores: RerankScores = serde_json::from_str(&resp.content)?;

        let mut by_chunk_id = HashMap::with_capacity(scores.0.len());
        for (idx_str, score) in scores.0 {
            if let Ok(idx) = idx_str.parse::<usize>() {
                if let Some(candidate) = candidates.get(idx) {
                    by_chunk_id.insert(candidate.chunk_id.clone(), score);
                }
            }
        }
        Ok(by_chunk_id)
    }
}

/// Applies reranker scores onto fused results, preserving the fused order
/// and score for any candidate the reranker couldn't score (§4.4 step 6).
pub fn apply_rerank_scores(mut fused: Vec<FusedResult>, scores: &HashMap<String, f32>) -> Vec<FusedResult> {
    if scores.is_empty() {
        return fused;
    }
    for result in fused.iter_mut() {
        if let Some(&score) = scores.get(&result.chunk_id) {
            result.score = score as f64;
        }
    }
    fused.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fused(id: &str, score: f64) -> FusedResult {
        FusedResult { chunk_id: id.to_string(), score, content: Some("x".to_string()), dense_rank: None, sparse_rank: None }
    }

    #[test]
    fn empty_scores_preserve_fused_order() {
        let input = vec![fused("a", 0.9), fused("b", 0.1)];
        let out = apply_rerank_scores(input.clone(), &HashMap::new());
        assert_eq!(out[0].chunk_id, "a");
        assert_eq!(out[1].chunk_id, "b");
    }

    #[test]
    fn partial_scores_reorder_only_scored_entries() {
        let input = vec![fused("a", 0.1), fused("b", 0.2)];
        let mut scores = HashMap::new();
        scores.insert("a".to_string(), 0.99);
        let out = apply_rerank_scores(input, &scores);
        assert_eq!(out[0].chunk_id, "a");
    }
}
