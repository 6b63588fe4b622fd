//! Reciprocal Rank Fusion (§4.4 step 5).

use std::collections::HashMap;

use quillmind_db::{DenseHit, SparseHit};

pub const RRF_K: f64 = 60.0;

#[derive(Debug, Clone)]
pub struct FusedResult {
    pub chunk_id: String,
    pub score: f64,
    pub content: Option<String>,
    pub dense_rank: Option<usize>,
    pub sparse_rank: Option<usize>,
}

/// Fuses a dense ranking and a sparse ranking keyed by `chunk_id`.
/// `score += 1 / (k + rank + 1)` for each list a chunk appears in, `rank`
/// being the 0-based position. Ties broken by first-seen insertion order —
/// the iteration order below (dense first, then sparse) makes this
/// deterministic for equal scores.
pub fn reciprocal_rank_fusion(dense: &[DenseHit], sparse: &[SparseHit], k: f64) -> Vec<FusedResult> {
    let mut order: Vec<String> = Vec::new();
    let mut by_id: HashMap<String, FusedResult> = HashMap::new();

    for (rank, hit) in dense.iter().enumerate() {
        let entry = by_id.entry(hit.entry.chunk_id.clone()).or_insert_with(|| {
            order.push(hit.entry.chunk_id.clone());
            FusedResult {
                chunk_id: hit.entry.chunk_id.clone(),
                score: 0.0,
                content: Some(hit.entry.content.clone()),
                dense_rank: None,
                sparse_rank: None,
            }
        });
        entry.score += 1.0 / (k + rank as f64 + 1.0);
        entry.dense_rank = Some(rank);
        if entry.content.is_none() {
            entry.content = Some(hit.entry.content.clone());
        }
    }

    for (rank, hit) in sparse.iter().enumerate() {
        let entry = by_id.entry(hit.chunk_id.clone()).or_insert_with(|| {
            order.push(hit.chunk_id.clone());
            FusedResult { chunk_id: hit.chunk_id.clone(), score: 0.0, content: None, dense_rank: None, sparse_rank: None }
        });
        entry.score += 1.0 / (k + rank as f64 + 1.0);
        entry.sparse_rank = Some(rank);
    }

    let mut fused: Vec<FusedResult> = order.into_iter().map(|id| by_id.remove(&id).expect("id present")).collect();
    // stable sort preserves the insertion-order tie-break (§4.4 step 5).
    fused.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    fused
}

#[cfg(test)]
mod tests {
    use super::*;
    use quillmind_common::{Chunk, SectionType};
    use quillmind_db::DenseEntry;

    fn dense_hit(chunk_id: &str, distance: f32) -> DenseHit {
        let (paper_id, ordinal) = chunk_id.rsplit_once('#').unwrap();
        let chunk = Chunk::new(paper_id, ordinal.parse().unwrap(), "content", SectionType::Other, "t", "h", true);
        DenseHit { entry: DenseEntry::from_chunk(&chunk, None), distance, relevance_score: 1.0 / (1.0 + distance) }
    }

    fn sparse_hit(chunk_id: &str, score: f32) -> SparseHit {
        SparseHit { chunk_id: chunk_id.to_string(), score }
    }

    #[test]
    fn commutative_across_input_order() {
        let dense = vec![dense_hit("p1#0", 0.1), dense_hit("p1#1", 0.2)];
        let sparse = vec![sparse_hit("p1#1", 5.0), sparse_hit("p1#0", 4.0)];

        let fused = reciprocal_rank_fusion(&dense, &sparse, RRF_K);
        assert_eq!(fused.len(), 2);
        // p1#1 appears at dense rank 1 (score 1/62) and sparse rank 0 (1/61);
        // p1#0 appears at dense rank 0 (1/61) and sparse rank 1 (1/62).
        // Scores are equal by symmetry, so both documents fuse to the same
        // total regardless of which list order they were passed in.
        let total: f64 = fused.iter().map(|f| f.score).sum();
        assert!((total - (2.0 / 61.0 + 2.0 / 62.0)).abs() < 1e-9);
    }

    #[test]
    fn document_in_both_lists_outranks_single_list_hit() {
        let dense = vec![dense_hit("p1#0", 0.1), dense_hit("p1#1", 0.2)];
        let sparse = vec![sparse_hit("p1#0", 9.0)];

        let fused = reciprocal_rank_fusion(&dense, &sparse, RRF_K);
        assert_eq!(fused[0].chunk_id, "p1#0");
        assert!(fused[0].score > fused[1].score);
    }
}
