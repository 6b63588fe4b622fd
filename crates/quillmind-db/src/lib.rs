//! quillmind-db — the dual index (C): a dense (LanceDB) vector index paired
//! with a sparse (tantivy BM25) lexical index, both keyed by `chunk_id`.
//!
//! [`DualIndex`] is the facade that keeps the two in lockstep per the §4.3
//! presence-equivalence invariant: a `chunk_id` exists in both indexes or
//! neither.

pub mod arrow_codec;
pub mod dense;
pub mod error;
pub mod schema;
pub mod sparse;
pub mod tokenizer;

pub use dense::{quote_json_string, DenseIndex};
pub use error::{DbError, Result};
pub use schema::{DenseEntry, DenseHit, SparseHit, EMBEDDING_DIM, TABLE_CHUNKS};
pub use sparse::SparseIndex;

use std::path::Path;

use quillmind_common::Chunk;

/// Couples [`DenseIndex`] and [`SparseIndex`] behind the five §4.3
/// operations, enforcing the no-orphan-entries rule on insert and delete.
pub struct DualIndex {
    dense: DenseIndex,
    sparse: SparseIndex,
}

impl DualIndex {
    pub async fn open(dense_path: impl AsRef<Path>, sparse_path: impl AsRef<Path>, dim: usize) -> Result<Self> {
        let dense = DenseIndex::open(dense_path, dim).await?;
        let sparse = SparseIndex::open(sparse_path)?;
        Ok(Self { dense, sparse })
    }

    /// `CreateCollection(dim)` (§4.3). `force_recreate` drops all data in
    /// both indexes, preserving the dense/sparse presence-equivalence
    /// invariant across the reset.
    pub async fn create_collection(&self, force_recreate: bool) -> Result<()> {
        self.dense.create_collection(force_recreate).await?;
        if force_recreate {
            self.sparse.clear().await?;
        }
        Ok(())
    }

    /// `InsertChunks(paper_id, [Chunk], [embedding])` (§4.3). On dense-insert
    /// failure the sparse insert is never attempted, preserving the
    /// presence-equivalence invariant.
    pub async fn insert_chunks(&self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<()> {
        if chunks.len() != embeddings.len() {
            return Err(DbError::LengthMismatch { chunks: chunks.len(), embeddings: embeddings.len() });
        }
        if chunks.is_empty() {
            return Ok(());
        }

        let entries: Vec<DenseEntry> =
            chunks.iter().zip(embeddings.iter()).map(|(c, e)| DenseEntry::from_chunk(c, Some(e.clone()))).collect();

        self.dense.insert_batch(&entries).await?;
        self.sparse.add_chunks(&entries).await?;
        Ok(())
    }

    /// `DeleteByPaper(paper_id)` (§4.3): removes dense rows, then sparse
    /// rows. Idempotent — returns `Ok(())` whether or not the paper had any
    /// entries.
    pub async fn delete_by_paper(&self, paper_id: &str) -> Result<()> {
        self.dense.delete_by_paper(paper_id).await?;
        self.sparse.delete_by_paper(paper_id).await?;
        Ok(())
    }

    /// `DenseSearch(qv, k, filter?)` (§4.3).
    pub async fn dense_search(&self, query_vector: &[f32], k: usize, filter: Option<&str>) -> Result<Vec<DenseHit>> {
        self.dense.search(query_vector, k, filter).await
    }

    /// `SparseSearch(q, k, paper_id?)` (§4.3).
    pub async fn sparse_search(&self, query: &str, k: usize, paper_id: Option<&str>) -> Result<Vec<SparseHit>> {
        self.sparse.search(query, k, paper_id).await
    }

    pub async fn chunks_for_paper(&self, paper_id: &str) -> Result<Vec<Chunk>> {
        let entries = self.dense.find_by_paper(paper_id).await?;
        Ok(entries.into_iter().map(DenseEntry::into_chunk).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quillmind_common::{Chunk, SectionType};

    async fn open_test_dual() -> DualIndex {
        let dense_dir = tempfile::tempdir().unwrap().into_path();
        let sparse_dir = tempfile::tempdir().unwrap().into_path();
        DualIndex::open(dense_dir, sparse_dir, 4).await.unwrap()
    }

    #[tokio::test]
    async fn insert_rejects_length_mismatch() {
        let idx = open_test_dual().await;
        let chunk = Chunk::new("p1", 0, "x", SectionType::Other, "Other", "Other", true);
        let err = idx.insert_chunks(&[chunk], &[]).await.unwrap_err();
        assert!(matches!(err, DbError::LengthMismatch { .. }));
    }

    #[tokio::test]
    async fn insert_then_dense_and_sparse_both_find_chunk() {
        let idx = open_test_dual().await;
        let chunk = Chunk::new("p1", 0, "hybrid retrieval works well", SectionType::Other, "Other", "Other", true);
        idx.insert_chunks(&[chunk], &[vec![1.0, 0.0, 0.0, 0.0]]).await.unwrap();

        let dense_hits = idx.dense_search(&[1.0, 0.0, 0.0, 0.0], 5, None).await.unwrap();
        assert_eq!(dense_hits.len(), 1);

        let sparse_hits = idx.sparse_search("hybrid", 5, None).await.unwrap();
        assert_eq!(sparse_hits.len(), 1);
        assert_eq!(sparse_hits[0].chunk_id, dense_hits[0].entry.chunk_id);
    }

    #[tokio::test]
    async fn delete_by_paper_clears_both_indexes() {
        let idx = open_test_dual().await;
        let chunk = Chunk::new("p1", 0, "removable text", SectionType::Other, "Other", "Other", true);
        idx.insert_chunks(&[chunk], &[vec![0.5, 0.5, 0.0, 0.0]]).await.unwrap();

        idx.delete_by_paper("p1").await.unwrap();

        assert!(idx.chunks_for_paper("p1").await.unwrap().is_empty());
        assert!(idx.sparse_search("removable", 5, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn force_recreate_wipes_sparse_as_well_as_dense() {
        let idx = open_test_dual().await;
        let chunk = Chunk::new("p1", 0, "stale leftover content", SectionType::Other, "Other", "Other", true);
        idx.insert_chunks(&[chunk], &[vec![0.1, 0.2, 0.3, 0.4]]).await.unwrap();

        idx.create_collection(true).await.unwrap();

        assert!(idx.dense_search(&[0.1, 0.2, 0.3, 0.4], 5, None).await.unwrap().is_empty());
        assert!(idx.sparse_search("stale", 5, None).await.unwrap().is_empty());
    }
}
