//! Dense (vector) index: LanceDB-backed chunk storage (§4.3).

use std::path::Path;
use std::sync::Arc;

use arrow_array::RecordBatchIterator;
use futures::StreamExt;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};

use crate::arrow_codec::{chunk_schema, chunk_to_record, record_to_chunk};
use crate::error::{DbError, Result};
use crate::schema::{DenseEntry, DenseHit, TABLE_CHUNKS};

/// Handle onto the on-disk LanceDB database.
#[derive(Clone)]
pub struct DenseIndex {
    conn: Connection,
    dim: usize,
}

impl DenseIndex {
    /// Opens (creating if absent) the database directory at `path`.
    pub async fn open(path: impl AsRef<Path>, dim: usize) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        if !path.as_ref().exists() {
            std::fs::create_dir_all(path.as_ref())?;
        }
        let conn = lancedb::connect(&path_str).execute().await?;
        Ok(Self { conn, dim })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    async fn table_exists(&self, name: &str) -> Result<bool> {
        let tables = self.conn.table_names().execute().await?;
        Ok(tables.contains(&name.to_string()))
    }

    /// `CreateCollection(dim)` (§4.3): idempotent unless `force_recreate`,
    /// in which case any existing table (and all its data) is dropped first.
    pub async fn create_collection(&self, force_recreate: bool) -> Result<()> {
        if force_recreate && self.table_exists(TABLE_CHUNKS).await? {
            self.conn.drop_table(TABLE_CHUNKS).await?;
        }
        if !self.table_exists(TABLE_CHUNKS).await? {
            let schema = chunk_schema(self.dim);
            let empty_iter = RecordBatchIterator::new(vec![], schema);
            self.conn.create_table(TABLE_CHUNKS, empty_iter).execute().await?;
        }
        Ok(())
    }

    /// Builds the IVF/L2 ANN index over the embedding column. Safe to call
    /// repeatedly; LanceDB rebuilds in place.
    pub async fn create_vector_index(&self) -> Result<()> {
        let table = self.conn.open_table(TABLE_CHUNKS).execute().await?;
        table.create_index(&["embedding"], lancedb::index::Index::Auto).execute().await?;
        Ok(())
    }

    /// `InsertChunks` dense half (§4.3): bulk insert. Caller (the `DualIndex`
    /// facade) is responsible for not attempting the sparse half if this
    /// fails, preserving the no-orphan-entries invariant.
    pub async fn insert_batch(&self, entries: &[DenseEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        self.create_collection(false).await?;
        let table = self.conn.open_table(TABLE_CHUNKS).execute().await?;

        let records: Vec<_> = entries.iter().map(|e| chunk_to_record(e, self.dim)).collect::<Result<_>>()?;
        let schema = records[0].schema();
        let iter = RecordBatchIterator::new(records.into_iter().map(Ok), schema);
        table.add(iter).execute().await?;
        Ok(())
    }

    /// `DeleteByPaper` dense half (§4.3).
    pub async fn delete_by_paper(&self, paper_id: &str) -> Result<()> {
        if !self.table_exists(TABLE_CHUNKS).await? {
            return Ok(());
        }
        let table = self.conn.open_table(TABLE_CHUNKS).execute().await?;
        table.delete(&format!("paper_id = {}", quote_json_string(paper_id))).await?;
        Ok(())
    }

    pub async fn find_by_paper(&self, paper_id: &str) -> Result<Vec<DenseEntry>> {
        if !self.table_exists(TABLE_CHUNKS).await? {
            return Ok(Vec::new());
        }
        let table = self.conn.open_table(TABLE_CHUNKS).execute().await?;
        let mut stream =
            table.query().only_if(format!("paper_id = {}", quote_json_string(paper_id))).execute().await?;

        let mut out = Vec::new();
        while let Some(batch) = stream.next().await {
            let batch = batch?;
            for i in 0..batch.num_rows() {
                out.push(record_to_chunk(&batch, i)?);
            }
        }
        out.sort_by_key(|e| e.ordinal);
        Ok(out)
    }

    /// `DenseSearch(qv, k, filter?)` (§4.3). Loads the collection lazily —
    /// `NotFound` is not raised for a missing table, an empty result is.
    pub async fn search(&self, query_vector: &[f32], k: usize, filter: Option<&str>) -> Result<Vec<DenseHit>> {
        if query_vector.len() != self.dim {
            return Err(DbError::InvalidEmbeddingDimension { expected: self.dim, actual: query_vector.len() });
        }
        if !self.table_exists(TABLE_CHUNKS).await? {
            return Ok(Vec::new());
        }
        let table = self.conn.open_table(TABLE_CHUNKS).execute().await?;

        let mut query = table.vector_search(query_vector.to_vec())?.limit(k);
        if let Some(f) = filter {
            query = query.only_if(f);
        }
        let mut stream = query.execute().await?;

        let mut hits = Vec::new();
        while let Some(batch) = stream.next().await {
            let batch = batch?;
            let distance_col = batch.column_by_name("_distance").and_then(|c| {
                c.as_any().downcast_ref::<arrow_array::Float32Array>().map(|a| a.clone())
            });
            for i in 0..batch.num_rows() {
                let entry = record_to_chunk(&batch, i)?;
                let distance = distance_col.as_ref().map(|a| a.value(i)).unwrap_or(0.0);
                let relevance_score = 1.0 / (1.0 + distance);
                hits.push(DenseHit { entry, distance, relevance_score });
            }
        }
        Ok(hits)
    }
}

/// Quotes a string as a JSON literal for use inside a LanceDB filter
/// expression (§4.3 `DeleteByPaper`: "quotes identifiers as JSON").
pub fn quote_json_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{s}\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use quillmind_common::{Chunk, SectionType};

    async fn open_test_index() -> DenseIndex {
        let dir = tempfile::tempdir().unwrap();
        DenseIndex::open(dir.into_path(), 4).await.unwrap()
    }

    #[tokio::test]
    async fn create_collection_is_idempotent() {
        let idx = open_test_index().await;
        idx.create_collection(false).await.unwrap();
        idx.create_collection(false).await.unwrap();
    }

    #[tokio::test]
    async fn insert_and_find_by_paper_round_trips() {
        let idx = open_test_index().await;
        let chunk = Chunk::new("p1", 0, "hello world", SectionType::Abstract, "Abstract", "Abstract", true);
        let entry = DenseEntry::from_chunk(&chunk, Some(vec![0.1, 0.2, 0.3, 0.4]));
        idx.insert_batch(&[entry]).await.unwrap();

        let found = idx.find_by_paper("p1").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].chunk_id, "p1#0");
        assert_eq!(found[0].content, "hello world");
    }

    #[tokio::test]
    async fn delete_by_paper_removes_all_its_entries() {
        let idx = open_test_index().await;
        let chunk = Chunk::new("p1", 0, "a", SectionType::Other, "Other", "Other", true);
        idx.insert_batch(&[DenseEntry::from_chunk(&chunk, Some(vec![0.0; 4]))]).await.unwrap();
        idx.delete_by_paper("p1").await.unwrap();

        let found = idx.find_by_paper("p1").await.unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn search_rejects_mismatched_query_dimension() {
        let idx = open_test_index().await;
        let err = idx.search(&[0.0, 0.0], 5, None).await.unwrap_err();
        assert!(matches!(err, DbError::InvalidEmbeddingDimension { .. }));
    }
}
