//! Sparse (BM25/lexical) index, tantivy-backed (§4.3). The writer is
//! guarded by a `tokio::sync::RwLock` since tantivy's `IndexWriter` is not
//! `Sync`-safe for concurrent mutation — readers (`search`) take the read
//! lock, mutations (`add_chunks`/`delete_by_paper`) take the write lock.

use std::path::Path;

use tantivy::collector::TopDocs;
use tantivy::directory::MmapDirectory;
use tantivy::query::QueryParser;
use tantivy::schema::{IndexRecordOption, Schema, TextFieldIndexing, TextOptions, STORED, STRING};
use tantivy::{doc, Index, IndexWriter, ReloadPolicy, TantivyDocument};
use tokio::sync::RwLock;

use crate::error::Result;
use crate::schema::{DenseEntry, SparseHit};
use crate::tokenizer::{content_analyzer, widen_cjk_runs, CONTENT_TOKENIZER};

const WRITER_HEAP_BYTES: usize = 50_000_000;

pub struct SparseIndex {
    index: Index,
    writer: RwLock<IndexWriter>,
    chunk_id_field: tantivy::schema::Field,
    paper_id_field: tantivy::schema::Field,
    content_field: tantivy::schema::Field,
}

impl SparseIndex {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        std::fs::create_dir_all(path.as_ref())?;

        let mut schema_builder = Schema::builder();
        let chunk_id_field = schema_builder.add_text_field("chunk_id", STRING | STORED);
        let paper_id_field = schema_builder.add_text_field("paper_id", STRING | STORED);
        let content_indexing = TextFieldIndexing::default()
            .set_tokenizer(CONTENT_TOKENIZER)
            .set_index_option(IndexRecordOption::WithFreqsAndPositions);
        let content_options = TextOptions::default().set_indexing_options(content_indexing).set_stored();
        let content_field = schema_builder.add_text_field("content", content_options);
        let schema = schema_builder.build();

        let dir = MmapDirectory::open(path.as_ref())?;
        let index = if path.as_ref().join("meta.json").exists() {
            Index::open(dir)?
        } else {
            Index::create(dir, schema, tantivy::IndexSettings::default())?
        };
        index.tokenizers().register(CONTENT_TOKENIZER, content_analyzer());
        let writer = index.writer(WRITER_HEAP_BYTES)?;

        Ok(Self { index, writer: RwLock::new(writer), chunk_id_field, paper_id_field, content_field })
    }

    /// `InsertChunks` sparse half (§4.3): adds tokenized forms keyed by
    /// `chunk_id`, then commits to rebuild the global BM25 bag. The stored
    /// `content` value is the CJK-widened form (§4.3 tokenization contract);
    /// original content for display is read back from the dense side, so
    /// nothing here depends on the sparse copy being byte-identical to it.
    pub async fn add_chunks(&self, entries: &[DenseEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut writer = self.writer.write().await;
        for entry in entries {
            writer.add_document(doc!(
                self.chunk_id_field => entry.chunk_id.clone(),
                self.paper_id_field => entry.paper_id.clone(),
                self.content_field => widen_cjk_runs(&entry.content),
            ))?;
        }
        writer.commit()?;
        Ok(())
    }

    /// `DeleteByPaper` sparse half (§4.3).
    pub async fn delete_by_paper(&self, paper_id: &str) -> Result<()> {
        let mut writer = self.writer.write().await;
        let term = tantivy::Term::from_field_text(self.paper_id_field, paper_id);
        writer.delete_term(term);
        writer.commit()?;
        Ok(())
    }

    /// Drops every document in the index, used by `create_collection`'s
    /// `force_recreate` (§4.3: "Force-recreate drops all data"). Unlike
    /// `delete_by_paper` this wipes the whole global BM25 bag, not just one
    /// paper's documents.
    pub async fn clear(&self) -> Result<()> {
        let mut writer = self.writer.write().await;
        writer.delete_all_documents()?;
        writer.commit()?;
        Ok(())
    }

    /// `SparseSearch(q, k, paper_id?)` (§4.3): paper-scoped if `paper_id` is
    /// given, global BM25 otherwise.
    pub async fn search(&self, query: &str, k: usize, paper_id: Option<&str>) -> Result<Vec<SparseHit>> {
        // commits are synchronous under the write lock; search only needs a
        // consistent reader snapshot, so a read lock suffices.
        let _guard = self.writer.read().await;

        let reader = self.index.reader_builder().reload_policy(ReloadPolicy::OnCommitWithDelay).try_into()?;
        let searcher = reader.searcher();

        let query_parser = QueryParser::for_index(&self.index, vec![self.content_field]);
        let widened_query = widen_cjk_runs(query);
        let full_query = match paper_id {
            Some(p) => format!("({widened_query}) AND paper_id:\"{p}\""),
            None => widened_query,
        };
        let parsed = query_parser.parse_query(&full_query)?;

        let top_docs = searcher.search(&parsed, &TopDocs::with_limit(k))?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, doc_address) in top_docs {
            let doc: TantivyDocument = searcher.doc(doc_address)?;
            if let Some(chunk_id) = doc.get_first(self.chunk_id_field).and_then(|v| v.as_str()) {
                hits.push(SparseHit { chunk_id: chunk_id.to_string(), score });
            }
        }
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quillmind_common::{Chunk, SectionType};

    fn entry(paper_id: &str, ordinal: u32, content: &str) -> DenseEntry {
        let chunk = Chunk::new(paper_id, ordinal, content, SectionType::Other, "Other", "Other", true);
        DenseEntry::from_chunk(&chunk, None)
    }

    #[tokio::test]
    async fn search_finds_matching_term() {
        let dir = tempfile::tempdir().unwrap();
        let idx = SparseIndex::open(dir.path()).unwrap();
        idx.add_chunks(&[entry("p1", 0, "the quick brown fox"), entry("p1", 1, "a lazy dog sleeps")]).await.unwrap();

        let hits = idx.search("fox", 5, None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_id, "p1#0");
    }

    #[tokio::test]
    async fn search_matches_individual_cjk_characters() {
        let dir = tempfile::tempdir().unwrap();
        let idx = SparseIndex::open(dir.path()).unwrap();
        idx.add_chunks(&[entry("p1", 0, "这是一篇关于注意力机制的论文"), entry("p1", 1, "完全不相关的内容")]).await.unwrap();

        let hits = idx.search("注意力机制", 5, None).await.unwrap();
        assert!(!hits.is_empty());
        assert_eq!(hits[0].chunk_id, "p1#0");
    }

    #[tokio::test]
    async fn search_is_paper_scoped_when_filter_given() {
        let dir = tempfile::tempdir().unwrap();
        let idx = SparseIndex::open(dir.path()).unwrap();
        idx.add_chunks(&[entry("p1", 0, "shared keyword"), entry("p2", 0, "shared keyword")]).await.unwrap();

        let hits = idx.search("shared", 10, Some("p1")).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_id, "p1#0");
    }

    #[tokio::test]
    async fn delete_by_paper_removes_its_documents() {
        let dir = tempfile::tempdir().unwrap();
        let idx = SparseIndex::open(dir.path()).unwrap();
        idx.add_chunks(&[entry("p1", 0, "removable content")]).await.unwrap();
        idx.delete_by_paper("p1").await.unwrap();

        let hits = idx.search("removable", 5, None).await.unwrap();
        assert!(hits.is_empty());
    }
}
