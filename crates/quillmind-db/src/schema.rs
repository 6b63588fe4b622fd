//! Dense-index row shape (§3 DenseEntry) and table name constants.

use chrono::{DateTime, Utc};
use quillmind_common::{Chunk, SectionType};

/// Default embedding dimension (§3: "1536 is typical").
pub const EMBEDDING_DIM: usize = 1536;

pub const TABLE_CHUNKS: &str = "chunks";

/// A row of the dense index: a [`Chunk`]'s metadata plus its embedding.
///
/// The on-disk Arrow schema names the hierarchy-path column `page_range` and
/// the section-type column `source` — a misnomer preserved for bit-compat
/// with an earlier schema generation (§4.3). Those names never leak past
/// [`crate::arrow_codec`]; everywhere else this struct's field names are used.
#[derive(Debug, Clone)]
pub struct DenseEntry {
    pub chunk_id: String,
    pub paper_id: String,
    pub ordinal: u32,
    pub content: String,
    pub section_type: SectionType,
    pub section_title: String,
    pub hierarchy_path: String,
    pub char_count: usize,
    pub is_complete_section: bool,
    pub uploaded_at: DateTime<Utc>,
    pub embedding: Option<Vec<f32>>,
}

impl DenseEntry {
    pub fn from_chunk(chunk: &Chunk, embedding: Option<Vec<f32>>) -> Self {
        Self {
            chunk_id: chunk.chunk_id(),
            paper_id: chunk.paper_id.clone(),
            ordinal: chunk.ordinal,
            content: chunk.content.clone(),
            section_type: chunk.section_type,
            section_title: chunk.section_title.clone(),
            hierarchy_path: chunk.hierarchy_path.clone(),
            char_count: chunk.char_count,
            is_complete_section: chunk.is_complete_section,
            uploaded_at: chunk.uploaded_at,
            embedding,
        }
    }

    pub fn into_chunk(self) -> Chunk {
        Chunk::new(
            self.paper_id,
            self.ordinal,
            self.content,
            self.section_type,
            self.section_title,
            self.hierarchy_path,
            self.is_complete_section,
        )
    }
}

/// A dense-search hit: the stored entry plus the distance/relevance pair
/// (§4.3 `DenseSearch`).
#[derive(Debug, Clone)]
pub struct DenseHit {
    pub entry: DenseEntry,
    pub distance: f32,
    pub relevance_score: f32,
}

/// A sparse (BM25) search hit — just the join key and score; callers rejoin
/// against the dense index for full metadata.
#[derive(Debug, Clone)]
pub struct SparseHit {
    pub chunk_id: String,
    pub score: f32,
}
