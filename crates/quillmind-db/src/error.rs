//! Dual-index error type.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("LanceDB error: {0}")]
    LanceDb(String),

    #[error("Arrow error: {0}")]
    Arrow(String),

    #[error("tantivy error: {0}")]
    Tantivy(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("entry not found: {0}")]
    NotFound(String),

    #[error("invalid embedding dimension: expected {expected}, got {actual}")]
    InvalidEmbeddingDimension { expected: usize, actual: usize },

    #[error("chunks and embeddings length mismatch: {chunks} chunks, {embeddings} embeddings")]
    LengthMismatch { chunks: usize, embeddings: usize },

    #[error("database not initialized")]
    NotInitialized,

    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

impl From<lancedb::Error> for DbError {
    fn from(err: lancedb::Error) -> Self {
        DbError::LanceDb(err.to_string())
    }
}

impl From<arrow_schema::ArrowError> for DbError {
    fn from(err: arrow_schema::ArrowError) -> Self {
        DbError::Arrow(err.to_string())
    }
}

impl From<tantivy::TantivyError> for DbError {
    fn from(err: tantivy::TantivyError) -> Self {
        DbError::Tantivy(err.to_string())
    }
}
