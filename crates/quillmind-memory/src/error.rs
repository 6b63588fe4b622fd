//! Error type shared across the memory stack's four tiers.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error(transparent)]
    Kv(#[from] crate::kv::KvError),

    #[error(transparent)]
    Db(#[from] quillmind_db::DbError),

    #[error(transparent)]
    Llm(#[from] quillmind_llm::LlmError),

    #[error(transparent)]
    Retrieval(#[from] quillmind_retrieval::RetrievalError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MemoryError>;
