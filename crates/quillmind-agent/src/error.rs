use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Db(#[from] quillmind_db::DbError),
    #[error(transparent)]
    Llm(#[from] quillmind_llm::LlmError),
    #[error(transparent)]
    Retrieval(#[from] quillmind_retrieval::RetrievalError),
    #[error(transparent)]
    Memory(#[from] quillmind_memory::MemoryError),
    #[error("max iterations ({0}) reached without a final answer")]
    MaxIterationsReached(u32),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AgentError>;
