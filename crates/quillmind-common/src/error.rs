//! Shared error types used where a crate-specific error would be overkill.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommonError {
    #[error("invalid chunk id: {0}")]
    InvalidChunkId(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, CommonError>;
