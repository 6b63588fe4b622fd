//! `ApiError` — the HTTP-edge error taxonomy (§7), grounded in how
//! `ferrumyx-web` handlers translate crate-local errors at the boundary.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("upstream temporarily unavailable: {0}")]
    UpstreamTransient(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::UpstreamTransient(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if matches!(self, ApiError::Internal(_)) {
            tracing::error!(error = %self, "internal error at the HTTP edge");
        }
        let status = self.status();
        let body = json!({"error": self.to_string()});
        (status, axum::Json(body)).into_response()
    }
}

impl From<quillmind_db::DbError> for ApiError {
    fn from(e: quillmind_db::DbError) -> Self {
        ApiError::UpstreamTransient(e.to_string())
    }
}

impl From<quillmind_llm::LlmError> for ApiError {
    fn from(e: quillmind_llm::LlmError) -> Self {
        ApiError::UpstreamTransient(e.to_string())
    }
}

impl From<quillmind_retrieval::RetrievalError> for ApiError {
    fn from(e: quillmind_retrieval::RetrievalError) -> Self {
        ApiError::UpstreamTransient(e.to_string())
    }
}

impl From<quillmind_memory::MemoryError> for ApiError {
    fn from(e: quillmind_memory::MemoryError) -> Self {
        ApiError::Internal(e.into())
    }
}

impl From<quillmind_agent::AgentError> for ApiError {
    fn from(e: quillmind_agent::AgentError) -> Self {
        ApiError::Internal(e.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_maps_to_400() {
        let err = ApiError::Validation("missing field".to_string());
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn not_found_maps_to_404() {
        let err = ApiError::NotFound("paper-1".to_string());
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn upstream_transient_maps_to_503() {
        let err = ApiError::UpstreamTransient("llm timed out".to_string());
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
