//! JWT bearer-token verification middleware (§6), grounded in
//! `ferrumyx-web`'s axum shape, generalized to HS256 decode rather than the
//! teacher's (absent) auth layer since this system terminates auth itself.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::SharedState;

/// `{sub, user_id, is_active, exp}` (§6 "Authentication").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub user_id: String,
    pub is_active: bool,
    pub exp: usize,
}

fn extract_bearer(req: &Request) -> Result<&str, ApiError> {
    let header = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("missing Authorization header".to_string()))?;
    header.strip_prefix("Bearer ").ok_or_else(|| ApiError::Unauthorized("Authorization header is not a bearer token".to_string()))
}

/// Verifies the bearer token, rejects inactive users with 403 and every
/// other failure with 401 (§6), and stashes [`Claims`] as a request
/// extension for handlers to read.
pub async fn require_auth(State(state): State<SharedState>, mut req: Request, next: Next) -> Result<Response, ApiError> {
    let token = extract_bearer(&req)?;

    let key = DecodingKey::from_secret(state.config.security.jwt_secret.as_bytes());
    let validation = Validation::new(Algorithm::HS256);
    let data = decode::<Claims>(token, &key, &validation).map_err(|e| ApiError::Unauthorized(e.to_string()))?;

    if !data.claims.is_active {
        return Err(ApiError::Forbidden("user account is inactive".to_string()));
    }

    req.extensions_mut().insert(data.claims);
    Ok(next.run(req).await)
}
