//! Axum router — maps every URL path to its handler (§6/§7). Grounded in
//! `ferrumyx_web::router::build_router`'s shape: CORS/compression/trace
//! layers wrapped around a state-carrying `Router`.

use std::sync::Arc;

use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::require_auth;
use crate::handlers::{agent, vector};
use crate::state::{AppState, SharedState};

/// Builds the full router. Every route below requires a bearer token (§6)
/// except `/healthz`, which stays open for liveness probes.
pub fn build_router(state: AppState) -> Router {
    let shared: SharedState = Arc::new(state);

    let protected = Router::new()
        .route("/agent/chat", post(agent::chat))
        .route("/agent/conversations", get(agent::list_conversations))
        .route("/agent/conversations/:id", get(agent::get_conversation).delete(agent::delete_conversation))
        .route("/agent/tools", get(agent::list_tools))
        .route("/agent/tools/:name/execute", post(agent::execute_tool))
        .route("/agent/circuit-breakers", get(agent::circuit_breakers))
        .route("/agent/circuit-breakers/:name/reset", post(agent::reset_circuit_breaker))
        .route("/vector/index", post(vector::index_paper))
        .route("/vector/search", post(vector::search))
        .route("/vector/hybrid-search", post(vector::hybrid_search_endpoint))
        .route("/vector/qa-stream", post(vector::qa_stream))
        .route("/vector/delete/:paper_id", delete(vector::delete_paper))
        .route_layer(middleware::from_fn_with_state(shared.clone(), require_auth));

    Router::new()
        .route("/healthz", get(healthz))
        .merge(protected)
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}

async fn healthz() -> &'static str {
    "ok"
}
