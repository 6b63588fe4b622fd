//! Request handlers, grouped by surface: the agent/chat API (§6) and the
//! vector/ingestion API (§7). Mirrors `ferrumyx_web::handlers`'s
//! one-module-per-feature layout.

pub mod agent;
pub mod vector;
