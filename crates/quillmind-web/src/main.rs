//! QuillMind web server entry point.
//!
//! Run with: cargo run -p quillmind-web

use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = quillmind_agent::Config::load()?;
    let bind_addr = config.http.bind_addr.clone();

    info!("building application state");
    let state = quillmind_web::state::AppState::new(config).await?;

    let app = quillmind_web::router::build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(%bind_addr, "quillmind-web listening");
    axum::serve(listener, app).await?;

    Ok(())
}
