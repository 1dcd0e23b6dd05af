//! Health check HTTP server.
//!
//! Exposes liveness endpoints for container orchestration while the
//! worker loop runs:
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns service name and version) |
//! | `GET`  | `/healthz` | Alias for `/health` |
//!
//! All origins are permitted so browser-based dashboards can probe the
//! worker directly.

use axum::{routing::get, Json, Router};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

/// Starts the health server on the given bind address.
///
/// Runs until the process is terminated; intended to be spawned
/// alongside the worker loop.
pub async fn run_health_server(bind: &str) -> anyhow::Result<()> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .layer(cors);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(bind, "health server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "auditor-agent",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
