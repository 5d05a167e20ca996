//! `api` crate: HTTP surface over the engine.
//!
//! Exposes:
//!   POST /api/v1/workflows/{id}/execute      enqueue a run (202 + job)
//!   POST /api/v1/workflows/{id}/run          run inline, return the final context
//!   POST /api/v1/webhooks/{id}               enqueue a run seeded with the request body
//!   POST /api/v1/realtime/token              issue a status subscription token
//!   GET  /api/v1/realtime/stream/{token}     server-sent status events

mod error;
pub mod handlers;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use engine::{StatusChannel, WorkflowExecutor};
use queue::JobQueue;

pub use error::ApiError;

/// Shared handles every handler needs.
#[derive(Clone)]
pub struct AppState {
    pub executor: Arc<WorkflowExecutor>,
    pub queue: Arc<dyn JobQueue>,
    pub status: Arc<StatusChannel>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/workflows/:id/execute", post(handlers::executions::execute))
        .route("/api/v1/workflows/:id/run", post(handlers::executions::run))
        .route("/api/v1/webhooks/:id", post(handlers::webhooks::handle_webhook))
        .route("/api/v1/realtime/token", post(handlers::realtime::issue_token))
        .route("/api/v1/realtime/stream/:token", get(handlers::realtime::stream))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the API on `bind` until `shutdown` is cancelled.
pub async fn serve(bind: &str, state: AppState, shutdown: CancellationToken) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("API listening on {}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}
