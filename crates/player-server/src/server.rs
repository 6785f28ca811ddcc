//! HTTP server implementation using Axum.

use crate::handler::{
    handle_health, handle_proxy, handle_sync_delete, handle_sync_get, handle_sync_put,
    handle_worker_message, handle_worker_status, handle_worker_sync,
};
use axum::{
    routing::{get, post},
    Router,
};
use player_core::{ServiceWorker, SyncChannel};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use url::Url;

/// Requests handled at once before callers queue.
const MAX_CONCURRENT_REQUESTS: usize = 64;

/// Application state shared across handlers.
pub struct AppState {
    /// Offline worker every proxied request goes through
    pub worker: Arc<ServiceWorker>,
    /// Persistent player state
    pub sync: Arc<SyncChannel>,
    /// Origin proxied requests are resolved against
    pub origin: Url,
}

/// Build the router for `state`.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/worker/status", get(handle_worker_status))
        .route("/worker/message", post(handle_worker_message))
        .route("/worker/sync", post(handle_worker_sync))
        .route(
            "/sync/:key",
            get(handle_sync_get)
                .put(handle_sync_put)
                .delete(handle_sync_delete),
        )
        .fallback(handle_proxy)
        .layer(ConcurrencyLimitLayer::new(MAX_CONCURRENT_REQUESTS))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server.
///
/// Returns the actual address the server is bound to (useful when port=0).
pub async fn start_server(state: AppState, host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    let app = router(Arc::new(state));

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!("Server listening on {}", actual_addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Server error: {}", e);
        }
    });

    Ok(actual_addr)
}
