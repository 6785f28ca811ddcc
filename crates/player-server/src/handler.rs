//! Request handlers.

use crate::server::AppState;
use axum::{
    body::{to_bytes, Body},
    extract::{Path, Request, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use player_core::{FetchRequest, FetchResponse, RecordKind, SyncRecord, WorkerMessage};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

/// Largest request body forwarded to the origin.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

/// Health check endpoint.
pub async fn handle_health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// Current worker state and cache usage.
pub async fn handle_worker_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let manager = state.worker.manager();
    let stats = match manager.stats().await {
        Ok(stats) => serde_json::to_value(stats).unwrap_or(Value::Null),
        Err(e) => {
            warn!("Failed to read cache stats: {}", e);
            Value::Null
        }
    };

    Json(json!({
        "state": state.worker.state(),
        "controlling": state.worker.is_controlling(),
        "cache_name": manager.cache_name(),
        "origin": state.origin.as_str(),
        "stats": stats,
    }))
}

/// Message posted by the page, e.g. `{"type": "SKIP_WAITING"}`.
pub async fn handle_worker_message(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Response {
    let Some(message) = WorkerMessage::from_value(&body) else {
        return error_response(StatusCode::BAD_REQUEST, format!("unknown message: {}", body));
    };

    let activation = state.worker.handle_message(message).await;
    Json(json!({
        "state": state.worker.state(),
        "activation": activation,
    }))
    .into_response()
}

#[derive(Debug, Deserialize)]
pub struct SyncRequest {
    pub tag: String,
}

/// Background sync event.
pub async fn handle_worker_sync(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SyncRequest>,
) -> impl IntoResponse {
    let handled = state.worker.handle_sync(&request.tag);
    Json(json!({ "tag": request.tag, "handled": handled }))
}

/// Read a sync key.
pub async fn handle_sync_get(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Response {
    match state.sync.get_value(&key) {
        Some(value) => Json(value).into_response(),
        None => error_response(StatusCode::NOT_FOUND, format!("{} is not set", key)),
    }
}

/// Write a sync key. The player's own keys are validated first.
pub async fn handle_sync_put(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Json(value): Json<Value>,
) -> Response {
    let stored = match RecordKind::from_key(&key) {
        Some(kind) => {
            let max_songs = state.sync.config().max_songs;
            SyncRecord::decode(kind, value, max_songs)
                .and_then(|record| state.sync.set_record(&record))
        }
        None => state.sync.try_set(&key, &value),
    };
    match stored {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) if e.is_storage() => {
            warn!("Failed to store {}: {}", key, e);
            error_response(StatusCode::INSUFFICIENT_STORAGE, e.to_string())
        }
        Err(e) => error_response(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
    }
}

/// Remove a sync key.
pub async fn handle_sync_delete(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> impl IntoResponse {
    state.sync.remove(&key);
    StatusCode::NO_CONTENT
}

/// Forward any other request to the origin through the worker.
pub async fn handle_proxy(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let target = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = match resolve_target(&state.origin, target) {
        Ok(url) => url,
        Err(message) => return error_response(StatusCode::BAD_REQUEST, message),
    };
    let body = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(body) => body,
        Err(e) => return error_response(StatusCode::PAYLOAD_TOO_LARGE, e.to_string()),
    };

    let mut fetch = FetchRequest::new(parts.method, url).with_body(body);
    fetch.headers = forwardable(&parts.headers);
    debug!("Proxying {} {}", fetch.method, fetch.url);

    match state.worker.fetch(&fetch).await {
        Ok(response) => into_response(response),
        Err(e) => {
            warn!("Upstream request failed: {}", e);
            error_response(StatusCode::BAD_GATEWAY, e.to_string())
        }
    }
}

/// Resolve a request path against `origin`. Targets that would leave the
/// origin (absolute URLs, `blob:` and other schemes) are refused.
fn resolve_target(origin: &Url, target: &str) -> Result<Url, String> {
    let url = origin
        .join(target.trim_start_matches('/'))
        .map_err(|e| e.to_string())?;
    if url.scheme() != origin.scheme() || url.origin() != origin.origin() {
        return Err(format!("{} is outside {}", url, origin.origin().ascii_serialization()));
    }
    Ok(url)
}

/// Copy `headers` without the ones that only describe a single hop.
fn forwardable(headers: &HeaderMap) -> HeaderMap {
    let mut headers = headers.clone();
    for name in [
        header::CONNECTION,
        header::CONTENT_LENGTH,
        header::HOST,
        header::TRANSFER_ENCODING,
        header::UPGRADE,
    ] {
        headers.remove(name);
    }
    headers
}

fn into_response(response: FetchResponse) -> Response {
    let mut out = Response::new(Body::from(response.body));
    *out.status_mut() = response.status;
    *out.headers_mut() = forwardable(&response.headers);
    out
}
