//! Plain HTTP handlers: health check and the static-or-proxy fallback.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::warn;

use crate::state::AppState;

/// Fixed liveness answer.
pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Serve a static file if one matches, otherwise relay to REAPER.
pub async fn static_or_proxy(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
) -> Response {
    if let Some(path) = state.static_files.resolve(request.uri().path()).await {
        return match state.static_files.serve(&path).await {
            Ok(response) => response,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to serve static file");
                e.into_response()
            }
        };
    }

    let method = request.method().clone();
    let uri = request.uri().clone();
    match state.proxy.forward(request).await {
        Ok(response) => response,
        Err(e) => {
            warn!(%method, %uri, error = %e, "Proxy request failed");
            e.into_response()
        }
    }
}
