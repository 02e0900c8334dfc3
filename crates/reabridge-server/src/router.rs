//! Axum router construction for the bridge.
//!
//! Assembles the `WebSocket` endpoint, the health check and the
//! static-or-proxy fallback into a single [`Router`].

use std::sync::Arc;

use axum::http::header::HeaderName;
use axum::http::HeaderValue;
use axum::routing::get;
use axum::Router;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Lets the web UI hold a screen wake lock while showing lyrics.
const PERMISSIONS_POLICY: &str = "screen-wake-lock=(self)";

/// Build the complete Axum router.
///
/// The router includes:
/// - `GET {ws_path}` -- `WebSocket` state stream
/// - `GET {health_path}` -- fixed `200 ok`
/// - everything else -- static file under the web root, or relayed to
///   REAPER
///
/// Every response carries a `Permissions-Policy` header.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(&state.routes.ws_path, get(ws::ws_session))
        .route(&state.routes.health_path, get(handlers::health))
        .fallback(handlers::static_or_proxy)
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("permissions-policy"),
            HeaderValue::from_static(PERMISSIONS_POLICY),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
