//! HTTP server lifecycle management.
//!
//! [`bind`] opens the listener so bind failures surface before anything
//! is spawned; [`serve`] runs the router until the state's shutdown token
//! is cancelled, then drains in-flight requests.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use crate::router::build_router;
use crate::state::AppState;

/// Errors that can occur when starting or running the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind to the network address.
    #[error("bind error: {0}")]
    Bind(String),

    /// The server encountered a fatal error while serving.
    #[error("serve error: {0}")]
    Serve(String),
}

/// Bind a TCP listener on `addr`.
///
/// # Errors
///
/// Returns [`ServerError::Bind`] if the address is unavailable.
pub async fn bind(addr: SocketAddr) -> Result<TcpListener, ServerError> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::Bind(format!("bind failed on {addr}: {e}")))
}

/// Serve requests on `listener` until `state.shutdown` is cancelled.
///
/// After cancellation no new connections are accepted and the call
/// returns once open connections have finished. Bounding that drain is
/// up to the caller.
///
/// # Errors
///
/// Returns [`ServerError::Serve`] on a fatal I/O error.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<(), ServerError> {
    let addr = listener
        .local_addr()
        .map_err(|e| ServerError::Serve(format!("listener has no address: {e}")))?;
    let shutdown = state.shutdown.clone();
    let router = build_router(state);

    info!(%addr, "Bridge server listening");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { shutdown.cancelled().await })
    .await
    .map_err(|e| ServerError::Serve(format!("serve error: {e}")))?;

    info!(%addr, "Bridge server stopped");
    Ok(())
}
