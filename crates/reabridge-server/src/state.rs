//! Shared application state for the bridge's HTTP server.
//!
//! [`AppState`] ties the HTTP handlers to the synchronization core: the
//! [`SessionManager`] that every WebSocket connection registers with, the
//! static-file root, the upstream proxy, and the shutdown token that ends
//! every session when the process stops.

use std::sync::Arc;

use reabridge_core::SessionManager;
use tokio_util::sync::CancellationToken;

use crate::proxy::UpstreamProxy;
use crate::static_files::StaticFiles;

/// Capacity of each session's outbound payload queue.
///
/// A client that falls this far behind starts missing broadcasts; it
/// stays connected and catches up with the next diff.
pub const SESSION_QUEUE_CAPACITY: usize = 64;

/// Paths of the fixed endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routes {
    /// WebSocket upgrade path.
    pub ws_path: String,
    /// Health check path.
    pub health_path: String,
}

impl Default for Routes {
    fn default() -> Self {
        Self {
            ws_path: String::from("/ws"),
            health_path: String::from("/health"),
        }
    }
}

/// Shared state for the Axum application.
///
/// Wrapped in [`Arc`] and injected via Axum's `State` extractor.
pub struct AppState {
    /// Registry of connected WebSocket sessions.
    pub sessions: Arc<SessionManager>,
    /// Static asset lookup.
    pub static_files: StaticFiles,
    /// Relay for requests that match no static file.
    pub proxy: UpstreamProxy,
    /// Endpoint paths.
    pub routes: Routes,
    /// Cancelled when the process shuts down.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Assemble the application state.
    pub const fn new(
        sessions: Arc<SessionManager>,
        static_files: StaticFiles,
        proxy: UpstreamProxy,
        routes: Routes,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            sessions,
            static_files,
            proxy,
            routes,
            shutdown,
        }
    }
}
