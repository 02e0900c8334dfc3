//! Background spawning and bounded shutdown of the server.
//!
//! # Usage
//!
//! ```rust,ignore
//! use reabridge_server::startup::{spawn_server, stop_server};
//!
//! let listener = reabridge_server::server::bind(addr).await?;
//! let handle = spawn_server(listener, Arc::clone(&state));
//! // ... wait for a signal, then:
//! state.shutdown.cancel();
//! stop_server(handle, Duration::from_secs(5)).await;
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::server::serve;
use crate::state::AppState;

/// Default time in-flight requests get to finish after shutdown begins.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Spawn the HTTP server on a background Tokio task.
///
/// The server runs until `state.shutdown` is cancelled. Errors are logged
/// from inside the task.
pub fn spawn_server(listener: TcpListener, state: Arc<AppState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = serve(listener, state).await {
            error!(error = %e, "Bridge server exited with error");
        }
    })
}

/// Wait for a server task to drain, aborting it after `grace`.
///
/// The shutdown token must already be cancelled.
pub async fn stop_server(mut handle: JoinHandle<()>, grace: Duration) {
    match tokio::time::timeout(grace, &mut handle).await {
        Ok(Ok(())) => info!("Bridge server drained"),
        Ok(Err(e)) => warn!(error = %e, "Bridge server task failed"),
        Err(_) => {
            warn!(
                grace_ms = grace.as_millis(),
                "Grace period elapsed, closing remaining connections"
            );
            handle.abort();
        }
    }
}
