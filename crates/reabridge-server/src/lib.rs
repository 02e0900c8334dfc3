//! HTTP front for the REAPER state bridge.
//!
//! One port serves everything:
//!
//! - **`WebSocket` endpoint** (default `/ws`) streaming the full snapshot on
//!   connect and line diffs afterwards, via [`reabridge_core`]
//! - **Health check** (default `/health`)
//! - **Static files** from the web root, with `.html` and `index.html`
//!   fallbacks
//! - **Proxy passthrough** to REAPER's web interface for anything else
//!
//! Startup can also register the host with rc.reaper.fm (see [`announce`]).

pub mod announce;
pub mod error;
pub mod handlers;
pub mod proxy;
pub mod router;
pub mod server;
pub mod startup;
pub mod state;
pub mod static_files;
pub mod ws;

// Re-export primary types for convenience.
pub use error::HttpError;
pub use proxy::UpstreamProxy;
pub use router::build_router;
pub use server::{bind, serve, ServerError};
pub use startup::{spawn_server, stop_server};
pub use state::{AppState, Routes};
pub use static_files::StaticFiles;
