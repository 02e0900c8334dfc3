//! Live state synchronization engine for the REAPER bridge.
//!
//! REAPER's web control interface can only be polled. This crate turns that
//! poll-only API into a push stream:
//!
//! - [`Poller`] fetches the composite status string on a fixed timer, with
//!   at most one request in flight
//! - [`SnapshotStore`] keeps the last full state behind a reader/writer lock
//! - [`diff`] reduces two successive snapshots to the lines that changed
//! - [`Broadcaster`] fans a diff out to every session, rate-limited
//! - [`SessionManager`] tracks connected clients and bootstraps each new
//!   one with the full current snapshot
//!
//! # Architecture
//!
//! ```text
//! Poller --> SnapshotStore (read old, write new) --> diff --> Broadcaster --> sessions
//!                  ^
//!                  +-- SessionManager::connect (bootstrap read)
//! ```
//!
//! The store is always written before the corresponding diff is
//! broadcast, so a client connecting mid-broadcast starts from state at
//! least as fresh as the diff it might miss.
//!
//! The snapshot content is opaque: lines are compared by position only.

pub mod broadcast;
pub mod diff;
pub mod poller;
pub mod session;
pub mod snapshot;
pub mod upstream;

// Re-export primary types for convenience.
pub use broadcast::{BroadcastOutcome, Broadcaster};
pub use diff::diff;
pub use poller::{Poller, PollerConfig, Reconciled};
pub use session::{FanOut, SessionId, SessionManager, SessionSink, SinkError};
pub use snapshot::{Snapshot, SnapshotStore};
pub use upstream::{FetchError, HttpUpstream, Upstream};
