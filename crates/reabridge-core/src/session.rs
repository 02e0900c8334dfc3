//! Connected-session registry and fan-out.
//!
//! Every live client is represented by a [`SessionSink`]: something that
//! can accept a payload without blocking. The WebSocket layer hands in
//! the sending half of a per-session queue; tests hand in whatever they
//! like.
//!
//! The session set is guarded by a [`RwLock`]. Broadcasts iterate under
//! the read lock, joins and leaves take the write lock, so a fan-out
//! always sees a consistent set.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::snapshot::SnapshotStore;

/// Unique identifier for a connected session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Create a new identifier using UUID v7 (time-ordered).
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for SessionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors from handing a payload to one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    /// The session's outbound queue is full (slow client).
    #[error("session queue is full")]
    Full,

    /// The session's transport task has gone away.
    #[error("session is closed")]
    Closed,
}

/// Destination for payloads pushed to a single session.
///
/// `send` must not block: the broadcaster calls it for every session in
/// turn while holding the session set's read lock.
pub trait SessionSink: Send + Sync {
    /// Queue `payload` for delivery to the session.
    fn send(&self, payload: Bytes) -> Result<(), SinkError>;
}

impl SessionSink for mpsc::Sender<Bytes> {
    fn send(&self, payload: Bytes) -> Result<(), SinkError> {
        self.try_send(payload).map_err(|e| match e {
            TrySendError::Full(_) => SinkError::Full,
            TrySendError::Closed(_) => SinkError::Closed,
        })
    }
}

/// Result of pushing one payload to every session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOut {
    /// Sessions the payload was queued for.
    pub sent: usize,
    /// Sessions whose sink rejected the payload.
    pub failed: usize,
}

/// Tracks connected sessions and bootstraps new ones.
pub struct SessionManager {
    store: Arc<SnapshotStore>,
    sessions: RwLock<HashMap<SessionId, Arc<dyn SessionSink>>>,
}

impl SessionManager {
    /// Create an empty session manager reading bootstrap state from `store`.
    pub fn new(store: Arc<SnapshotStore>) -> Self {
        Self {
            store,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new session and send it the full current snapshot.
    ///
    /// The bootstrap send and the registration happen under the write
    /// lock, so no broadcast can interleave: the session either receives
    /// a snapshot that already includes a concurrent change, or receives
    /// that change's diff after its snapshot.
    pub async fn connect(&self, sink: Arc<dyn SessionSink>) -> SessionId {
        let id = SessionId::new();
        let mut sessions = self.sessions.write().await;

        if let Some(snapshot) = self.store.read().await {
            if let Err(e) = sink.send(snapshot.into_bytes()) {
                debug!(session = %id, error = %e, "Failed to queue bootstrap snapshot");
            }
        }

        sessions.insert(id, sink);
        let count = sessions.len();
        drop(sessions);

        debug!(session = %id, sessions = count, "Session registered");
        id
    }

    /// Remove a session. Returns `false` if it was not registered.
    pub async fn disconnect(&self, id: SessionId) -> bool {
        let mut sessions = self.sessions.write().await;
        let removed = sessions.remove(&id).is_some();
        let count = sessions.len();
        drop(sessions);

        if removed {
            debug!(session = %id, sessions = count, "Session deregistered");
        }
        removed
    }

    /// Number of connected sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether no session is connected.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Queue `payload` for every connected session.
    ///
    /// A failing sink is counted and skipped; it never stops delivery to
    /// the others and is not disconnected here (the transport notices a
    /// dead client on its own).
    pub async fn fan_out(&self, payload: &Bytes) -> FanOut {
        let sessions = self.sessions.read().await;
        let mut report = FanOut::default();

        for (id, sink) in sessions.iter() {
            match sink.send(payload.clone()) {
                Ok(()) => report.sent = report.sent.saturating_add(1),
                Err(e) => {
                    debug!(session = %id, error = %e, "Failed to queue payload for session");
                    report.failed = report.failed.saturating_add(1);
                }
            }
        }

        report
    }
}
