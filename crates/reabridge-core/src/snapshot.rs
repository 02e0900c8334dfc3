//! Snapshot type and the shared store holding the latest polled state.
//!
//! The store is the only mutable state shared between the poll loop and
//! the session connect path. It sits behind a [`tokio::sync::RwLock`]:
//! concurrent reads never block each other, the poller's write blocks
//! everyone until the new value is in place.

use bytes::Bytes;
use tokio::sync::RwLock;

/// The upstream's full reported state at one poll instant.
///
/// Logically a newline-delimited sequence of lines whose positions are
/// stable semantic slots. The content is never interpreted.
///
/// Backed by [`Bytes`]: cloning hands out another view of the same
/// immutable buffer, so no holder can ever observe a mutation made by
/// another.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Snapshot(Bytes);

impl Snapshot {
    /// Borrow the raw snapshot bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consume the snapshot and return its buffer.
    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl From<Bytes> for Snapshot {
    fn from(bytes: Bytes) -> Self {
        Self(bytes)
    }
}

impl From<Vec<u8>> for Snapshot {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Bytes::from(bytes))
    }
}

impl From<&'static str> for Snapshot {
    fn from(text: &'static str) -> Self {
        Self(Bytes::from_static(text.as_bytes()))
    }
}

/// Holds the last successfully polled [`Snapshot`].
///
/// Single writer (the poller), many readers (the poller itself and every
/// session connect). Reads return an owned value, never a reference into
/// the lock.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    current: RwLock<Option<Snapshot>>,
}

impl SnapshotStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the stored snapshot, or `None` before the first successful
    /// poll.
    pub async fn read(&self) -> Option<Snapshot> {
        self.current.read().await.clone()
    }

    /// Replace the stored snapshot.
    pub async fn write(&self, snapshot: Snapshot) {
        *self.current.write().await = Some(snapshot);
    }
}
