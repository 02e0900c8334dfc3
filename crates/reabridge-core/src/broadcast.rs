//! Rate-limited broadcast of diff payloads to all sessions.
//!
//! A broadcast arriving sooner than the minimum interval after the last
//! executed one is dropped, not queued. The next poll tick diffs against
//! the already-updated store, so a change that keeps differing across
//! ticks is re-sent then. A burst that settles between two ticks can be
//! swallowed entirely; that staleness window is accepted.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::session::SessionManager;

/// Default floor between two executed broadcasts.
pub const DEFAULT_MIN_BROADCAST_INTERVAL: Duration = Duration::from_millis(10);

/// What happened to a broadcast request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastOutcome {
    /// The payload was handed to every session.
    Delivered {
        /// Sessions the payload was queued for.
        sent: usize,
        /// Sessions whose sink rejected it.
        failed: usize,
    },
    /// The request came too soon after the previous broadcast and was
    /// dropped.
    Throttled,
}

/// Pushes payloads to every connected session, at most once per
/// `min_interval`.
pub struct Broadcaster {
    sessions: Arc<SessionManager>,
    min_interval: Duration,
    last_broadcast: Mutex<Option<Instant>>,
}

impl Broadcaster {
    /// Create a broadcaster over `sessions`.
    pub fn new(sessions: Arc<SessionManager>, min_interval: Duration) -> Self {
        Self {
            sessions,
            min_interval,
            last_broadcast: Mutex::new(None),
        }
    }

    /// Send `payload` to every connected session unless the previous
    /// broadcast was less than `min_interval` ago.
    pub async fn broadcast(&self, payload: Bytes) -> BroadcastOutcome {
        let now = Instant::now();
        {
            let mut last = self.last_broadcast.lock().await;
            if let Some(previous) = *last {
                let elapsed = now.saturating_duration_since(previous);
                if elapsed < self.min_interval {
                    trace!(
                        elapsed_us = elapsed.as_micros(),
                        "Broadcast dropped by rate limit"
                    );
                    return BroadcastOutcome::Throttled;
                }
            }
            *last = Some(now);
        }

        let report = self.sessions.fan_out(&payload).await;
        debug!(
            bytes = payload.len(),
            sent = report.sent,
            failed = report.failed,
            "Broadcast delivered"
        );
        BroadcastOutcome::Delivered {
            sent: report.sent,
            failed: report.failed,
        }
    }
}
