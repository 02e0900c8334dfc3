//! Timer-driven poll loop.
//!
//! Each tick cancels whatever request is still in flight, then starts a
//! new one. Results are handled by the loop itself, never by the request
//! task, so a request that was superseded or cut off by shutdown cannot
//! touch the store or trigger a broadcast even if its transport finishes
//! afterwards.
//!
//! # Error handling
//!
//! - Deadline exceeded: expected, logged at debug, nothing changes.
//! - Upstream unreachable: logged, and ticks issue no request until the
//!   cooldown has passed. The loop keeps running, so shutdown is never
//!   delayed by a backoff.
//! - Bad status or unreadable body: logged, tick skipped.
//!
//! None of these are fatal. A dead upstream just leaves the last known
//! state in place.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::broadcast::{BroadcastOutcome, Broadcaster};
use crate::diff::diff;
use crate::snapshot::{Snapshot, SnapshotStore};
use crate::upstream::{FetchError, Upstream};

/// Default time between two poll ticks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(80);

/// Default pause after the upstream was found unreachable.
pub const DEFAULT_ERROR_COOLDOWN: Duration = Duration::from_secs(1);

/// Timing parameters for the poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    /// Time between two ticks.
    pub interval: Duration,
    /// How long to skip ticks after a transport error.
    pub error_cooldown: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            error_cooldown: DEFAULT_ERROR_COOLDOWN,
        }
    }
}

/// What a successfully fetched snapshot led to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// Byte-identical to the stored snapshot; nothing was done.
    Unchanged,
    /// Stored, but no line changed, so nothing was broadcast.
    Stored,
    /// Stored and its diff handed to the broadcaster.
    Broadcast(BroadcastOutcome),
}

/// The single in-flight upstream request, if any.
struct PollCycle {
    in_flight: Option<JoinHandle<Result<Bytes, FetchError>>>,
}

impl PollCycle {
    const fn new() -> Self {
        Self { in_flight: None }
    }

    const fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Abort the in-flight request. Returns `true` if there was one.
    fn cancel(&mut self) -> bool {
        self.in_flight.take().is_some_and(|handle| {
            handle.abort();
            true
        })
    }

    /// Cancel any previous request and start a new one.
    fn start<U: Upstream>(&mut self, upstream: &Arc<U>) -> bool {
        let replaced = self.cancel();
        let upstream = Arc::clone(upstream);
        self.in_flight = Some(tokio::spawn(async move { upstream.fetch().await }));
        replaced
    }

    /// Wait for the in-flight request to finish.
    ///
    /// Pending forever when nothing is in flight; callers guard with
    /// [`is_in_flight`](Self::is_in_flight).
    async fn finish(&mut self) -> Result<Bytes, FetchError> {
        let Some(handle) = self.in_flight.as_mut() else {
            return std::future::pending().await;
        };
        let joined = handle.await;
        self.in_flight = None;
        joined.unwrap_or_else(|e| Err(FetchError::Transport(format!("poll task failed: {e}"))))
    }
}

/// Polls the upstream on a fixed timer and feeds changes to the
/// broadcaster.
///
/// The poller is the only writer of the [`SnapshotStore`].
pub struct Poller<U> {
    upstream: Arc<U>,
    store: Arc<SnapshotStore>,
    broadcaster: Arc<Broadcaster>,
    config: PollerConfig,
}

impl<U: Upstream> Poller<U> {
    /// Create a poller. Nothing happens until [`run`](Self::run).
    pub fn new(
        upstream: U,
        store: Arc<SnapshotStore>,
        broadcaster: Arc<Broadcaster>,
        config: PollerConfig,
    ) -> Self {
        Self {
            upstream: Arc::new(upstream),
            store,
            broadcaster,
            config,
        }
    }

    /// Run the poll loop until `shutdown` is cancelled.
    ///
    /// On shutdown the in-flight request, if any, is aborted before this
    /// returns.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cycle = PollCycle::new();
        let mut cooldown_until: Option<Instant> = None;

        info!(
            interval_ms = self.config.interval.as_millis(),
            cooldown_ms = self.config.error_cooldown.as_millis(),
            "Poller starting"
        );

        loop {
            tokio::select! {
                biased;

                () = shutdown.cancelled() => {
                    if cycle.cancel() {
                        debug!("In-flight poll request cancelled by shutdown");
                    }
                    break;
                }

                _ = ticker.tick() => {
                    if cooldown_until.is_some_and(|until| Instant::now() < until) {
                        if cycle.cancel() {
                            debug!("Previous poll request cancelled during cooldown");
                        }
                        continue;
                    }
                    cooldown_until = None;
                    if cycle.start(&self.upstream) {
                        debug!("Previous poll request still in flight, cancelled");
                    }
                }

                result = cycle.finish(), if cycle.is_in_flight() => {
                    match result {
                        Ok(body) => {
                            let outcome = self.reconcile(Snapshot::from(body)).await;
                            trace!(?outcome, "Poll reconciled");
                        }
                        Err(e) if e.is_expected() => {
                            debug!(error = %e, "Poll request expired");
                        }
                        Err(e) => {
                            warn!(error = %e, "Poll request failed");
                            if e.wants_cooldown() {
                                cooldown_until = Instant::now().checked_add(self.config.error_cooldown);
                            }
                        }
                    }
                }
            }
        }

        info!("Poller stopped");
    }

    /// Apply a freshly fetched snapshot.
    ///
    /// Byte-identical snapshots are skipped. Otherwise the diff against
    /// the stored snapshot is computed, the new snapshot is stored, and
    /// only then is a non-empty diff broadcast.
    pub async fn reconcile(&self, snapshot: Snapshot) -> Reconciled {
        let previous = self.store.read().await;
        if previous.as_ref() == Some(&snapshot) {
            return Reconciled::Unchanged;
        }

        let payload = diff(previous.as_ref(), &snapshot);
        self.store.write(snapshot).await;

        match payload {
            Some(payload) => Reconciled::Broadcast(self.broadcaster.broadcast(payload).await),
            None => Reconciled::Stored,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::sync::{mpsc, Mutex};

    use super::*;
    use crate::broadcast::DEFAULT_MIN_BROADCAST_INTERVAL;
    use crate::session::SessionManager;

    /// One scripted upstream answer: wait `delay`, then return `result`.
    struct Step {
        delay: Duration,
        result: Result<Bytes, FetchError>,
    }

    fn ok(delay_ms: u64, body: &'static str) -> Step {
        Step {
            delay: Duration::from_millis(delay_ms),
            result: Ok(Bytes::from_static(body.as_bytes())),
        }
    }

    fn err(error: FetchError) -> Step {
        Step {
            delay: Duration::ZERO,
            result: Err(error),
        }
    }

    /// Plays back scripted answers; once exhausted every fetch times out.
    struct ScriptedUpstream {
        steps: Mutex<VecDeque<Step>>,
        calls: Arc<AtomicUsize>,
    }

    impl Upstream for ScriptedUpstream {
        async fn fetch(&self) -> Result<Bytes, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let step = self.steps.lock().await.pop_front();
            match step {
                Some(step) => {
                    tokio::time::sleep(step.delay).await;
                    step.result
                }
                None => Err(FetchError::Timeout),
            }
        }
    }

    struct Harness {
        store: Arc<SnapshotStore>,
        rx: mpsc::Receiver<Bytes>,
        calls: Arc<AtomicUsize>,
        shutdown: CancellationToken,
        task: JoinHandle<()>,
    }

    impl Harness {
        async fn start(steps: Vec<Step>) -> Self {
            let store = Arc::new(SnapshotStore::new());
            let sessions = Arc::new(SessionManager::new(Arc::clone(&store)));
            let (tx, rx) = mpsc::channel(16);
            sessions.connect(Arc::new(tx)).await;
            let broadcaster = Arc::new(Broadcaster::new(sessions, DEFAULT_MIN_BROADCAST_INTERVAL));
            let calls = Arc::new(AtomicUsize::new(0));
            let upstream = ScriptedUpstream {
                steps: Mutex::new(steps.into()),
                calls: Arc::clone(&calls),
            };
            let poller = Poller::new(upstream, Arc::clone(&store), broadcaster, PollerConfig::default());
            let shutdown = CancellationToken::new();
            let task = tokio::spawn(poller.run(shutdown.clone()));
            Self {
                store,
                rx,
                calls,
                shutdown,
                task,
            }
        }

        async fn stop(self) -> (Arc<SnapshotStore>, mpsc::Receiver<Bytes>, usize) {
            self.shutdown.cancel();
            self.task.await.unwrap();
            (self.store, self.rx, self.calls.load(Ordering::SeqCst))
        }
    }

    fn drain(rx: &mut mpsc::Receiver<Bytes>) -> Vec<Bytes> {
        let mut out = Vec::new();
        while let Ok(payload) = rx.try_recv() {
            out.push(payload);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn first_poll_broadcasts_full_snapshot_then_diffs() {
        let harness = Harness::start(vec![ok(0, "A\nB\nC"), ok(0, "A\nX\nC")]).await;
        tokio::time::sleep(Duration::from_millis(120)).await;

        let (store, mut rx, _) = harness.stop().await;

        assert_eq!(store.read().await, Some(Snapshot::from("A\nX\nC")));
        let received = drain(&mut rx);
        assert_eq!(received, vec![Bytes::from_static(b"A\nB\nC"), Bytes::from_static(b"X")]);
    }

    #[tokio::test(start_paused = true)]
    async fn superseded_request_never_writes_or_broadcasts() {
        // The first request takes longer than a tick and is cancelled by the
        // second tick; only the second result may land.
        let harness = Harness::start(vec![ok(200, "STALE"), ok(0, "A\nB")]).await;
        tokio::time::sleep(Duration::from_millis(500)).await;

        let (store, mut rx, calls) = harness.stop().await;

        assert!(calls >= 2);
        assert_eq!(store.read().await, Some(Snapshot::from("A\nB")));
        assert_eq!(drain(&mut rx), vec![Bytes::from_static(b"A\nB")]);
    }

    #[tokio::test(start_paused = true)]
    async fn identical_snapshot_is_not_rebroadcast() {
        let harness = Harness::start(vec![ok(0, "A\nB"), ok(0, "A\nB"), ok(0, "A\nB\n")]).await;
        tokio::time::sleep(Duration::from_millis(200)).await;

        let (store, mut rx, _) = harness.stop().await;

        assert_eq!(drain(&mut rx), vec![Bytes::from_static(b"A\nB")]);
        // Byte-different but line-equal snapshots are stored without a broadcast.
        assert_eq!(store.read().await, Some(Snapshot::from("A\nB\n")));
    }

    #[tokio::test(start_paused = true)]
    async fn transport_error_starts_cooldown_without_mutation() {
        let harness = Harness::start(vec![
            err(FetchError::Transport(String::from("connection refused"))),
            ok(0, "A"),
        ])
        .await;

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(harness.calls.load(Ordering::SeqCst), 1);
        assert!(harness.store.read().await.is_none());

        tokio::time::sleep(Duration::from_millis(700)).await;
        let (store, mut rx, calls) = harness.stop().await;

        assert!(calls >= 2);
        assert_eq!(store.read().await, Some(Snapshot::from("A")));
        assert_eq!(drain(&mut rx), vec![Bytes::from_static(b"A")]);
    }

    #[tokio::test(start_paused = true)]
    async fn bad_status_skips_tick_without_cooldown() {
        let harness = Harness::start(vec![err(FetchError::Status(500)), ok(0, "A")]).await;
        tokio::time::sleep(Duration::from_millis(120)).await;

        let (store, _rx, calls) = harness.stop().await;

        assert_eq!(calls, 2);
        assert_eq!(store.read().await, Some(Snapshot::from("A")));
    }

    #[tokio::test(start_paused = true)]
    async fn body_error_skips_tick_without_mutation() {
        let harness = Harness::start(vec![
            err(FetchError::Body(String::from("connection reset"))),
            ok(0, "A"),
        ])
        .await;

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(harness.calls.load(Ordering::SeqCst), 1);
        assert!(harness.store.read().await.is_none());

        // No cooldown: the very next tick polls again.
        tokio::time::sleep(Duration::from_millis(80)).await;
        let (store, mut rx, calls) = harness.stop().await;

        assert_eq!(calls, 2);
        assert_eq!(store.read().await, Some(Snapshot::from("A")));
        assert_eq!(drain(&mut rx), vec![Bytes::from_static(b"A")]);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_in_flight_request() {
        let harness = Harness::start(vec![ok(10_000, "LATE")]).await;
        tokio::time::sleep(Duration::from_millis(40)).await;

        let (store, mut rx, calls) = harness.stop().await;
        tokio::time::sleep(Duration::from_secs(20)).await;

        assert_eq!(calls, 1);
        assert!(store.read().await.is_none());
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn reconcile_stores_before_broadcasting() {
        let store = Arc::new(SnapshotStore::new());
        let sessions = Arc::new(SessionManager::new(Arc::clone(&store)));
        let broadcaster = Arc::new(Broadcaster::new(sessions, Duration::ZERO));
        let upstream = ScriptedUpstream {
            steps: Mutex::new(VecDeque::new()),
            calls: Arc::new(AtomicUsize::new(0)),
        };
        let poller = Poller::new(upstream, Arc::clone(&store), broadcaster, PollerConfig::default());

        assert_eq!(
            poller.reconcile(Snapshot::from("A\nB")).await,
            Reconciled::Broadcast(BroadcastOutcome::Delivered { sent: 0, failed: 0 })
        );
        assert_eq!(poller.reconcile(Snapshot::from("A\nB")).await, Reconciled::Unchanged);
        assert_eq!(poller.reconcile(Snapshot::from("A\nB\n")).await, Reconciled::Stored);
        assert_eq!(store.read().await, Some(Snapshot::from("A\nB\n")));
    }
}
