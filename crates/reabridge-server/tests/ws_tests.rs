//! End-to-end tests for the `WebSocket` state stream.
//!
//! Each test binds the bridge on a loopback port, connects real
//! `WebSocket` clients and drives state through the core's poller and
//! broadcaster.

#![allow(clippy::unwrap_used, clippy::panic)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use reabridge_core::{
    Broadcaster, HttpUpstream, Poller, PollerConfig, SessionManager, Snapshot, SnapshotStore,
};
use reabridge_server::state::{AppState, Routes};
use reabridge_server::proxy::DEFAULT_PROXY_TIMEOUT;
use reabridge_server::startup::DEFAULT_SHUTDOWN_GRACE;
use reabridge_server::{bind, spawn_server, stop_server, StaticFiles, UpstreamProxy};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Bridge {
    addr: SocketAddr,
    store: Arc<SnapshotStore>,
    sessions: Arc<SessionManager>,
    broadcaster: Arc<Broadcaster>,
    shutdown: CancellationToken,
    server: JoinHandle<()>,
}

async fn start_bridge() -> Bridge {
    let store = Arc::new(SnapshotStore::new());
    let sessions = Arc::new(SessionManager::new(Arc::clone(&store)));
    let broadcaster = Arc::new(Broadcaster::new(Arc::clone(&sessions), Duration::ZERO));
    let shutdown = CancellationToken::new();
    let state = Arc::new(AppState::new(
        Arc::clone(&sessions),
        StaticFiles::new("/nonexistent-www-root"),
        UpstreamProxy::new("http://127.0.0.1:9", DEFAULT_PROXY_TIMEOUT),
        Routes::default(),
        shutdown.clone(),
    ));

    let listener = bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = spawn_server(listener, state);

    Bridge {
        addr,
        store,
        sessions,
        broadcaster,
        shutdown,
        server,
    }
}

async fn connect(addr: SocketAddr) -> Client {
    let (client, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    client
}

async fn next_text(client: &mut Client) -> String {
    let msg = tokio::time::timeout(Duration::from_secs(5), client.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    msg.to_text().unwrap().to_owned()
}

async fn wait_for_sessions(sessions: &SessionManager, count: usize) {
    for _ in 0..200 {
        if sessions.len().await == count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {count} sessions");
}

#[tokio::test]
async fn test_connect_receives_full_snapshot_first() {
    let bridge = start_bridge().await;
    bridge.store.write(Snapshot::from("A\nB\nC")).await;

    let mut client = connect(bridge.addr).await;

    assert_eq!(next_text(&mut client).await, "A\nB\nC");
}

#[tokio::test]
async fn test_connect_before_first_poll_waits_for_broadcast() {
    let bridge = start_bridge().await;
    let mut client = connect(bridge.addr).await;
    wait_for_sessions(&bridge.sessions, 1).await;

    bridge.broadcaster.broadcast(Bytes::from_static(b"X")).await;

    assert_eq!(next_text(&mut client).await, "X");
}

#[tokio::test]
async fn test_late_joiner_gets_latest_snapshot_not_a_diff() {
    let bridge = start_bridge().await;
    let poller = Poller::new(
        HttpUpstream::new("http://127.0.0.1:9", "TRANSPORT", Duration::from_secs(1)),
        Arc::clone(&bridge.store),
        Arc::clone(&bridge.broadcaster),
        PollerConfig::default(),
    );
    let mut early = connect(bridge.addr).await;
    wait_for_sessions(&bridge.sessions, 1).await;

    poller.reconcile(Snapshot::from("A\nB\nC")).await;
    poller.reconcile(Snapshot::from("A\nX\nC")).await;
    poller.reconcile(Snapshot::from("A\nX\nY")).await;

    assert_eq!(next_text(&mut early).await, "A\nB\nC");
    assert_eq!(next_text(&mut early).await, "X");
    assert_eq!(next_text(&mut early).await, "Y");

    let mut late = connect(bridge.addr).await;
    assert_eq!(next_text(&mut late).await, "A\nX\nY");
}

#[tokio::test]
async fn test_broadcast_reaches_every_client() {
    let bridge = start_bridge().await;
    let mut a = connect(bridge.addr).await;
    let mut b = connect(bridge.addr).await;
    wait_for_sessions(&bridge.sessions, 2).await;

    bridge.broadcaster.broadcast(Bytes::from_static(b"TRANSPORT\t1")).await;

    assert_eq!(next_text(&mut a).await, "TRANSPORT\t1");
    assert_eq!(next_text(&mut b).await, "TRANSPORT\t1");
}

#[tokio::test]
async fn test_client_close_deregisters_session() {
    let bridge = start_bridge().await;
    let mut client = connect(bridge.addr).await;
    wait_for_sessions(&bridge.sessions, 1).await;

    client.close(None).await.unwrap();

    wait_for_sessions(&bridge.sessions, 0).await;
}

#[tokio::test]
async fn test_shutdown_closes_sessions_and_stops_server() {
    let bridge = start_bridge().await;
    let mut client = connect(bridge.addr).await;
    wait_for_sessions(&bridge.sessions, 1).await;

    bridge.shutdown.cancel();

    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match client.next().await {
                Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(closed.is_ok());

    stop_server(bridge.server, DEFAULT_SHUTDOWN_GRACE).await;
    wait_for_sessions(&bridge.sessions, 0).await;
}
