//! `WebSocket` session handler.
//!
//! Clients connect to the configured path (default `/ws`). On upgrade the
//! connection registers with the [`SessionManager`], which immediately
//! queues the full current snapshot; after that the client receives every
//! broadcast diff. The stream is push-only: data frames from the client
//! are ignored.
//!
//! Payloads go out as text frames, or binary frames when REAPER sent
//! bytes that are not UTF-8.
//!
//! [`SessionManager`]: reabridge_core::SessionManager

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, Utf8Bytes, WebSocket};
use axum::extract::{ConnectInfo, State, WebSocketUpgrade};
use axum::http::{header, HeaderMap};
use axum::response::IntoResponse;
use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::state::{AppState, SESSION_QUEUE_CAPACITY};

/// Upgrade an HTTP request to a `WebSocket` session.
pub async fn ws_session(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_owned();
    ws.on_upgrade(move |socket| handle_session(socket, state, peer, user_agent))
}

/// Drive one session: register, forward queued payloads, deregister.
async fn handle_session(
    mut socket: WebSocket,
    state: Arc<AppState>,
    peer: SocketAddr,
    user_agent: String,
) {
    let (tx, mut rx) = mpsc::channel::<Bytes>(SESSION_QUEUE_CAPACITY);
    let id = state.sessions.connect(Arc::new(tx)).await;
    info!(session = %id, %peer, user_agent, "WebSocket connected");

    loop {
        tokio::select! {
            () = state.shutdown.cancelled() => {
                debug!(session = %id, "Closing WebSocket for shutdown");
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
            // Payload queued by the bootstrap or a broadcast.
            payload = rx.recv() => {
                let Some(payload) = payload else {
                    break;
                };
                if socket.send(into_message(payload)).await.is_err() {
                    debug!(session = %id, "WebSocket client disconnected (send failed)");
                    break;
                }
            }
            // Check if the client sent a close frame or disconnected.
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(session = %id, "WebSocket client closed");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            debug!(session = %id, "WebSocket client disconnected (pong failed)");
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        debug!(session = %id, error = %e, "WebSocket error");
                        break;
                    }
                    _ => {
                        // Push-only: client data frames are ignored.
                    }
                }
            }
        }
    }

    state.sessions.disconnect(id).await;
    info!(session = %id, %peer, "WebSocket disconnected");
}

/// Wrap a payload in a text frame, or a binary frame if it is not UTF-8.
///
/// Both frame kinds share the payload's buffer; nothing is copied.
fn into_message(payload: Bytes) -> Message {
    match Utf8Bytes::try_from(payload.clone()) {
        Ok(text) => Message::Text(text),
        Err(_) => Message::Binary(payload),
    }
}
