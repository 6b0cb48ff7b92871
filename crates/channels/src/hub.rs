//! Server end of the page channel.
//!
//! The page opens a websocket to the bridge path. The newest connection is
//! the active page; an older one is dropped when a new page connects, and the
//! hub reports disconnected once the active page goes away.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{Frame, Listeners, Transport};

struct Peer {
    id: u64,
    tx: mpsc::UnboundedSender<String>,
}

struct HubInner {
    listeners: Listeners,
    peer: Mutex<Option<Peer>>,
    next_peer_id: AtomicU64,
}

#[derive(Clone)]
pub struct HubTransport {
    inner: Arc<HubInner>,
}

impl Default for HubTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HubTransport {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HubInner {
                listeners: Listeners::new(),
                peer: Mutex::new(None),
                next_peer_id: AtomicU64::new(1),
            }),
        }
    }

    /// Router serving the page websocket at `path`.
    pub fn router(&self, path: &str) -> Router {
        Router::new()
            .route(path, get(handle_ws_upgrade))
            .with_state(self.clone())
    }

    /// Make `tx` the active page, replacing any previous one.
    fn attach(&self, tx: mpsc::UnboundedSender<String>) -> u64 {
        let id = self.inner.next_peer_id.fetch_add(1, Ordering::SeqCst);
        let mut peer = self.inner.peer.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(old) = peer.replace(Peer { id, tx }) {
            info!(old = old.id, new = id, "New page connected, replacing previous page");
        }
        id
    }

    fn detach(&self, id: u64) {
        let mut peer = self.inner.peer.lock().unwrap_or_else(|e| e.into_inner());
        if peer.as_ref().map(|p| p.id) == Some(id) {
            *peer = None;
        }
    }

    /// Deliver one text frame as if it came from the page.
    fn receive_text(&self, text: &str) {
        match Frame::decode(text) {
            Some(frame) => {
                debug!(event = %frame.event, "Page → server");
                self.inner.listeners.emit(&frame.event, frame.data);
            }
            None => debug!("Ignoring non-bridge frame from page"),
        }
    }

    /// Drive one page connection until it closes.
    pub async fn serve_socket(&self, socket: WebSocket) {
        let (mut ws_sender, mut ws_receiver) = socket.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let peer_id = self.attach(tx);
        info!(peer = peer_id, "Page connected");

        // Writer task: ends when the hub drops this peer's sender.
        let send_task = tokio::spawn(async move {
            while let Some(text) = rx.recv().await {
                if ws_sender.send(WsMessage::Text(text)).await.is_err() {
                    break;
                }
            }
            let _ = ws_sender.close().await;
        });

        while let Some(msg) = ws_receiver.next().await {
            let msg = match msg {
                Ok(m) => m,
                Err(e) => {
                    warn!(peer = peer_id, error = %e, "Page websocket receive error");
                    break;
                }
            };
            match msg {
                WsMessage::Text(text) => self.receive_text(&text),
                WsMessage::Close(_) => break,
                _ => {}
            }
        }

        self.detach(peer_id);
        send_task.abort();
        info!(peer = peer_id, "Page disconnected");
    }
}

impl Transport for HubTransport {
    fn send(&self, event: &str, payload: Value) -> bool {
        let peer = self.inner.peer.lock().unwrap_or_else(|e| e.into_inner());
        match peer.as_ref() {
            Some(p) => {
                debug!(peer = p.id, event, "Server → page");
                p.tx.send(Frame::custom(event, payload).encode()).is_ok()
            }
            None => {
                debug!(event, "No page connected, dropping message");
                false
            }
        }
    }

    fn subscribe(&self, event: &str) -> mpsc::UnboundedReceiver<Value> {
        self.inner.listeners.subscribe(event)
    }

    fn is_connected(&self) -> bool {
        let peer = self.inner.peer.lock().unwrap_or_else(|e| e.into_inner());
        peer.as_ref().map(|p| !p.tx.is_closed()).unwrap_or(false)
    }
}

async fn handle_ws_upgrade(
    ws: WebSocketUpgrade,
    State(hub): State<HubTransport>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move { hub.serve_socket(socket).await })
}
