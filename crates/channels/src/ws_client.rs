//! Page end of the channel over a websocket client connection.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use pagebridge_core::{Error, Result};
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::{Frame, Listeners, Transport};

pub struct WsClientTransport {
    /// Sender to write frames to the websocket.
    ws_tx: mpsc::UnboundedSender<String>,
    listeners: Arc<Listeners>,
    connected: watch::Receiver<bool>,
    _reader_handle: tokio::task::JoinHandle<()>,
    _writer_handle: tokio::task::JoinHandle<()>,
}

impl WsClientTransport {
    /// Connect to the server's bridge websocket, e.g. `ws://127.0.0.1:5199/__mcp/ws`.
    pub async fn connect(ws_url: &str) -> Result<Self> {
        let parsed = url::Url::parse(ws_url)
            .map_err(|e| Error::Transport(format!("Invalid bridge URL {}: {}", ws_url, e)))?;
        if parsed.scheme() != "ws" && parsed.scheme() != "wss" {
            return Err(Error::Transport(format!(
                "Bridge URL must use ws:// or wss://, got {}",
                ws_url
            )));
        }

        let (ws_stream, _) = connect_async(parsed.as_str())
            .await
            .map_err(|e| Error::Transport(format!("Failed to connect to {}: {}", ws_url, e)))?;
        info!(url = %ws_url, "Connected to bridge");

        let (mut ws_sink, mut ws_read) = ws_stream.split();
        let (ws_tx, mut ws_rx) = mpsc::unbounded_channel::<String>();
        let (state_tx, state_rx) = watch::channel(true);
        let state_tx = Arc::new(state_tx);

        let listeners = Arc::new(Listeners::new());
        let listeners_clone = listeners.clone();

        // Writer task: owns the sink, forwards frames from the channel
        let writer_state = state_tx.clone();
        let writer_handle = tokio::spawn(async move {
            while let Some(text) = ws_rx.recv().await {
                if let Err(e) = ws_sink.send(Message::Text(text)).await {
                    error!("Bridge websocket write error: {}", e);
                    break;
                }
            }
            let _ = writer_state.send(false);
        });

        // Reader task: decodes frames and fans them out to subscribers
        let reader_handle = tokio::spawn(async move {
            while let Some(msg) = ws_read.next().await {
                match msg {
                    Ok(Message::Text(text)) => match Frame::decode(&text) {
                        Some(frame) => {
                            listeners_clone.emit(&frame.event, frame.data);
                        }
                        None => debug!("Ignoring non-bridge frame"),
                    },
                    Ok(Message::Close(_)) => {
                        debug!("Bridge websocket closed by server");
                        break;
                    }
                    Err(e) => {
                        warn!("Bridge websocket read error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }
            let _ = state_tx.send(false);
        });

        Ok(Self {
            ws_tx,
            listeners,
            connected: state_rx,
            _reader_handle: reader_handle,
            _writer_handle: writer_handle,
        })
    }

    /// Resolve once the connection is gone.
    pub async fn closed(&self) {
        let mut rx = self.connected.clone();
        while *rx.borrow() {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }
}

impl Transport for WsClientTransport {
    fn send(&self, event: &str, payload: Value) -> bool {
        if !self.is_connected() {
            return false;
        }
        self.ws_tx.send(Frame::custom(event, payload).encode()).is_ok()
    }

    fn subscribe(&self, event: &str) -> mpsc::UnboundedReceiver<Value> {
        self.listeners.subscribe(event)
    }

    fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }
}

impl Drop for WsClientTransport {
    fn drop(&mut self) {
        self._reader_handle.abort();
        self._writer_handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HubTransport;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn test_rejects_non_ws_url() {
        let err = WsClientTransport::connect("http://127.0.0.1:1/__mcp/ws").await.err().unwrap();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[tokio::test]
    async fn test_client_talks_to_hub() {
        let hub = HubTransport::new();
        let app = hub.router("/__mcp/ws");
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        let client = WsClientTransport::connect(&format!("ws://{}/__mcp/ws", addr))
            .await
            .unwrap();
        let mut calls = client.subscribe("mcp:tool-call");
        let mut results = hub.subscribe("mcp:tool-result");

        // Wait for the hub to register the page.
        for _ in 0..100 {
            if hub.is_connected() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(hub.is_connected());

        assert!(hub.send("mcp:tool-call", json!({"id": "1", "name": "cookie"})));
        let call = tokio::time::timeout(Duration::from_secs(5), calls.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(call["name"], "cookie");

        assert!(client.send("mcp:tool-result", json!({"id": "1"})));
        let result = tokio::time::timeout(Duration::from_secs(5), results.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result["id"], "1");
    }
}
