//! Event transport between the server and the page.
//!
//! A transport offers two primitives: `send(event, payload)`, fire-and-forget
//! with no acknowledgement, and `subscribe(event)`, which yields every payload
//! received under that event name in arrival order. Nothing is buffered for a
//! peer that is not connected.
//!
//! ```text
//! Transport (trait)
//!     ├── LoopbackTransport   in-process pair
//!     ├── HubTransport        server end, axum websocket, single active page
//!     └── WsClientTransport   page end, tokio-tungstenite client
//! ```

pub mod hub;
pub mod loopback;
pub mod ws_client;

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

pub use hub::HubTransport;
pub use loopback::LoopbackTransport;
pub use ws_client::WsClientTransport;

pub trait Transport: Send + Sync {
    /// Send `payload` under `event`. Returns `false` when there is no live
    /// peer and the message was dropped.
    fn send(&self, event: &str, payload: Value) -> bool;

    /// Receive every payload arriving under `event`, in arrival order.
    fn subscribe(&self, event: &str) -> mpsc::UnboundedReceiver<Value>;

    fn is_connected(&self) -> bool;
}

/// One websocket text frame, in the live-reload custom-event shape:
/// `{"type":"custom","event":"mcp:tool-call","data":{...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl Frame {
    pub const CUSTOM: &'static str = "custom";

    pub fn custom(event: &str, data: Value) -> Self {
        Self {
            kind: Self::CUSTOM.to_string(),
            event: event.to_string(),
            data,
        }
    }

    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Decode a custom-event frame. Other frame kinds (pings, reload
    /// notices) and malformed text yield `None`.
    pub fn decode(text: &str) -> Option<Self> {
        let frame: Frame = serde_json::from_str(text).ok()?;
        if frame.kind == Self::CUSTOM && !frame.event.is_empty() {
            Some(frame)
        } else {
            None
        }
    }
}

/// Subscribers per event name. Closed receivers are pruned on emit.
#[derive(Default)]
pub struct Listeners {
    map: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<Value>>>>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, event: &str) -> mpsc::UnboundedReceiver<Value> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut map = self.map.lock().unwrap_or_else(|e| e.into_inner());
        map.entry(event.to_string()).or_default().push(tx);
        rx
    }

    /// Deliver `payload` to every live subscriber of `event`. Returns the
    /// number of subscribers reached.
    pub fn emit(&self, event: &str, payload: Value) -> usize {
        let mut map = self.map.lock().unwrap_or_else(|e| e.into_inner());
        let Some(senders) = map.get_mut(event) else {
            debug!(event, "No listeners for event");
            return 0;
        };
        senders.retain(|tx| tx.send(payload.clone()).is_ok());
        senders.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_frame_roundtrip_shape() {
        let frame = Frame::custom("mcp:tool-call", json!({"id": "1", "name": "cookie", "params": {}}));
        let text = frame.encode();
        let v: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(v["type"], "custom");
        assert_eq!(v["event"], "mcp:tool-call");
        assert_eq!(Frame::decode(&text), Some(frame));
    }

    #[test]
    fn test_decode_ignores_other_frames() {
        assert!(Frame::decode(r#"{"type":"ping"}"#).is_none());
        assert!(Frame::decode(r#"{"type":"full-reload","path":"*"}"#).is_none());
        assert!(Frame::decode("not json").is_none());
    }

    #[tokio::test]
    async fn test_listeners_fifo_per_event() {
        let listeners = Listeners::new();
        let mut rx = listeners.subscribe("a");
        listeners.emit("a", json!(1));
        listeners.emit("b", json!(99));
        listeners.emit("a", json!(2));
        assert_eq!(rx.recv().await, Some(json!(1)));
        assert_eq!(rx.recv().await, Some(json!(2)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_listeners_prune_dropped_receivers() {
        let listeners = Listeners::new();
        let rx = listeners.subscribe("a");
        let _keep = listeners.subscribe("a");
        drop(rx);
        assert_eq!(listeners.emit("a", json!(null)), 1);
    }
}
