use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use crate::{Listeners, Transport};

/// One end of an in-process transport pair. Whatever one end sends is
/// delivered to the other end's subscribers.
pub struct LoopbackTransport {
    local: Arc<Listeners>,
    remote: Arc<Listeners>,
    connected: Arc<AtomicBool>,
}

impl LoopbackTransport {
    /// Two connected ends.
    pub fn pair() -> (Self, Self) {
        let a = Arc::new(Listeners::new());
        let b = Arc::new(Listeners::new());
        let connected = Arc::new(AtomicBool::new(true));
        (
            Self {
                local: a.clone(),
                remote: b.clone(),
                connected: connected.clone(),
            },
            Self {
                local: b,
                remote: a,
                connected,
            },
        )
    }

    /// An end with no peer at all; every send is dropped.
    pub fn detached() -> Self {
        let (end, _) = Self::pair();
        end.disconnect();
        end
    }

    /// Sever the pair for both ends.
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    pub fn reconnect(&self) {
        self.connected.store(true, Ordering::SeqCst);
    }
}

impl Transport for LoopbackTransport {
    fn send(&self, event: &str, payload: Value) -> bool {
        if !self.is_connected() {
            debug!(event, "Loopback peer disconnected, dropping message");
            return false;
        }
        self.remote.emit(event, payload);
        true
    }

    fn subscribe(&self, event: &str) -> mpsc::UnboundedReceiver<Value> {
        self.local.subscribe(event)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_pair_delivers_both_ways() {
        let (server, page) = LoopbackTransport::pair();
        let mut at_page = page.subscribe("mcp:tool-call");
        let mut at_server = server.subscribe("mcp:tool-result");

        assert!(server.send("mcp:tool-call", json!({"id": "1"})));
        assert!(page.send("mcp:tool-result", json!({"id": "1"})));

        assert_eq!(at_page.recv().await.unwrap()["id"], "1");
        assert_eq!(at_server.recv().await.unwrap()["id"], "1");
    }

    #[tokio::test]
    async fn test_disconnected_drops_without_buffering() {
        let (server, page) = LoopbackTransport::pair();
        let mut at_page = page.subscribe("x");
        server.disconnect();
        assert!(!server.send("x", json!(1)));
        assert!(!page.is_connected());

        server.reconnect();
        assert!(server.send("x", json!(2)));
        assert_eq!(at_page.recv().await, Some(json!(2)));
        assert!(at_page.try_recv().is_err());
    }

    #[test]
    fn test_detached_never_delivers() {
        let t = LoopbackTransport::detached();
        assert!(!t.is_connected());
        assert!(!t.send("x", json!(null)));
    }
}
