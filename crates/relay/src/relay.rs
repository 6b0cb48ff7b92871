use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use pagebridge_channels::Transport;
use pagebridge_core::config::RelayConfig;
use pagebridge_core::{events, CallEnvelope, ResultEnvelope, ToolResult};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::id::next_call_id;
use crate::pending::{timeout_result, PendingTable};

#[derive(Debug, Clone, Default)]
pub struct RelayOptions {
    /// `None` keeps a call pending until the page answers, however long.
    pub call_timeout: Option<Duration>,
}

impl From<&RelayConfig> for RelayOptions {
    fn from(config: &RelayConfig) -> Self {
        Self {
            call_timeout: config.call_timeout(),
        }
    }
}

struct RelayInner {
    transport: Arc<dyn Transport>,
    pending: Mutex<PendingTable>,
    options: RelayOptions,
    page_ready: AtomicBool,
}

impl RelayInner {
    fn table(&self) -> MutexGuard<'_, PendingTable> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Removes a call from the table if its dispatch future is dropped before
/// the call settles.
struct PendingGuard<'a> {
    inner: &'a RelayInner,
    id: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.inner.table().remove(self.id) {
            debug!(id = %self.id, "Call abandoned by caller");
        }
    }
}

/// Forwards calls to the page and settles them when results come back.
#[derive(Clone)]
pub struct Relay {
    inner: Arc<RelayInner>,
}

impl Relay {
    pub fn new(transport: Arc<dyn Transport>, options: RelayOptions) -> Self {
        Self {
            inner: Arc::new(RelayInner {
                transport,
                pending: Mutex::new(PendingTable::new()),
                options,
                page_ready: AtomicBool::new(false),
            }),
        }
    }

    pub fn options(&self) -> &RelayOptions {
        &self.inner.options
    }

    /// Listen for results and readiness signals from the page.
    pub fn start(&self) -> JoinHandle<()> {
        let mut results = self.inner.transport.subscribe(events::TOOL_RESULT);
        let mut ready = self.inner.transport.subscribe(events::BRIDGE_READY);
        let relay = self.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(payload) = results.recv() => relay.on_result_payload(payload),
                    Some(_) = ready.recv() => {
                        relay.inner.page_ready.store(true, Ordering::SeqCst);
                        info!("Page bridge ready");
                    }
                    else => break,
                }
            }
            debug!("Relay listener stopped");
        })
    }

    /// Periodically expire calls past their deadline.
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let relay = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                relay.sweep_expired();
            }
        })
    }

    /// Settle calls whose deadline has passed with a timeout error.
    pub fn sweep_expired(&self) -> usize {
        let expired = self.inner.table().expire(Instant::now());
        for id in &expired {
            warn!(id = %id, "Call expired without a response from the page");
        }
        expired.len()
    }

    fn on_result_payload(&self, payload: Value) {
        match serde_json::from_value::<ResultEnvelope>(payload) {
            Ok(envelope) => {
                self.resolve(envelope);
            }
            Err(e) => warn!(error = %e, "Malformed tool result from page"),
        }
    }

    /// Settle the call `envelope.id` refers to. Unknown ids (late duplicates,
    /// already expired calls) are discarded.
    pub fn resolve(&self, envelope: ResultEnvelope) -> bool {
        let settled = self.inner.table().settle(&envelope.id, envelope.result);
        if settled {
            debug!(id = %envelope.id, "Call settled");
        } else {
            debug!(id = %envelope.id, "Discarding result for unknown call");
        }
        settled
    }

    /// Send one call to the page and wait for its result.
    ///
    /// Never fails: every failure is an error result. Without a configured
    /// timeout a call the page never answers stays pending.
    pub async fn dispatch(&self, name: &str, params: Value) -> ToolResult {
        self.sweep_expired();

        let id = next_call_id();
        let timeout = self.inner.options.call_timeout;
        let deadline = timeout.map(|t| Instant::now() + t);
        let rx = self.inner.table().insert(id.clone(), name, deadline);
        let _guard = PendingGuard {
            inner: &self.inner,
            id: &id,
        };

        let envelope = CallEnvelope::new(id.as_str(), name, params);
        let payload = serde_json::to_value(&envelope).unwrap_or(Value::Null);
        if self.inner.transport.send(events::TOOL_CALL, payload) {
            debug!(id = %id, name, "Call sent to page");
        } else {
            warn!(id = %id, name, "No page connected; call stays pending");
        }

        match (deadline, timeout) {
            (Some(deadline), Some(timeout)) => {
                match tokio::time::timeout_at(deadline, rx).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(_)) => ToolResult::error("Relay dropped the call before the page answered"),
                    Err(_) => {
                        self.inner.table().remove(&id);
                        warn!(id = %id, name, "Call timed out");
                        timeout_result(name, timeout)
                    }
                }
            }
            _ => rx
                .await
                .unwrap_or_else(|_| ToolResult::error("Relay dropped the call before the page answered")),
        }
    }

    pub fn pending_count(&self) -> usize {
        self.inner.table().len()
    }

    pub fn pending_ids(&self) -> Vec<String> {
        self.inner.table().ids()
    }

    pub fn is_page_connected(&self) -> bool {
        self.inner.transport.is_connected()
    }

    /// Whether the page has announced its dispatcher since start.
    pub fn is_page_ready(&self) -> bool {
        self.inner.page_ready.load(Ordering::SeqCst)
    }
}
