use std::collections::HashMap;
use std::time::Duration;

use pagebridge_core::{Error, ToolResult};
use tokio::sync::oneshot;
use tokio::time::Instant;

struct PendingCall {
    name: String,
    created_at: Instant,
    deadline: Option<Instant>,
    tx: oneshot::Sender<ToolResult>,
}

/// In-flight calls keyed by correlation id. Each entry may carry a deadline;
/// entries past it are removed by [`PendingTable::expire`].
#[derive(Default)]
pub struct PendingTable {
    calls: HashMap<String, PendingCall>,
}

/// Result handed to callers whose call outlived its deadline.
pub fn timeout_result(name: &str, waited: Duration) -> ToolResult {
    let err = Error::Timeout(format!(
        "no response from the page for '{}' after {}ms",
        name,
        waited.as_millis()
    ));
    ToolResult::error(err.to_string())
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a call and get the receiving half of its result.
    pub fn insert(
        &mut self,
        id: String,
        name: &str,
        deadline: Option<Instant>,
    ) -> oneshot::Receiver<ToolResult> {
        let (tx, rx) = oneshot::channel();
        self.calls.insert(
            id,
            PendingCall {
                name: name.to_string(),
                created_at: Instant::now(),
                deadline,
                tx,
            },
        );
        rx
    }

    /// Remove `id` and hand it `result`. Returns `false` for unknown ids.
    pub fn settle(&mut self, id: &str, result: ToolResult) -> bool {
        match self.calls.remove(id) {
            Some(call) => {
                // The caller may have gone away; the entry is gone either way.
                let _ = call.tx.send(result);
                true
            }
            None => false,
        }
    }

    /// Drop `id` without settling it.
    pub fn remove(&mut self, id: &str) -> bool {
        self.calls.remove(id).is_some()
    }

    /// Settle every entry whose deadline is at or before `now` with a timeout
    /// error. Returns the expired ids.
    pub fn expire(&mut self, now: Instant) -> Vec<String> {
        let expired: Vec<String> = self
            .calls
            .iter()
            .filter(|(_, call)| call.deadline.map(|d| d <= now).unwrap_or(false))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            if let Some(call) = self.calls.remove(id) {
                let waited = now.saturating_duration_since(call.created_at);
                let _ = call.tx.send(timeout_result(&call.name, waited));
            }
        }
        expired
    }

    pub fn contains(&self, id: &str) -> bool {
        self.calls.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        self.calls.keys().cloned().collect()
    }
}
