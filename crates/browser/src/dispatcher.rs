use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;

use pagebridge_channels::Transport;
use pagebridge_core::config::PageConfig;
use pagebridge_core::{events, CallEnvelope, Error, Result, ResultEnvelope, ToolResult};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::env::PageEnv;
use crate::handlers::{builtin_handlers, Handler};

/// Page-side registry of capability handlers.
///
/// One instance per page. Calls are routed by name; every outcome, including
/// an unknown name, comes back as a result envelope.
pub struct Dispatcher {
    env: Arc<dyn PageEnv>,
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl Dispatcher {
    pub fn new(env: Arc<dyn PageEnv>) -> Self {
        Self {
            env,
            handlers: HashMap::new(),
        }
    }

    /// Dispatcher serving the built-in catalogue against `env`.
    pub fn with_builtin_handlers(env: Arc<dyn PageEnv>, config: &PageConfig) -> Self {
        let mut dispatcher = Self::new(env.clone());
        for handler in builtin_handlers(env, config) {
            // Built-in names are distinct.
            let _ = dispatcher.register(handler);
        }
        dispatcher
    }

    /// The environment handlers are bound to.
    pub fn env(&self) -> Arc<dyn PageEnv> {
        self.env.clone()
    }

    pub fn register(&mut self, handler: Arc<dyn Handler>) -> Result<()> {
        let name = handler.name().to_string();
        if self.handlers.contains_key(&name) {
            warn!(name = %name, "Duplicate handler registration rejected");
            return Err(Error::Duplicate(name));
        }
        debug!(name = %name, "Registering handler");
        self.handlers.insert(name, handler);
        Ok(())
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Find the handler for `call`, or the error result to send back at once.
    fn route(&self, call: &CallEnvelope) -> std::result::Result<Arc<dyn Handler>, ToolResult> {
        if call.id.is_empty() {
            return Err(ToolResult::error("Missing call id"));
        }
        self.handlers
            .get(&call.name)
            .cloned()
            .ok_or_else(|| ToolResult::error(format!("Unknown adapter: {}", call.name)))
    }

    /// Handle one call to completion.
    pub async fn handle(&self, call: CallEnvelope) -> ResultEnvelope {
        match self.route(&call) {
            Ok(handler) => execute(handler, call).await,
            Err(result) => {
                debug!(id = %call.id, name = %call.name, "Call rejected");
                ResultEnvelope::new(call.id, result)
            }
        }
    }

    /// Serve calls arriving on `transport` until it stops delivering them.
    ///
    /// Announces readiness first. Each call runs on its own task, so results
    /// may go back in a different order than the calls came in.
    pub async fn run(self: Arc<Self>, transport: Arc<dyn Transport>) {
        let mut calls = transport.subscribe(events::TOOL_CALL);
        transport.send(events::BRIDGE_READY, Value::Null);
        info!(handlers = self.handlers.len(), "Page dispatcher ready");

        while let Some(payload) = calls.recv().await {
            let call: CallEnvelope = match serde_json::from_value(payload) {
                Ok(call) => call,
                Err(e) => {
                    warn!(error = %e, "Malformed tool call");
                    continue;
                }
            };
            debug!(id = %call.id, name = %call.name, "Call received");

            match self.route(&call) {
                Err(result) => {
                    debug!(id = %call.id, name = %call.name, "Call rejected");
                    emit(transport.as_ref(), ResultEnvelope::new(call.id, result));
                }
                Ok(handler) => {
                    let transport = transport.clone();
                    tokio::spawn(async move {
                        let envelope = execute(handler, call).await;
                        emit(transport.as_ref(), envelope);
                    });
                }
            }
        }
        debug!("Page dispatcher stopped");
    }
}

/// Run one handler. A panic inside it still answers the call.
async fn execute(handler: Arc<dyn Handler>, call: CallEnvelope) -> ResultEnvelope {
    debug!(id = %call.id, name = %call.name, "Executing");
    let outcome = AssertUnwindSafe(handler.execute(call.params))
        .catch_unwind()
        .await;
    let result = match outcome {
        Ok(Ok(value)) => {
            debug!(id = %call.id, name = %call.name, "Succeeded");
            ToolResult::json(&value)
        }
        Ok(Err(e)) => {
            debug!(id = %call.id, name = %call.name, error = %e, "Failed");
            ToolResult::error(e.to_string())
        }
        Err(_) => {
            error!(id = %call.id, name = %call.name, "Handler panicked");
            ToolResult::error(format!("Handler '{}' panicked", call.name))
        }
    };
    ResultEnvelope::new(call.id, result)
}

fn emit(transport: &dyn Transport, envelope: ResultEnvelope) {
    let id = envelope.id.clone();
    match serde_json::to_value(&envelope) {
        Ok(payload) => {
            if transport.send(events::TOOL_RESULT, payload) {
                debug!(id = %id, "Result emitted");
            } else {
                warn!(id = %id, "Server not connected, result dropped");
            }
        }
        Err(e) => warn!(id = %id, error = %e, "Failed to encode result"),
    }
}
