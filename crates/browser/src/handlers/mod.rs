//! One handler per capability.
//!
//! Handlers parse their parameters with the shared types from
//! `pagebridge-tools`, look up the subsystem they need on the page
//! environment and return a JSON value. Errors are turned into error results
//! by the dispatcher.

pub mod cache;
pub mod console;
pub mod cookie;
pub mod indexed_db;
pub mod performance;
pub mod storage;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pagebridge_core::config::PageConfig;
use pagebridge_core::Result;
use serde_json::Value;

use crate::env::PageEnv;

pub use cache::CacheHandler;
pub use console::ConsoleHandler;
pub use cookie::CookieHandler;
pub use indexed_db::IndexedDbHandler;
pub use performance::PerformanceHandler;
pub use storage::{StorageArea, StorageHandler};

#[async_trait]
pub trait Handler: Send + Sync {
    /// Capability name this handler answers to.
    fn name(&self) -> &str;

    async fn execute(&self, params: Value) -> Result<Value>;
}

/// Handlers for the whole built-in catalogue, bound to `env`.
pub fn builtin_handlers(env: Arc<dyn PageEnv>, config: &PageConfig) -> Vec<Arc<dyn Handler>> {
    vec![
        Arc::new(ConsoleHandler::new(env.clone())),
        Arc::new(CookieHandler::new(env.clone())),
        Arc::new(StorageHandler::new(env.clone(), StorageArea::Local)),
        Arc::new(StorageHandler::new(env.clone(), StorageArea::Session)),
        Arc::new(CacheHandler::new(env.clone())),
        Arc::new(IndexedDbHandler::new(env.clone())),
        Arc::new(PerformanceHandler::new(env).with_vitals_timeout(Duration::from_millis(
            config.vitals_timeout_ms,
        ))),
    ]
}
