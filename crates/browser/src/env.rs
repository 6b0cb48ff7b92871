//! The browser subsystems handlers operate on.
//!
//! A page environment exposes each subsystem as an `Option`: a handler asks
//! for the one it needs and reports it unavailable when it is missing, which
//! is how a call that lands outside a real page fails.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use pagebridge_core::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::console::ConsoleSink;

/// `document.cookie` semantics: reading yields `"a=1; b=2"`, writing takes
/// one `Set-Cookie`-style string.
pub trait Document: Send + Sync {
    fn cookie(&self) -> String;
    fn set_cookie(&self, cookie: &str) -> Result<()>;
}

/// The Web Storage API (`localStorage`, `sessionStorage`).
pub trait WebStorage: Send + Sync {
    fn length(&self) -> usize;
    fn key(&self, index: usize) -> Option<String>;
    fn get_item(&self, key: &str) -> Option<String>;
    /// Fails with `QuotaExceededError` when the area would outgrow its quota.
    fn set_item(&self, key: &str, value: &str) -> Result<()>;
    fn remove_item(&self, key: &str);
    fn clear(&self);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRequest {
    pub url: String,
    pub method: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

/// `window.caches`.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    async fn keys(&self) -> Result<Vec<String>>;
    /// Open `name`, creating it when it does not exist.
    async fn open(&self, name: &str) -> Result<Arc<dyn Cache>>;
    async fn has(&self, name: &str) -> Result<bool>;
    async fn delete(&self, name: &str) -> Result<bool>;
}

/// One named cache.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn keys(&self) -> Result<Vec<CacheRequest>>;
    async fn match_request(&self, url: &str) -> Result<Option<CachedResponse>>;
    async fn put(&self, url: &str, response: CachedResponse) -> Result<()>;
    async fn delete(&self, url: &str) -> Result<bool>;
}

/// An IndexedDB key. Only numbers and strings are supported; numbers sort
/// before strings.
#[derive(Debug, Clone)]
pub enum IdbKey {
    Number(f64),
    String(String),
}

impl IdbKey {
    pub fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::String(s) => Ok(IdbKey::String(s.clone())),
            Value::Number(n) => {
                let n = n
                    .as_f64()
                    .ok_or_else(|| Error::Browser(format!("DataError: invalid key {}", n)))?;
                // -0 and 0 are the same key.
                Ok(IdbKey::Number(if n == 0.0 { 0.0 } else { n }))
            }
            other => Err(Error::Browser(format!(
                "DataError: {} is not a valid key",
                other
            ))),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            IdbKey::Number(n) if n.fract() == 0.0 && n.abs() < 9.0e15 => Value::from(*n as i64),
            IdbKey::Number(n) => Value::from(*n),
            IdbKey::String(s) => Value::String(s.clone()),
        }
    }
}

impl Ord for IdbKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (IdbKey::Number(a), IdbKey::Number(b)) => a.total_cmp(b),
            (IdbKey::Number(_), IdbKey::String(_)) => Ordering::Less,
            (IdbKey::String(_), IdbKey::Number(_)) => Ordering::Greater,
            (IdbKey::String(a), IdbKey::String(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for IdbKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for IdbKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for IdbKey {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSummary {
    pub name: String,
    pub version: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectStoreInfo {
    pub name: String,
    pub key_path: Option<String>,
    pub auto_increment: bool,
    pub index_names: Vec<String>,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseInfo {
    pub name: String,
    pub version: u64,
    pub object_stores: Vec<ObjectStoreInfo>,
}

/// `window.indexedDB`, flattened to the operations the bridge performs.
/// Each call runs as its own transaction. A missing database or object store
/// fails with `NotFoundError`.
#[async_trait]
pub trait IdbFactory: Send + Sync {
    async fn databases(&self) -> Result<Vec<DatabaseSummary>>;
    async fn info(&self, database: &str) -> Result<DatabaseInfo>;
    async fn get_keys(&self, database: &str, store: &str, limit: Option<usize>) -> Result<Vec<IdbKey>>;
    async fn get(&self, database: &str, store: &str, key: &IdbKey) -> Result<Option<Value>>;
    /// Store `value`, returning the key it was stored under. `key` is only
    /// given for stores with out-of-line keys.
    async fn put(&self, database: &str, store: &str, key: Option<IdbKey>, value: Value) -> Result<IdbKey>;
    async fn delete(&self, database: &str, store: &str, key: &IdbKey) -> Result<()>;
    /// Remove every record, returning how many there were.
    async fn clear(&self, database: &str, store: &str) -> Result<usize>;
    async fn delete_database(&self, database: &str) -> Result<()>;
}

/// A `PerformanceEntry`. Type-specific attributes (`transferSize`,
/// `value`, `processingStart`, ...) live in `detail`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceEntry {
    pub name: String,
    pub entry_type: String,
    pub start_time: f64,
    pub duration: f64,
    #[serde(flatten)]
    pub detail: Map<String, Value>,
}

impl PerformanceEntry {
    pub fn new(name: &str, entry_type: &str, start_time: f64, duration: f64) -> Self {
        Self {
            name: name.to_string(),
            entry_type: entry_type.to_string(),
            start_time,
            duration,
            detail: Map::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.detail.insert(key.to_string(), value.into());
        self
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        self.detail.get(key).and_then(Value::as_f64)
    }

    pub fn flag(&self, key: &str) -> bool {
        self.detail.get(key).and_then(Value::as_bool).unwrap_or(false)
    }
}

/// The `navigation` entry, times in milliseconds from time origin.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationTiming {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub start_time: f64,
    pub domain_lookup_start: f64,
    pub domain_lookup_end: f64,
    pub connect_start: f64,
    pub connect_end: f64,
    pub request_start: f64,
    pub response_start: f64,
    pub response_end: f64,
    pub dom_interactive: f64,
    pub dom_content_loaded_event_end: f64,
    pub load_event_end: f64,
    pub transfer_size: u64,
}

/// `window.performance` plus `PerformanceObserver`.
pub trait PerformanceHost: Send + Sync {
    /// Milliseconds since time origin.
    fn now(&self) -> f64;
    fn navigation(&self) -> Option<NavigationTiming>;
    fn entries(&self) -> Vec<PerformanceEntry>;

    fn entries_by_type(&self, entry_type: &str) -> Vec<PerformanceEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.entry_type == entry_type)
            .collect()
    }

    /// Buffered observer: yields entries already recorded for `entry_type`,
    /// then new ones as they arrive. The stream ends when the host knows no
    /// more entries of that type will come.
    fn observe(&self, entry_type: &str) -> mpsc::UnboundedReceiver<PerformanceEntry>;
}

/// The browser globals a page exposes to handlers. Every subsystem defaults to
/// absent.
pub trait PageEnv: Send + Sync {
    fn console(&self) -> Option<&ConsoleSink> {
        None
    }

    fn document(&self) -> Option<&dyn Document> {
        None
    }

    fn local_storage(&self) -> Option<&dyn WebStorage> {
        None
    }

    fn session_storage(&self) -> Option<&dyn WebStorage> {
        None
    }

    fn caches(&self) -> Option<&dyn CacheStorage> {
        None
    }

    fn indexed_db(&self) -> Option<&dyn IdbFactory> {
        None
    }

    fn performance(&self) -> Option<&dyn PerformanceHost> {
        None
    }
}

/// An environment with no browser state at all, such as a server-side render.
#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedEnv;

impl PageEnv for DetachedEnv {}

/// Unwrap a subsystem or report it unavailable.
pub fn subsystem<'a, T: ?Sized>(found: Option<&'a T>, name: &str) -> Result<&'a T> {
    found.ok_or_else(|| Error::Unavailable(format!("{} is not available in this environment", name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_idb_key_order_numbers_first() {
        let mut keys = vec![
            IdbKey::String("b".to_string()),
            IdbKey::Number(10.0),
            IdbKey::String("a".to_string()),
            IdbKey::Number(-1.5),
        ];
        keys.sort();
        let json: Vec<Value> = keys.iter().map(IdbKey::to_json).collect();
        assert_eq!(json, vec![json!(-1.5), json!(10), json!("a"), json!("b")]);
    }

    #[test]
    fn test_idb_key_from_json() {
        assert_eq!(IdbKey::from_json(&json!(3)).unwrap(), IdbKey::Number(3.0));
        assert_eq!(IdbKey::from_json(&json!(-0.0)).unwrap(), IdbKey::Number(0.0));
        assert!(IdbKey::from_json(&json!(true)).is_err());
        assert!(IdbKey::from_json(&json!([1])).is_err());
    }

    #[test]
    fn test_detached_env_has_nothing() {
        let env = DetachedEnv;
        let err = subsystem(env.document(), "document").err().unwrap();
        assert_eq!(err.to_string(), "document is not available in this environment");
        assert!(env.caches().is_none());
        assert!(env.console().is_none());
    }

    #[test]
    fn test_performance_entry_flattens_detail() {
        let entry = PerformanceEntry::new("/app.js", "resource", 12.0, 30.5)
            .with("initiatorType", "script")
            .with("transferSize", 2048);
        let v = serde_json::to_value(&entry).unwrap();
        assert_eq!(v["entryType"], "resource");
        assert_eq!(v["initiatorType"], "script");
        assert_eq!(entry.number("transferSize"), Some(2048.0));
        assert!(!entry.flag("hadRecentInput"));
    }
}
