//! In-memory page environment.
//!
//! Backs every subsystem with plain Rust state so the bridge can be driven
//! without a browser: by tests, and by the headless `pagebridge page` peer.

pub mod cache;
pub mod document;
pub mod indexed_db;
pub mod performance;
pub mod storage;

use std::collections::HashSet;
use std::sync::Arc;

use pagebridge_core::config::PageConfig;
use pagebridge_core::{Error, Result};
use url::Url;

use crate::console::{ConsoleSink, DEFAULT_CONSOLE_CAPACITY};
use crate::env::{CacheStorage, Document, IdbFactory, PageEnv, PerformanceHost, WebStorage};

pub use cache::{MemoryCache, MemoryCacheStorage};
pub use document::MemoryDocument;
pub use indexed_db::{MemoryIdb, StoreOptions};
pub use performance::MemoryPerformance;
pub use storage::{MemoryStorage, DEFAULT_STORAGE_QUOTA};

pub const DEFAULT_ORIGIN: &str = "http://localhost:5173/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subsystem {
    Console,
    Document,
    LocalStorage,
    SessionStorage,
    Caches,
    IndexedDb,
    Performance,
}

pub struct MemoryPage {
    origin: Url,
    console: Option<Arc<ConsoleSink>>,
    document: Option<MemoryDocument>,
    local_storage: Option<MemoryStorage>,
    session_storage: Option<MemoryStorage>,
    caches: Option<MemoryCacheStorage>,
    indexed_db: Option<MemoryIdb>,
    performance: Option<MemoryPerformance>,
}

impl MemoryPage {
    /// A page with every subsystem present and default limits.
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    pub fn builder() -> MemoryPageBuilder {
        MemoryPageBuilder::default()
    }

    pub fn from_config(config: &PageConfig) -> Result<Self> {
        Self::builder()
            .console_capacity(config.console_capacity)
            .storage_quota(config.storage_quota_bytes)
            .build()
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// Shared handle to the console sink, for host code that writes to it.
    pub fn console_sink(&self) -> Option<Arc<ConsoleSink>> {
        self.console.clone()
    }

    pub fn memory_idb(&self) -> Option<&MemoryIdb> {
        self.indexed_db.as_ref()
    }

    pub fn memory_performance(&self) -> Option<&MemoryPerformance> {
        self.performance.as_ref()
    }
}

impl PageEnv for MemoryPage {
    fn console(&self) -> Option<&ConsoleSink> {
        self.console.as_deref()
    }

    fn document(&self) -> Option<&dyn Document> {
        self.document.as_ref().map(|d| d as &dyn Document)
    }

    fn local_storage(&self) -> Option<&dyn WebStorage> {
        self.local_storage.as_ref().map(|s| s as &dyn WebStorage)
    }

    fn session_storage(&self) -> Option<&dyn WebStorage> {
        self.session_storage.as_ref().map(|s| s as &dyn WebStorage)
    }

    fn caches(&self) -> Option<&dyn CacheStorage> {
        self.caches.as_ref().map(|c| c as &dyn CacheStorage)
    }

    fn indexed_db(&self) -> Option<&dyn IdbFactory> {
        self.indexed_db.as_ref().map(|i| i as &dyn IdbFactory)
    }

    fn performance(&self) -> Option<&dyn PerformanceHost> {
        self.performance.as_ref().map(|p| p as &dyn PerformanceHost)
    }
}

pub struct MemoryPageBuilder {
    origin: String,
    console_capacity: usize,
    storage_quota: usize,
    without: HashSet<Subsystem>,
}

impl Default for MemoryPageBuilder {
    fn default() -> Self {
        Self {
            origin: DEFAULT_ORIGIN.to_string(),
            console_capacity: DEFAULT_CONSOLE_CAPACITY,
            storage_quota: DEFAULT_STORAGE_QUOTA,
            without: HashSet::new(),
        }
    }
}

impl MemoryPageBuilder {
    pub fn origin(mut self, origin: &str) -> Self {
        self.origin = origin.to_string();
        self
    }

    pub fn console_capacity(mut self, capacity: usize) -> Self {
        self.console_capacity = capacity;
        self
    }

    /// Quota per storage area, in bytes.
    pub fn storage_quota(mut self, bytes: usize) -> Self {
        self.storage_quota = bytes;
        self
    }

    /// Leave `subsystem` out of the page.
    pub fn without(mut self, subsystem: Subsystem) -> Self {
        self.without.insert(subsystem);
        self
    }

    pub fn build(self) -> Result<MemoryPage> {
        let origin = Url::parse(&self.origin)
            .map_err(|e| Error::Config(format!("Invalid page origin {}: {}", self.origin, e)))?;
        let has = |s: Subsystem| !self.without.contains(&s);
        let location = origin.path().to_string();

        Ok(MemoryPage {
            console: has(Subsystem::Console).then(|| Arc::new(ConsoleSink::new(self.console_capacity))),
            document: has(Subsystem::Document).then(|| MemoryDocument::new(&location)),
            local_storage: has(Subsystem::LocalStorage).then(|| MemoryStorage::new(self.storage_quota)),
            session_storage: has(Subsystem::SessionStorage)
                .then(|| MemoryStorage::new(self.storage_quota)),
            caches: has(Subsystem::Caches).then(|| MemoryCacheStorage::new(origin.clone())),
            indexed_db: has(Subsystem::IndexedDb).then(MemoryIdb::new),
            performance: has(Subsystem::Performance).then(MemoryPerformance::new),
            origin,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_page_has_everything() {
        let page = MemoryPage::new().unwrap();
        assert_eq!(page.origin().as_str(), DEFAULT_ORIGIN);
        assert!(page.console().is_some());
        assert!(page.document().is_some());
        assert!(page.local_storage().is_some());
        assert!(page.session_storage().is_some());
        assert!(page.caches().is_some());
        assert!(page.indexed_db().is_some());
        assert!(page.performance().is_some());
    }

    #[test]
    fn test_builder_leaves_out_subsystems() {
        let page = MemoryPage::builder()
            .without(Subsystem::Caches)
            .without(Subsystem::Document)
            .build()
            .unwrap();
        assert!(page.caches().is_none());
        assert!(page.document().is_none());
        assert!(page.local_storage().is_some());
    }

    #[test]
    fn test_storage_areas_are_separate() {
        let page = MemoryPage::new().unwrap();
        page.local_storage().unwrap().set_item("k", "local").unwrap();
        assert_eq!(page.session_storage().unwrap().get_item("k"), None);
    }

    #[test]
    fn test_bad_origin() {
        assert!(MemoryPage::builder().origin("not a url").build().is_err());
    }

    #[test]
    fn test_from_config() {
        let config = PageConfig {
            console_capacity: 2,
            ..PageConfig::default()
        };
        let page = MemoryPage::from_config(&config).unwrap();
        assert_eq!(page.console().unwrap().capacity(), 2);
    }
}
