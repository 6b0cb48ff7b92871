use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pagebridge_core::{Error, Result};
use url::Url;

use crate::env::{Cache, CacheRequest, CacheStorage, CachedResponse};

/// Request URLs are resolved against the page origin, as `fetch` would.
fn resolve(origin: &Url, url: &str) -> Result<String> {
    let resolved = origin
        .join(url)
        .map_err(|e| Error::Browser(format!("TypeError: Invalid URL '{}': {}", url, e)))?;
    match resolved.scheme() {
        "http" | "https" => Ok(resolved.to_string()),
        scheme => Err(Error::Browser(format!(
            "TypeError: Request scheme '{}' is unsupported",
            scheme
        ))),
    }
}

pub struct MemoryCache {
    origin: Url,
    entries: Mutex<Vec<(CacheRequest, CachedResponse)>>,
}

impl MemoryCache {
    fn new(origin: Url) -> Self {
        Self {
            origin,
            entries: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn keys(&self) -> Result<Vec<CacheRequest>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.iter().map(|(req, _)| req.clone()).collect())
    }

    async fn match_request(&self, url: &str) -> Result<Option<CachedResponse>> {
        let url = resolve(&self.origin, url)?;
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries
            .iter()
            .find(|(req, _)| req.url == url)
            .map(|(_, resp)| resp.clone()))
    }

    async fn put(&self, url: &str, response: CachedResponse) -> Result<()> {
        let url = resolve(&self.origin, url)?;
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.iter_mut().find(|(req, _)| req.url == url) {
            Some(entry) => entry.1 = response,
            None => entries.push((
                CacheRequest {
                    url,
                    method: "GET".to_string(),
                },
                response,
            )),
        }
        Ok(())
    }

    async fn delete(&self, url: &str) -> Result<bool> {
        let url = resolve(&self.origin, url)?;
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|(req, _)| req.url != url);
        Ok(entries.len() != before)
    }
}

/// `CacheStorage` keeping caches in creation order.
pub struct MemoryCacheStorage {
    origin: Url,
    caches: Mutex<Vec<(String, Arc<MemoryCache>)>>,
}

impl MemoryCacheStorage {
    pub fn new(origin: Url) -> Self {
        Self {
            origin,
            caches: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn keys(&self) -> Result<Vec<String>> {
        let caches = self.caches.lock().unwrap_or_else(|e| e.into_inner());
        Ok(caches.iter().map(|(name, _)| name.clone()).collect())
    }

    async fn open(&self, name: &str) -> Result<Arc<dyn Cache>> {
        let mut caches = self.caches.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((_, cache)) = caches.iter().find(|(n, _)| n == name) {
            return Ok(cache.clone());
        }
        let cache = Arc::new(MemoryCache::new(self.origin.clone()));
        caches.push((name.to_string(), cache.clone()));
        Ok(cache)
    }

    async fn has(&self, name: &str) -> Result<bool> {
        let caches = self.caches.lock().unwrap_or_else(|e| e.into_inner());
        Ok(caches.iter().any(|(n, _)| n == name))
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let mut caches = self.caches.lock().unwrap_or_else(|e| e.into_inner());
        let before = caches.len();
        caches.retain(|(n, _)| n != name);
        Ok(caches.len() != before)
    }
}
