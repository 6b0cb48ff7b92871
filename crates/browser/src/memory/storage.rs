use std::sync::Mutex;

use pagebridge_core::{Error, Result};

use crate::env::WebStorage;

/// Default quota per storage area, matching common browser limits.
pub const DEFAULT_STORAGE_QUOTA: usize = 5 * 1024 * 1024;

/// One storage area. Items keep insertion order; usage is the byte length of
/// every key and value.
pub struct MemoryStorage {
    quota: usize,
    items: Mutex<Vec<(String, String)>>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new(DEFAULT_STORAGE_QUOTA)
    }
}

impl MemoryStorage {
    pub fn new(quota: usize) -> Self {
        Self {
            quota,
            items: Mutex::new(Vec::new()),
        }
    }

    pub fn usage(&self) -> usize {
        let items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        items.iter().map(|(k, v)| k.len() + v.len()).sum()
    }

    pub fn quota(&self) -> usize {
        self.quota
    }
}

impl WebStorage for MemoryStorage {
    fn length(&self) -> usize {
        self.items.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn key(&self, index: usize) -> Option<String> {
        let items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        items.get(index).map(|(k, _)| k.clone())
    }

    fn get_item(&self, key: &str) -> Option<String> {
        let items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        items.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        let used: usize = items.iter().map(|(k, v)| k.len() + v.len()).sum();
        let existing = items.iter().position(|(k, _)| k == key);
        let freed = existing.map(|i| key.len() + items[i].1.len()).unwrap_or(0);

        if used - freed + key.len() + value.len() > self.quota {
            return Err(Error::Browser(format!(
                "QuotaExceededError: Setting the value of '{}' exceeded the quota.",
                key
            )));
        }

        match existing {
            Some(i) => items[i].1 = value.to_string(),
            None => items.push((key.to_string(), value.to_string())),
        }
        Ok(())
    }

    fn remove_item(&self, key: &str) {
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        items.retain(|(k, _)| k != key);
    }

    fn clear(&self) {
        self.items.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insertion_order_and_overwrite() {
        let storage = MemoryStorage::default();
        storage.set_item("b", "1").unwrap();
        storage.set_item("a", "2").unwrap();
        storage.set_item("b", "3").unwrap();
        assert_eq!(storage.length(), 2);
        assert_eq!(storage.key(0).as_deref(), Some("b"));
        assert_eq!(storage.key(1).as_deref(), Some("a"));
        assert_eq!(storage.key(2), None);
        assert_eq!(storage.get_item("b").as_deref(), Some("3"));
    }

    #[test]
    fn test_quota_exceeded() {
        let storage = MemoryStorage::new(10);
        storage.set_item("k", "12345").unwrap();
        let err = storage.set_item("other", "123456").unwrap_err();
        assert!(err.to_string().starts_with("QuotaExceededError"));
        // Replacing a value only counts the difference.
        storage.set_item("k", "123456789").unwrap();
        assert_eq!(storage.usage(), 10);
    }

    #[test]
    fn test_remove_and_clear() {
        let storage = MemoryStorage::default();
        storage.set_item("a", "1").unwrap();
        storage.set_item("b", "2").unwrap();
        storage.remove_item("a");
        storage.remove_item("missing");
        assert_eq!(storage.get_item("a"), None);
        storage.clear();
        assert_eq!(storage.length(), 0);
    }
}
