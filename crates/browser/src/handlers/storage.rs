use std::sync::Arc;

use async_trait::async_trait;
use pagebridge_core::Result;
use pagebridge_tools::storage::{StorageAction, StorageParams, LOCAL_NAME, SESSION_NAME};
use pagebridge_tools::{byte_size, Params};
use serde_json::{json, Value};

use super::Handler;
use crate::env::{subsystem, PageEnv, WebStorage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageArea {
    Local,
    Session,
}

impl StorageArea {
    fn capability(&self) -> &'static str {
        match self {
            StorageArea::Local => LOCAL_NAME,
            StorageArea::Session => SESSION_NAME,
        }
    }

    fn global(&self) -> &'static str {
        match self {
            StorageArea::Local => "localStorage",
            StorageArea::Session => "sessionStorage",
        }
    }
}

/// Serves `local_storage` or `session_storage`, depending on its area.
pub struct StorageHandler {
    env: Arc<dyn PageEnv>,
    area: StorageArea,
}

impl StorageHandler {
    pub fn new(env: Arc<dyn PageEnv>, area: StorageArea) -> Self {
        Self { env, area }
    }

    fn storage(&self) -> Result<&dyn WebStorage> {
        let found = match self.area {
            StorageArea::Local => self.env.local_storage(),
            StorageArea::Session => self.env.session_storage(),
        };
        subsystem(found, self.area.global())
    }
}

#[async_trait]
impl Handler for StorageHandler {
    fn name(&self) -> &str {
        self.area.capability()
    }

    async fn execute(&self, params: Value) -> Result<Value> {
        let params = StorageParams::parse(&params)?;
        let storage = self.storage()?;

        match params.action {
            StorageAction::Read => {
                let mut total_size = 0;
                let items: Vec<Value> = (0..storage.length())
                    .filter_map(|i| storage.key(i))
                    .filter_map(|key| {
                        let value = storage.get_item(&key)?;
                        let size = byte_size(&value);
                        total_size += size;
                        Some(json!({"key": key, "size": size, "value": value}))
                    })
                    .collect();
                Ok(json!({"count": items.len(), "items": items, "totalSize": total_size}))
            }
            StorageAction::Get => {
                let key = params.key()?;
                Ok(match storage.get_item(key) {
                    Some(value) => json!({"found": true, "key": key, "size": byte_size(&value), "value": value}),
                    None => json!({"found": false, "key": key}),
                })
            }
            StorageAction::Set => {
                let (key, value) = (params.key()?, params.value()?);
                storage.set_item(key, value)?;
                Ok(json!({"success": true, "key": key, "value": value}))
            }
            StorageAction::Edit => {
                let (key, value) = (params.key()?, params.value()?);
                if storage.get_item(key).is_none() {
                    return Ok(json!({
                        "success": false,
                        "key": key,
                        "error": format!("Key '{}' not found in {}", key, self.area.global()),
                    }));
                }
                storage.set_item(key, value)?;
                Ok(json!({"success": true, "key": key, "value": value}))
            }
            StorageAction::Remove => {
                let key = params.key()?;
                if storage.get_item(key).is_none() {
                    return Ok(json!({"success": false, "key": key}));
                }
                storage.remove_item(key);
                Ok(json!({"success": true, "key": key}))
            }
            StorageAction::Clear => {
                let cleared = storage.length();
                storage.clear();
                Ok(json!({"success": true, "cleared": cleared}))
            }
        }
    }
}
