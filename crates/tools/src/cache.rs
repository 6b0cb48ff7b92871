use std::collections::BTreeMap;

use pagebridge_core::{Error, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{require, CapabilityContract, Params};

pub const NAME: &str = "cache";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CacheAction {
    List,
    GetKeys,
    GetEntry,
    SetEntry,
    DeleteEntry,
    Delete,
    Clear,
}

impl CacheAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheAction::List => "list",
            CacheAction::GetKeys => "get_keys",
            CacheAction::GetEntry => "get_entry",
            CacheAction::SetEntry => "set_entry",
            CacheAction::DeleteEntry => "delete_entry",
            CacheAction::Delete => "delete",
            CacheAction::Clear => "clear",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CacheParams {
    pub action: CacheAction,
    /// Cache name (all actions except list; optional for clear).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_name: Option<String>,
    /// Request URL identifying the entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Response body to store (set_entry).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Response status to store (set_entry, default 200).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Response headers to store (set_entry).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
}

impl CacheParams {
    pub fn cache_name(&self) -> Result<&str> {
        require(&self.cache_name, "cacheName", self.action.as_str()).map(String::as_str)
    }

    pub fn key(&self) -> Result<&str> {
        require(&self.key, "key", self.action.as_str()).map(String::as_str)
    }

    pub fn body(&self) -> Result<&str> {
        require(&self.body, "body", self.action.as_str()).map(String::as_str)
    }
}

impl Params for CacheParams {
    fn check(&self) -> Result<()> {
        match self.action {
            CacheAction::List | CacheAction::Clear => {}
            CacheAction::GetKeys | CacheAction::Delete => {
                self.cache_name()?;
            }
            CacheAction::GetEntry | CacheAction::DeleteEntry => {
                self.cache_name()?;
                self.key()?;
            }
            CacheAction::SetEntry => {
                self.cache_name()?;
                self.key()?;
                self.body()?;
            }
        }
        if let Some(status) = self.status {
            if !(200..=599).contains(&status) {
                return Err(Error::Validation(format!(
                    "status must be between 200 and 599, got {}",
                    status
                )));
            }
        }
        Ok(())
    }
}

pub fn contract() -> CapabilityContract {
    CapabilityContract::typed::<CacheParams>(
        NAME,
        "Inspect and modify Cache Storage. Actions: list (cache names), get_keys, get_entry, set_entry, delete_entry, delete (a whole cache), clear (one cache's entries, or every cache when cacheName is omitted).",
    )
}
