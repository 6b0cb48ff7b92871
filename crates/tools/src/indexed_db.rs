use pagebridge_core::{Error, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{require, CapabilityContract, Params};

pub const NAME: &str = "indexed_db";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum IndexedDbAction {
    ListDatabases,
    GetDatabaseInfo,
    GetKeys,
    GetEntry,
    SetEntry,
    DeleteEntry,
    ClearObjectStore,
    DeleteDatabase,
}

impl IndexedDbAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexedDbAction::ListDatabases => "list_databases",
            IndexedDbAction::GetDatabaseInfo => "get_database_info",
            IndexedDbAction::GetKeys => "get_keys",
            IndexedDbAction::GetEntry => "get_entry",
            IndexedDbAction::SetEntry => "set_entry",
            IndexedDbAction::DeleteEntry => "delete_entry",
            IndexedDbAction::ClearObjectStore => "clear_object_store",
            IndexedDbAction::DeleteDatabase => "delete_database",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IndexedDbParams {
    pub action: IndexedDbAction,
    /// Database name (all actions except list_databases).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// Object store name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store: Option<String>,
    /// Record key, a string or a number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<Value>,
    /// Record value (set_entry); any JSON value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Maximum number of keys returned by get_keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl IndexedDbParams {
    pub fn database(&self) -> Result<&str> {
        require(&self.database, "database", self.action.as_str()).map(String::as_str)
    }

    pub fn store(&self) -> Result<&str> {
        require(&self.store, "store", self.action.as_str()).map(String::as_str)
    }

    pub fn key(&self) -> Result<&Value> {
        require(&self.key, "key", self.action.as_str())
    }

    pub fn value(&self) -> Result<&Value> {
        require(&self.value, "value", self.action.as_str())
    }
}

impl Params for IndexedDbParams {
    fn check(&self) -> Result<()> {
        use IndexedDbAction::*;

        match self.action {
            ListDatabases => {}
            GetDatabaseInfo | DeleteDatabase => {
                self.database()?;
            }
            GetKeys | ClearObjectStore => {
                self.database()?;
                self.store()?;
            }
            GetEntry | DeleteEntry => {
                self.database()?;
                self.store()?;
                self.key()?;
            }
            SetEntry => {
                self.database()?;
                self.store()?;
                self.value()?;
            }
        }
        if let Some(key) = &self.key {
            if !(key.is_string() || key.is_number()) {
                return Err(Error::Validation(
                    "key must be a string or a number".to_string(),
                ));
            }
        }
        if self.limit == Some(0) {
            return Err(Error::Validation("limit must be at least 1".to_string()));
        }
        Ok(())
    }
}

pub fn contract() -> CapabilityContract {
    CapabilityContract::typed::<IndexedDbParams>(
        NAME,
        "Inspect and modify IndexedDB. Actions: list_databases, get_database_info, get_keys, get_entry, set_entry, delete_entry, clear_object_store, delete_database.",
    )
}
