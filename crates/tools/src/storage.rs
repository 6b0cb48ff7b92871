use pagebridge_core::Result;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{require, CapabilityContract, Params};

pub const LOCAL_NAME: &str = "local_storage";
pub const SESSION_NAME: &str = "session_storage";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StorageAction {
    Read,
    Get,
    Set,
    Edit,
    Remove,
    Clear,
}

impl StorageAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageAction::Read => "read",
            StorageAction::Get => "get",
            StorageAction::Set => "set",
            StorageAction::Edit => "edit",
            StorageAction::Remove => "remove",
            StorageAction::Clear => "clear",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageParams {
    pub action: StorageAction,
    /// Item key (get, set, edit, remove).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Item value (set, edit).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl StorageParams {
    pub fn key(&self) -> Result<&str> {
        require(&self.key, "key", self.action.as_str()).map(String::as_str)
    }

    pub fn value(&self) -> Result<&str> {
        require(&self.value, "value", self.action.as_str()).map(String::as_str)
    }
}

impl Params for StorageParams {
    fn check(&self) -> Result<()> {
        match self.action {
            StorageAction::Read | StorageAction::Clear => {}
            StorageAction::Get | StorageAction::Remove => {
                self.key()?;
            }
            StorageAction::Set | StorageAction::Edit => {
                self.key()?;
                self.value()?;
            }
        }
        Ok(())
    }
}

pub fn local_contract() -> CapabilityContract {
    CapabilityContract::typed::<StorageParams>(
        LOCAL_NAME,
        "Inspect and modify localStorage. Actions: read (all items with byte sizes), get, set, edit (existing key only), remove, clear.",
    )
}

pub fn session_contract() -> CapabilityContract {
    CapabilityContract::typed::<StorageParams>(
        SESSION_NAME,
        "Inspect and modify sessionStorage. Actions: read (all items with byte sizes), get, set, edit (existing key only), remove, clear.",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_clear_needs_no_key() {
        assert!(StorageParams::parse(&json!({"action": "clear"})).is_ok());
    }

    #[test]
    fn test_get_requires_key() {
        let err = StorageParams::parse(&json!({"action": "get"})).unwrap_err();
        assert!(err.to_string().contains("'key'"));
    }

    #[test]
    fn test_empty_value_is_allowed() {
        let p = StorageParams::parse(&json!({"action": "set", "key": "k", "value": ""})).unwrap();
        assert_eq!(p.value().unwrap(), "");
    }

    #[test]
    fn test_non_string_value_rejected() {
        assert!(StorageParams::parse(&json!({"action": "set", "key": "k", "value": 3})).is_err());
    }
}
