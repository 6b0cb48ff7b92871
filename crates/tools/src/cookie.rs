use pagebridge_core::{Error, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{require, CapabilityContract, Params};

pub const NAME: &str = "cookie";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CookieAction {
    Read,
    Get,
    Set,
    Edit,
    Remove,
}

impl CookieAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            CookieAction::Read => "read",
            CookieAction::Get => "get",
            CookieAction::Set => "set",
            CookieAction::Edit => "edit",
            CookieAction::Remove => "remove",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CookieParams {
    pub action: CookieAction,
    /// Cookie name (get, set, edit, remove).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Cookie value (set, edit).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Lifetime in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age: Option<i64>,
    /// Expiry date in HTTP-date format.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub same_site: Option<SameSite>,
}

impl CookieParams {
    pub fn name(&self) -> Result<&str> {
        require(&self.name, "name", self.action.as_str()).map(String::as_str)
    }

    pub fn value(&self) -> Result<&str> {
        require(&self.value, "value", self.action.as_str()).map(String::as_str)
    }
}

impl Params for CookieParams {
    fn check(&self) -> Result<()> {
        match self.action {
            CookieAction::Read => {}
            CookieAction::Get | CookieAction::Remove => {
                self.name()?;
            }
            CookieAction::Set | CookieAction::Edit => {
                self.name()?;
                self.value()?;
            }
        }
        if let Some(name) = &self.name {
            if name.is_empty() || name.contains(|c: char| c == '=' || c == ';' || c.is_whitespace()) {
                return Err(Error::Validation(format!("Invalid cookie name: {:?}", name)));
            }
        }
        Ok(())
    }
}

pub fn contract() -> CapabilityContract {
    CapabilityContract::typed::<CookieParams>(
        NAME,
        "Read and modify the page's cookies. Actions: read (all cookies), get, set (create or update), edit (update an existing cookie), remove.",
    )
}
