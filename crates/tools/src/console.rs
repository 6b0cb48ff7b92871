use pagebridge_core::{Error, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{CapabilityContract, Params};

pub const NAME: &str = "read_console";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    Log,
    Info,
    Warn,
    Error,
    Debug,
}

impl ConsoleLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsoleLevel::Log => "log",
            ConsoleLevel::Info => "info",
            ConsoleLevel::Warn => "warn",
            ConsoleLevel::Error => "error",
            ConsoleLevel::Debug => "debug",
        }
    }
}

/// One captured console call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ConsoleEntry {
    #[serde(rename = "type")]
    pub level: ConsoleLevel,
    pub message: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleParams {
    /// Return only the most recent N entries (after filtering).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    /// Only entries of this type.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub level: Option<ConsoleLevel>,
}

impl Params for ConsoleParams {
    fn check(&self) -> Result<()> {
        if self.limit == Some(0) {
            return Err(Error::Validation("limit must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Result of `read_console`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ConsoleReadout {
    pub logs: Vec<ConsoleEntry>,
    /// Entries returned.
    pub count: usize,
    /// Entries matching the filter before the limit was applied.
    pub total: usize,
}

pub fn contract() -> CapabilityContract {
    CapabilityContract::typed::<ConsoleParams>(
        NAME,
        "Read console output captured from the page. Optionally filter by type and keep only the last N entries.",
    )
    .with_output::<ConsoleReadout>()
}
