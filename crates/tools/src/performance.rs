use pagebridge_core::{Error, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{CapabilityContract, Params};

pub const NAME: &str = "performance";

/// Upper bound for the vitals observation window.
pub const MAX_VITALS_TIMEOUT_MS: u64 = 30_000;

fn yes() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceParams {
    /// Include navigation timing.
    #[serde(default = "yes")]
    pub include_navigation: bool,
    /// Include resource timings.
    #[serde(default = "yes")]
    pub include_resources: bool,
    /// Include core web vitals (LCP, FCP, CLS, FID, TTFB).
    #[serde(default = "yes")]
    pub include_vitals: bool,
    /// Include every raw performance entry.
    #[serde(default)]
    pub include_entries: bool,
    /// Keep only the N slowest resources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_limit: Option<u32>,
    /// How long to wait for the vitals observers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vitals_timeout_ms: Option<u64>,
}

impl Default for PerformanceParams {
    fn default() -> Self {
        Self {
            include_navigation: true,
            include_resources: true,
            include_vitals: true,
            include_entries: false,
            resource_limit: None,
            vitals_timeout_ms: None,
        }
    }
}

impl Params for PerformanceParams {
    fn check(&self) -> Result<()> {
        if let Some(ms) = self.vitals_timeout_ms {
            if ms > MAX_VITALS_TIMEOUT_MS {
                return Err(Error::Validation(format!(
                    "vitalsTimeoutMs must not exceed {}",
                    MAX_VITALS_TIMEOUT_MS
                )));
            }
        }
        if self.resource_limit == Some(0) {
            return Err(Error::Validation("resourceLimit must be at least 1".to_string()));
        }
        Ok(())
    }
}

pub fn contract() -> CapabilityContract {
    CapabilityContract::typed::<PerformanceParams>(
        NAME,
        "Snapshot page performance: navigation timing, resource timings, core web vitals and optionally the raw performance entries.",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let p = PerformanceParams::parse(&json!({})).unwrap();
        assert!(p.include_navigation && p.include_resources && p.include_vitals);
        assert!(!p.include_entries);
    }

    #[test]
    fn test_flags_override() {
        let p = PerformanceParams::parse(&json!({"includeVitals": false, "includeEntries": true}))
            .unwrap();
        assert!(!p.include_vitals);
        assert!(p.include_entries);
    }

    #[test]
    fn test_timeout_bound() {
        assert!(PerformanceParams::parse(&json!({"vitalsTimeoutMs": 60000})).is_err());
    }
}
