use std::collections::HashMap;

use pagebridge_core::{Error, Result};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{cache, console, cookie, indexed_db, performance, storage, CapabilityContract};

/// Every capability the page side knows how to execute.
pub fn builtin_contracts() -> Vec<CapabilityContract> {
    vec![
        console::contract(),
        cookie::contract(),
        storage::local_contract(),
        storage::session_contract(),
        cache::contract(),
        indexed_db::contract(),
        performance::contract(),
    ]
}

#[derive(Clone, Debug, Default)]
pub struct CapabilityRegistry {
    contracts: HashMap<String, CapabilityContract>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self {
            contracts: HashMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for contract in builtin_contracts() {
            // Built-in names are distinct.
            let _ = registry.register(contract);
        }
        registry
    }

    /// Registry built from a caller-supplied list instead of the built-ins.
    pub fn from_contracts(contracts: Vec<CapabilityContract>) -> Result<Self> {
        let mut registry = Self::new();
        for contract in contracts {
            registry.register(contract)?;
        }
        Ok(registry)
    }

    /// Add a contract. A name that is already registered is rejected.
    pub fn register(&mut self, contract: CapabilityContract) -> Result<()> {
        if self.contracts.contains_key(&contract.name) {
            warn!(name = %contract.name, "Duplicate capability registration rejected");
            return Err(Error::Duplicate(contract.name));
        }
        debug!(name = %contract.name, "Registering capability");
        self.contracts.insert(contract.name.clone(), contract);
        Ok(())
    }

    /// Drop the named capabilities; unknown names are ignored.
    pub fn without(mut self, names: &[String]) -> Self {
        for name in names {
            if self.contracts.remove(name).is_some() {
                debug!(name = %name, "Capability disabled");
            }
        }
        self
    }

    pub fn lookup(&self, name: &str) -> Result<&CapabilityContract> {
        self.contracts
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("Unknown capability: {}", name)))
    }

    /// Contracts sorted by name.
    pub fn list(&self) -> Vec<&CapabilityContract> {
        let mut all: Vec<&CapabilityContract> = self.contracts.values().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub fn names(&self) -> Vec<String> {
        self.list().into_iter().map(|c| c.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }

    /// Look up `name` and validate `params` against its input shape.
    pub fn validate(&self, name: &str, params: &Value) -> Result<Value> {
        let contract = self.lookup(name)?;
        contract.validate(params).map_err(|e| {
            debug!(name, error = %e, "Capability validation failed");
            e
        })
    }

    /// Entries for an MCP `tools/list` response.
    pub fn tool_schemas(&self) -> Vec<Value> {
        self.list().into_iter().map(|c| c.to_tool_json()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_registry_new_empty() {
        let reg = CapabilityRegistry::new();
        assert!(reg.is_empty());
        assert!(reg.lookup("cookie").is_err());
    }

    #[test]
    fn test_registry_with_defaults_has_catalogue() {
        let reg = CapabilityRegistry::with_defaults();
        assert_eq!(
            reg.names(),
            vec![
                "cache",
                "cookie",
                "indexed_db",
                "local_storage",
                "performance",
                "read_console",
                "session_storage",
            ]
        );
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut reg = CapabilityRegistry::with_defaults();
        let err = reg.register(cookie::contract()).unwrap_err();
        assert!(matches!(err, Error::Duplicate(ref n) if n == "cookie"));
        assert_eq!(reg.len(), 7);
    }

    #[test]
    fn test_from_contracts_override_list() {
        let reg = CapabilityRegistry::from_contracts(vec![cookie::contract()]).unwrap();
        assert_eq!(reg.names(), vec!["cookie"]);
        assert!(CapabilityRegistry::from_contracts(vec![cookie::contract(), cookie::contract()]).is_err());
    }

    #[test]
    fn test_without_disables() {
        let reg = CapabilityRegistry::with_defaults()
            .without(&["performance".to_string(), "nope".to_string()]);
        assert_eq!(reg.len(), 6);
        assert!(reg.lookup("performance").is_err());
    }

    #[test]
    fn test_lookup_miss_is_error() {
        let reg = CapabilityRegistry::with_defaults();
        assert!(matches!(reg.lookup("screenshot"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_validate_normalises() {
        let reg = CapabilityRegistry::with_defaults();
        let v = reg.validate("performance", &json!({})).unwrap();
        assert_eq!(v["includeNavigation"], true);
        assert_eq!(v["includeEntries"], false);
    }

    #[test]
    fn test_validate_rejects_bad_input() {
        let reg = CapabilityRegistry::with_defaults();
        assert!(matches!(
            reg.validate("local_storage", &json!({"action": "get"})),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_tool_schemas() {
        let reg = CapabilityRegistry::with_defaults();
        let schemas = reg.tool_schemas();
        assert_eq!(schemas.len(), 7);
        for schema in &schemas {
            assert!(schema["name"].is_string());
            assert!(schema["description"].is_string());
            assert_eq!(schema["inputSchema"]["type"], "object");
        }
    }
}
