//! Capability contracts: the names, descriptions and parameter shapes of
//! everything a client may call on the page.
//!
//! Parameter types live here so the server (validation) and the page
//! (execution) agree on one definition per capability.

pub mod cache;
pub mod console;
pub mod cookie;
pub mod indexed_db;
pub mod performance;
pub mod registry;
pub mod storage;

use pagebridge_core::{Error, Result};
use schemars::gen::SchemaSettings;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

pub use registry::CapabilityRegistry;

/// Typed parameters of one capability.
///
/// Deserialisation checks the structure; `check` adds the constraints serde
/// cannot express (which fields a given action needs, numeric ranges).
pub trait Params: DeserializeOwned + Serialize + JsonSchema {
    fn check(&self) -> Result<()> {
        Ok(())
    }

    /// Parse raw call parameters. `null` is treated as an empty object.
    fn parse(params: &Value) -> Result<Self> {
        let input = if params.is_null() { json!({}) } else { params.clone() };
        let typed: Self =
            serde_json::from_value(input).map_err(|e| Error::Validation(e.to_string()))?;
        typed.check()?;
        Ok(typed)
    }
}

type Validator = fn(&Value) -> Result<Value>;

fn validate_as<P: Params>(params: &Value) -> Result<Value> {
    let typed = P::parse(params)?;
    Ok(serde_json::to_value(&typed)?)
}

/// Render the JSON schema of `T` without `$schema`/`definitions` noise.
pub fn schema_value<T: JsonSchema>() -> Value {
    let settings = SchemaSettings::draft07().with(|s| {
        s.option_nullable = false;
        s.option_add_null_type = false;
        s.inline_subschemas = true;
    });
    let root = settings.into_generator().into_root_schema_for::<T>();
    let mut value = serde_json::to_value(root).unwrap_or_else(|_| json!({"type": "object"}));
    if let Some(obj) = value.as_object_mut() {
        obj.remove("$schema");
        obj.remove("title");
    }
    value
}

/// Registered description of one capability.
#[derive(Clone)]
pub struct CapabilityContract {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub output_schema: Option<Value>,
    validator: Validator,
}

impl std::fmt::Debug for CapabilityContract {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityContract")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

impl CapabilityContract {
    /// Contract whose input shape and validation both come from `P`.
    pub fn typed<P: Params>(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            input_schema: schema_value::<P>(),
            output_schema: None,
            validator: validate_as::<P>,
        }
    }

    pub fn with_output<T: JsonSchema>(mut self) -> Self {
        self.output_schema = Some(schema_value::<T>());
        self
    }

    /// Validate and normalise raw parameters.
    pub fn validate(&self, params: &Value) -> Result<Value> {
        (self.validator)(params)
    }

    /// The entry this contract contributes to an MCP `tools/list` response.
    pub fn to_tool_json(&self) -> Value {
        let mut tool = json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": self.input_schema,
        });
        if let Some(output) = &self.output_schema {
            tool["outputSchema"] = output.clone();
        }
        tool
    }
}

/// Fetch a field an action depends on, or fail validation naming both.
pub fn require<'a, T>(field: &'a Option<T>, field_name: &str, action: &str) -> Result<&'a T> {
    field.as_ref().ok_or_else(|| {
        Error::Validation(format!(
            "Parameter '{}' is required for action '{}'",
            field_name, action
        ))
    })
}

/// UTF-8 byte length, the size every capability reports.
pub fn byte_size(value: &str) -> usize {
    value.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cookie::CookieParams;

    #[test]
    fn test_byte_size_counts_utf8_bytes() {
        assert_eq!(byte_size("abc"), 3);
        assert_eq!(byte_size("héllo"), 6);
        assert_eq!(byte_size("日本"), 6);
        assert_eq!(byte_size("🙂"), 4);
    }

    #[test]
    fn test_schema_value_is_object_schema() {
        let schema = schema_value::<CookieParams>();
        assert_eq!(schema["type"], "object");
        assert!(schema.get("$schema").is_none());
        assert!(schema["properties"]["action"].is_object());
        let required = schema["required"].as_array().unwrap();
        assert!(required.contains(&json!("action")));
    }

    #[test]
    fn test_require_names_field_and_action() {
        let missing: Option<String> = None;
        let err = require(&missing, "key", "get").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Validation error: Parameter 'key' is required for action 'get'"
        );
    }

    #[test]
    fn test_tool_json_shape() {
        let contract = CapabilityContract::typed::<CookieParams>("cookie", "Cookies");
        let tool = contract.to_tool_json();
        assert_eq!(tool["name"], "cookie");
        assert_eq!(tool["inputSchema"]["type"], "object");
        assert!(tool.get("outputSchema").is_none());
    }
}
