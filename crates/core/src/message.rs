use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One typed block of a tool result. Only text is produced today.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Text { text: String },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentBlock::Text { text } => Some(text),
        }
    }
}

/// The settled value of a call, shaped the way MCP clients expect it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub content: Vec<ContentBlock>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_error: bool,
}

fn is_false(v: &bool) -> bool {
    !*v
}

impl ToolResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::text(text)],
            is_error: false,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::text(message)],
            is_error: true,
        }
    }

    /// Pretty-print a JSON value into a single text block.
    pub fn json(value: &Value) -> Self {
        let text = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
        Self::text(text)
    }

    /// Text of the first text block, if any.
    pub fn first_text(&self) -> Option<&str> {
        self.content.iter().find_map(|b| b.as_text())
    }

    /// Parse the first text block back into JSON.
    pub fn parse_json(&self) -> Option<Value> {
        self.first_text().and_then(|t| serde_json::from_str(t).ok())
    }
}

/// Server → page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallEnvelope {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub params: Value,
}

impl CallEnvelope {
    pub fn new(id: impl Into<String>, name: impl Into<String>, params: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            params,
        }
    }
}

/// Page → server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    pub id: String,
    pub result: ToolResult,
}

impl ResultEnvelope {
    pub fn new(id: impl Into<String>, result: ToolResult) -> Self {
        Self {
            id: id.into(),
            result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_result_wire_shape() {
        let v = serde_json::to_value(ToolResult::error("Unknown adapter: nope")).unwrap();
        assert_eq!(
            v,
            json!({
                "content": [{"type": "text", "text": "Unknown adapter: nope"}],
                "isError": true
            })
        );
    }

    #[test]
    fn test_success_result_omits_is_error() {
        let v = serde_json::to_value(ToolResult::text("ok")).unwrap();
        assert!(v.get("isError").is_none());
    }

    #[test]
    fn test_result_envelope_from_browser_payload() {
        let raw = json!({
            "id": "17000000000000.42",
            "result": {"content": [{"type": "text", "text": "{\"count\": 0}"}]}
        });
        let env: ResultEnvelope = serde_json::from_value(raw).unwrap();
        assert_eq!(env.id, "17000000000000.42");
        assert!(!env.result.is_error);
        assert_eq!(env.result.parse_json().unwrap()["count"], 0);
    }

    #[test]
    fn test_call_envelope_params_default_null() {
        let env: CallEnvelope = serde_json::from_value(json!({"id": "1", "name": "cookie"})).unwrap();
        assert_eq!(env.params, Value::Null);
    }
}
