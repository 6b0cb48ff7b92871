//! JSON-RPC 2.0 message handling for the MCP methods the endpoint serves.

use std::sync::Arc;

use pagebridge_core::ToolResult;
use pagebridge_relay::Relay;
use pagebridge_tools::CapabilityRegistry;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

pub const PROTOCOL_VERSION: &str = "2025-03-26";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;

#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// One decoded POST body.
#[derive(Debug, Clone)]
pub enum Incoming {
    Request(RpcRequest),
    /// A message without an id. Never answered.
    Notification { method: String },
}

/// An error raised before a request could be routed to a method.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn to_response(&self, id: Value) -> Value {
        failure(id, self.code, &self.message)
    }
}

pub fn success(id: Value, result: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "result": result})
}

pub fn failure(id: Value, code: i64, message: &str) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}})
}

/// Decode a POST body into a single request or notification.
pub fn parse_message(body: &[u8]) -> Result<Incoming, RpcError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| RpcError::new(PARSE_ERROR, format!("Parse error: {}", e)))?;

    let obj = match &value {
        Value::Array(_) => {
            return Err(RpcError::new(INVALID_REQUEST, "Batch requests are not supported"))
        }
        Value::Object(obj) => obj,
        _ => return Err(RpcError::new(INVALID_REQUEST, "Invalid Request")),
    };

    if obj.get("jsonrpc").and_then(|v| v.as_str()) != Some("2.0") {
        return Err(RpcError::new(INVALID_REQUEST, "Invalid Request: jsonrpc must be \"2.0\""));
    }
    let Some(method) = obj.get("method").and_then(|v| v.as_str()) else {
        return Err(RpcError::new(INVALID_REQUEST, "Invalid Request: missing method"));
    };

    if !obj.contains_key("id") {
        return Ok(Incoming::Notification {
            method: method.to_string(),
        });
    }

    let request: RpcRequest = serde_json::from_value(value.clone())
        .map_err(|e| RpcError::new(INVALID_REQUEST, format!("Invalid Request: {}", e)))?;
    Ok(Incoming::Request(request))
}

/// Answers MCP requests from the capability registry and the relay.
pub struct McpService {
    registry: Arc<CapabilityRegistry>,
    relay: Relay,
    name: String,
    version: String,
}

impl McpService {
    pub fn new(
        registry: Arc<CapabilityRegistry>,
        relay: Relay,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            relay,
            name: name.into(),
            version: version.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    pub fn relay(&self) -> &Relay {
        &self.relay
    }

    /// Produce the response to one request.
    pub async fn handle(&self, request: RpcRequest) -> Value {
        let id = request.id.clone();
        match request.method.as_str() {
            "initialize" => success(id, self.initialize(&request.params)),
            "ping" => success(id, json!({})),
            "tools/list" => success(id, json!({"tools": self.registry.tool_schemas()})),
            "tools/call" => match self.call_tool(&request.params).await {
                Ok(result) => success(id, serde_json::to_value(result).unwrap_or(Value::Null)),
                Err(e) => e.to_response(id),
            },
            other => {
                debug!(method = %other, "Unknown method");
                failure(id, METHOD_NOT_FOUND, &format!("Method not found: {}", other))
            }
        }
    }

    fn initialize(&self, params: &Value) -> Value {
        let client = params
            .pointer("/clientInfo/name")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        let protocol = params
            .get("protocolVersion")
            .and_then(|v| v.as_str())
            .unwrap_or(PROTOCOL_VERSION);
        info!(client, protocol, "Client initialized");
        json!({
            "protocolVersion": protocol,
            "capabilities": {
                "tools": {"listChanged": false}
            },
            "serverInfo": {
                "name": self.name,
                "version": self.version,
            }
        })
    }

    /// Validate locally, then relay to the page. Invalid arguments come back
    /// as an error result without touching the relay.
    async fn call_tool(&self, params: &Value) -> Result<ToolResult, RpcError> {
        let Some(name) = params.get("name").and_then(|v| v.as_str()) else {
            return Err(RpcError::new(INVALID_PARAMS, "Missing tool name"));
        };
        if self.registry.lookup(name).is_err() {
            return Err(RpcError::new(INVALID_PARAMS, format!("Unknown tool: {}", name)));
        }

        let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);
        match self.registry.validate(name, &arguments) {
            Ok(normalised) => Ok(self.relay.dispatch(name, normalised).await),
            Err(e) => Ok(ToolResult::error(e.to_string())),
        }
    }
}
