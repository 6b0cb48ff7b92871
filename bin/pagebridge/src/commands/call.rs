use std::path::Path;

use pagebridge_gateway::SESSION_HEADER;
use serde_json::{json, Value};
use tracing::debug;

use super::load_config;

const ACCEPT: &str = "application/json, text/event-stream";

/// Decode a response body that is either plain JSON or a one-event stream.
fn decode_body(content_type: &str, body: &str) -> anyhow::Result<Value> {
    if content_type.starts_with("text/event-stream") {
        let data: Vec<&str> = body
            .lines()
            .filter_map(|line| line.strip_prefix("data:"))
            .map(str::trim_start)
            .collect();
        if data.is_empty() {
            anyhow::bail!("Event stream carried no data");
        }
        return Ok(serde_json::from_str(&data.join("\n"))?);
    }
    Ok(serde_json::from_str(body)?)
}

struct McpClient {
    http: reqwest::Client,
    url: String,
    session: Option<String>,
    next_id: u64,
}

impl McpClient {
    fn new(url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            url,
            session: None,
            next_id: 1,
        }
    }

    async fn post(&mut self, body: Value) -> anyhow::Result<Option<Value>> {
        let mut request = self
            .http
            .post(&self.url)
            .header(reqwest::header::ACCEPT, ACCEPT)
            .json(&body);
        if let Some(session) = &self.session {
            request = request.header(SESSION_HEADER, session);
        }

        let response = request.send().await?;
        if let Some(session) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            self.session = Some(session.to_string());
        }

        let status = response.status();
        if status == reqwest::StatusCode::ACCEPTED {
            return Ok(None);
        }
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let text = response.text().await?;
        if !status.is_success() && text.is_empty() {
            anyhow::bail!("Server returned {}", status);
        }
        Ok(Some(decode_body(&content_type, &text)?))
    }

    async fn request(&mut self, method: &str, params: Value) -> anyhow::Result<Value> {
        let id = self.next_id;
        self.next_id += 1;
        let reply = self
            .post(json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}))
            .await?
            .ok_or_else(|| anyhow::anyhow!("No response to {}", method))?;
        if let Some(error) = reply.get("error") {
            anyhow::bail!(
                "{} failed ({}): {}",
                method,
                error["code"],
                error["message"].as_str().unwrap_or("unknown error")
            );
        }
        Ok(reply.get("result").cloned().unwrap_or(Value::Null))
    }

    async fn notify(&mut self, method: &str) -> anyhow::Result<()> {
        self.post(json!({"jsonrpc": "2.0", "method": method})).await?;
        Ok(())
    }

    async fn close(&self) {
        if let Some(session) = &self.session {
            let sent = self
                .http
                .delete(&self.url)
                .header(SESSION_HEADER, session)
                .send()
                .await;
            if let Err(e) = sent {
                debug!(error = %e, "Failed to close session");
            }
        }
    }
}

/// Initialize a session, call one capability and print its result.
pub async fn run(
    config_path: Option<&Path>,
    name: &str,
    params: &str,
    url: Option<String>,
) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let url = url.unwrap_or_else(|| {
        format!(
            "http://{}:{}{}",
            config.server.host, config.server.port, config.server.endpoint_path
        )
    });
    let arguments: Value = serde_json::from_str(params)
        .map_err(|e| anyhow::anyhow!("--params is not valid JSON: {}", e))?;

    let mut client = McpClient::new(url);
    let init = client
        .request(
            "initialize",
            json!({
                "protocolVersion": "2025-03-26",
                "capabilities": {},
                "clientInfo": {"name": "pagebridge-cli", "version": env!("CARGO_PKG_VERSION")}
            }),
        )
        .await?;
    debug!(server = %init["serverInfo"], "Initialized");
    client.notify("notifications/initialized").await?;

    let result = client
        .request("tools/call", json!({"name": name, "arguments": arguments}))
        .await;
    client.close().await;
    let result = result?;

    let is_error = result["isError"].as_bool().unwrap_or(false);
    let text: Vec<&str> = result["content"]
        .as_array()
        .map(|blocks| blocks.iter().filter_map(|b| b["text"].as_str()).collect())
        .unwrap_or_default();
    if is_error {
        anyhow::bail!("{}", text.join("\n"));
    }
    println!("{}", text.join("\n"));
    Ok(())
}
