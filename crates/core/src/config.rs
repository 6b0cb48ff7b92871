use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::paths::Paths;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// HTTP path of the MCP endpoint.
    #[serde(default = "default_endpoint_path")]
    pub endpoint_path: String,
    /// WebSocket path the page connects to.
    #[serde(default = "default_bridge_path")]
    pub bridge_path: String,
    /// Reported by `GET` and in `initialize`.
    #[serde(default = "default_server_name")]
    pub name: String,
    #[serde(default = "default_server_version")]
    pub version: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5199
}

fn default_endpoint_path() -> String {
    "/__mcp".to_string()
}

fn default_bridge_path() -> String {
    "/__mcp/ws".to_string()
}

fn default_server_name() -> String {
    "pagebridge".to_string()
}

fn default_server_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            endpoint_path: default_endpoint_path(),
            bridge_path: default_bridge_path(),
            name: default_server_name(),
            version: default_server_version(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayConfig {
    /// How long a call may wait for the page. 0 disables the timeout.
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
    /// Interval of the background sweep over expired pending calls.
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
}

fn default_call_timeout_ms() -> u64 {
    30_000
}

fn default_sweep_interval_ms() -> u64 {
    1_000
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: default_call_timeout_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
        }
    }
}

impl RelayConfig {
    pub fn call_timeout(&self) -> Option<Duration> {
        if self.call_timeout_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.call_timeout_ms))
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms.max(10))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageConfig {
    /// Console entries kept by the sink before the oldest are dropped.
    #[serde(default = "default_console_capacity")]
    pub console_capacity: usize,
    /// Per-area quota for local/session storage of the in-memory page.
    #[serde(default = "default_storage_quota")]
    pub storage_quota_bytes: usize,
    /// Shared deadline for the web-vitals observers.
    #[serde(default = "default_vitals_timeout_ms")]
    pub vitals_timeout_ms: u64,
}

fn default_console_capacity() -> usize {
    1000
}

fn default_storage_quota() -> usize {
    5 * 1024 * 1024
}

fn default_vitals_timeout_ms() -> u64 {
    3000
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            console_capacity: default_console_capacity(),
            storage_quota_bytes: default_storage_quota(),
            vitals_timeout_ms: default_vitals_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CapabilitiesConfig {
    /// Capability names left out of the registry.
    #[serde(default)]
    pub disabled: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub page: PageConfig,
    #[serde(default)]
    pub capabilities: CapabilitiesConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        config.check()?;
        Ok(config)
    }

    pub fn load_or_default(paths: &Paths) -> Result<Self> {
        let config_path = paths.config_file();
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    fn check(&self) -> Result<()> {
        for (label, path) in [
            ("server.endpointPath", &self.server.endpoint_path),
            ("server.bridgePath", &self.server.bridge_path),
        ] {
            if !path.starts_with('/') {
                return Err(Error::Config(format!("{} must start with '/': {}", label, path)));
            }
        }
        if self.server.endpoint_path == self.server.bridge_path {
            return Err(Error::Config(
                "server.endpointPath and server.bridgePath must differ".to_string(),
            ));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
