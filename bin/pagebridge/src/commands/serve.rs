use std::path::Path;

use pagebridge_gateway::Gateway;
use tracing::info;

use super::load_config;

pub async fn run(
    config_path: Option<&Path>,
    host: Option<String>,
    port: Option<u16>,
    timeout_ms: Option<u64>,
) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(ms) = timeout_ms {
        config.relay.call_timeout_ms = ms;
    }

    let base = format!("{}:{}", config.server.host, config.server.port);
    println!();
    println!("🌉 {} v{}", config.server.name, config.server.version);
    println!("  MCP endpoint:  http://{}{}", base, config.server.endpoint_path);
    println!("  Page bridge:   ws://{}{}", base, config.server.bridge_path);
    match config.relay.call_timeout() {
        Some(timeout) => println!("  Call timeout:  {}ms", timeout.as_millis()),
        None => println!("  Call timeout:  none (calls wait until the page answers)"),
    }
    if !config.capabilities.disabled.is_empty() {
        println!("  Disabled:      {}", config.capabilities.disabled.join(", "));
    }
    println!();

    Gateway::new(config)
        .serve(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;
    Ok(())
}
