use std::path::Path;
use std::sync::Arc;

use pagebridge_browser::{Dispatcher, MemoryPage};
use pagebridge_channels::WsClientTransport;
use tracing::{info, warn};

use super::load_config;

pub async fn run(
    config_path: Option<&Path>,
    url: Option<String>,
    origin: Option<String>,
) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let url = url.unwrap_or_else(|| {
        format!(
            "ws://{}:{}{}",
            config.server.host, config.server.port, config.server.bridge_path
        )
    });

    let mut builder = MemoryPage::builder()
        .console_capacity(config.page.console_capacity)
        .storage_quota(config.page.storage_quota_bytes);
    if let Some(origin) = &origin {
        builder = builder.origin(origin);
    }
    let page = Arc::new(builder.build()?);
    if let Some(console) = page.console_sink() {
        console.info(format!("pagebridge page loaded at {}", page.origin()));
    }

    let transport = Arc::new(WsClientTransport::connect(&url).await?);
    let dispatcher = Arc::new(Dispatcher::with_builtin_handlers(page.clone(), &config.page));
    info!(url = %url, origin = %page.origin(), handlers = dispatcher.names().len(), "Page peer started");

    let serving = tokio::spawn(dispatcher.run(transport.clone()));

    tokio::select! {
        _ = transport.closed() => warn!("Server closed the bridge connection"),
        _ = tokio::signal::ctrl_c() => info!("Shutdown signal received"),
    }
    serving.abort();
    Ok(())
}
