use std::path::Path;

use pagebridge_tools::CapabilityRegistry;

use super::load_config;

/// List the capabilities a server with this config would expose.
pub fn list(config_path: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let registry = CapabilityRegistry::with_defaults().without(&config.capabilities.disabled);

    if json {
        println!("{}", serde_json::to_string_pretty(&registry.tool_schemas())?);
        return Ok(());
    }

    println!();
    println!("🔧 Capabilities ({} total)", registry.len());
    println!();
    for contract in registry.list() {
        let short_desc: String = contract.description.chars().take(60).collect();
        let ellipsis = if contract.description.chars().count() > 60 { "..." } else { "" };
        println!("  {:<18} {}{}", contract.name, short_desc, ellipsis);
    }
    if !config.capabilities.disabled.is_empty() {
        println!();
        println!("  Disabled: {}", config.capabilities.disabled.join(", "));
    }
    println!();
    Ok(())
}
