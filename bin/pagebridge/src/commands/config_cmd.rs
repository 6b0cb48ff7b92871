use std::path::Path;

use pagebridge_core::Config;

use super::{config_file, load_config};

/// Show the effective configuration as pretty-printed JSON.
pub fn show(config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let file = config_file(config_path);

    println!();
    println!("📋 Current Configuration");
    if file.exists() {
        println!("  File: {}", file.display());
    } else {
        println!("  File: {} (not found, using defaults)", file.display());
    }
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

/// Write the default configuration.
pub fn init(config_path: Option<&Path>, force: bool) -> anyhow::Result<()> {
    let file = config_file(config_path);
    if file.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            file.display()
        );
    }
    Config::default().save(&file)?;
    println!("✅ Wrote default configuration to {}", file.display());
    Ok(())
}

pub fn path(config_path: Option<&Path>) {
    println!("{}", config_file(config_path).display());
}
