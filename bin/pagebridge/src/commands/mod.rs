pub mod call;
pub mod config_cmd;
pub mod page;
pub mod serve;
pub mod tools_cmd;

use std::path::{Path, PathBuf};

use pagebridge_core::{Config, Paths};

/// The config file in effect: `--config` when given, else the default location.
pub fn config_file(explicit: Option<&Path>) -> PathBuf {
    match explicit {
        Some(path) => path.to_path_buf(),
        None => Paths::new().config_file(),
    }
}

/// Load the config in effect. A missing default file means defaults; a
/// missing explicit file is an error.
pub fn load_config(explicit: Option<&Path>) -> anyhow::Result<Config> {
    let config = match explicit {
        Some(path) => Config::load(path)
            .map_err(|e| anyhow::anyhow!("Failed to load {}: {}", path.display(), e))?,
        None => Config::load_or_default(&Paths::new())?,
    };
    Ok(config)
}
