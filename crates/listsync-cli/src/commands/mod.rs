pub mod config;
pub mod sync;

use color_eyre::Result;
use media_sync_config::{Config, PathManager};
use std::path::PathBuf;

/// Load the config file (defaults when absent) with environment overrides applied
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(|| PathManager::default().config_file());
    let config = Config::load(&path)
        .map_err(|e| color_eyre::eyre::eyre!("Failed to load config from {}: {:#}", path.display(), e))?;
    Ok((config, path))
}
