//! Store configuration resolution for the CLI.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use featstore_store::{StoreConfig, default_config_path};

/// Load the store configuration.
///
/// An explicit file must exist. Without one the default file is used when
/// present, built-in defaults otherwise. `database` overrides the path.
pub fn resolve(config: Option<&Path>, database: Option<&Path>) -> Result<StoreConfig> {
    let mut store_config = match config {
        Some(path) => StoreConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => StoreConfig::load_default().context("Failed to load default config")?,
    };
    if let Some(database) = database {
        store_config.path = database.to_path_buf();
    }
    store_config.validate()?;
    Ok(store_config)
}

/// The file `config` subcommands operate on.
pub fn config_file(config: Option<&Path>) -> PathBuf {
    config.map_or_else(default_config_path, Path::to_path_buf)
}

/// Write a default configuration file.
pub fn init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "Config file {} already exists, use --force to overwrite",
            path.display()
        );
    }
    StoreConfig::default()
        .save(path)
        .with_context(|| format!("Failed to write config to {}", path.display()))
}

/// The effective configuration as TOML.
pub fn show(config: &StoreConfig) -> Result<String> {
    toml::to_string_pretty(config).context("Failed to serialize config")
}
