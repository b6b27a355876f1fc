//! Locating and reading `odometr.toml`.
//!
//! First run creates the file with defaults; every load parses and range
//! checks the result before handing it to the caller.

use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::{Context, Result};

use super::Config;
use super::validation::validate_config;

/// Directory override from `--config`, installed once per process.
static CONFIG_DIR: OnceLock<Option<PathBuf>> = OnceLock::new();

/// Install the configuration directory override. A second call fails so a
/// command cannot silently flip directories mid-run.
pub fn set_config_dir(dir: Option<String>) -> Result<()> {
    match CONFIG_DIR.set(dir.map(PathBuf::from)) {
        Ok(()) => Ok(()),
        Err(_) => Err(anyhow::anyhow!("Configuration directory already set")),
    }
}

/// Resolve the path of `odometr.toml`, honoring the `--config` override.
pub fn get_config_path() -> Result<PathBuf> {
    if let Some(Some(custom)) = CONFIG_DIR.get() {
        return Ok(custom.join("odometr.toml"));
    }

    let base = dirs::config_dir().context("Could not determine config directory")?;
    Ok(base.join("odometr").join("odometr.toml"))
}

/// Load the configuration, writing a default file first if none exists.
pub fn load() -> Result<Config> {
    let path = get_config_path()?;

    if !path.exists() {
        super::builder::create_default_config(&path)
            .context("Failed to create default config during load")?;
    }

    load_from_path(&path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))
}

/// Parse and validate an existing config file. A missing file is an error
/// here; only `load` creates defaults.
pub fn load_from_path(path: &PathBuf) -> Result<Config> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;

    let config: Config = toml::from_str(&raw)
        .with_context(|| format!("Failed to parse config from {}", path.display()))?;

    validate_config(&config)?;
    Ok(config)
}
