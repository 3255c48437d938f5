// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{RawToolConfig, ToolConfig};
use crate::errors::Result;

/// File name of the optional tool configuration inside the installation root.
pub const CONFIG_FILE_NAME: &str = "ghostctl.toml";

/// Load a configuration file from a given path and return the raw `RawToolConfig`.
///
/// This only performs TOML deserialization; use [`load_and_validate`] for the
/// semantic checks.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawToolConfig> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawToolConfig = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and validate it.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ToolConfig> {
    let raw_config = load_from_path(&path)?;
    let config = ToolConfig::try_from(raw_config)?;
    Ok(config)
}

/// Load `ghostctl.toml` from `root` if it exists, otherwise use defaults.
pub fn load_or_default(root: &Path) -> Result<ToolConfig> {
    let path = default_config_path(root);
    if path.is_file() {
        debug!(path = ?path, "loading tool configuration");
        load_and_validate(&path)
    } else {
        debug!(path = ?path, "no tool configuration file; using defaults");
        ToolConfig::try_from(RawToolConfig::default())
    }
}

pub fn default_config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE_NAME)
}
