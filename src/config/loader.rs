// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Load a configuration file and return the raw, unvalidated config.
///
/// This only performs TOML deserialization. Use [`load_and_validate`] for
/// the typed config.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Like [`load_from_path`], but a missing file yields the defaults.
///
/// The bot can be driven purely by CLI flags, so the config file is
/// optional.
pub fn load_or_default(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    if !path.exists() {
        debug!(path = %path.display(), "config file not found; using defaults");
        return Ok(RawConfigFile::default());
    }
    load_from_path(path)
}

/// Load, apply `overrides` (typically CLI flags), and validate.
pub fn load_and_validate(
    path: impl AsRef<Path>,
    overrides: impl FnOnce(&mut RawConfigFile),
) -> Result<ConfigFile> {
    let mut raw = load_or_default(path)?;
    overrides(&mut raw);
    ConfigFile::try_from(raw)
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("chatshell.toml")
}
