use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;

const APP_DIR: &str = "callvault";

/// Overrides the config file location.
pub const CONFIG_ENV: &str = "CALLVAULT_CONFIG";

pub fn config_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR))
        .context("Unable to determine config directory")
}

pub fn config_file() -> Result<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }
    Ok(config_dir()?.join("config.toml"))
}

pub fn data_dir() -> Result<PathBuf> {
    if let Some(dir) = dirs::data_dir() {
        return Ok(dir.join(APP_DIR));
    }
    if let Some(home) = dirs::home_dir() {
        return Ok(home.join(".local").join("share").join(APP_DIR));
    }
    Err(anyhow!("Unable to determine data directory"))
}

pub fn recordings_dir() -> Result<PathBuf> {
    Ok(data_dir()?.join("recordings"))
}

pub fn remote_dir() -> Result<PathBuf> {
    Ok(data_dir()?.join("remote"))
}

pub fn state_file() -> Result<PathBuf> {
    Ok(data_dir()?.join("state.json"))
}

pub fn db_file() -> Result<PathBuf> {
    Ok(data_dir()?.join("callvault.db"))
}
