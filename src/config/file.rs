// src/config/file.rs
// File-based configuration from ~/.agent-memory/config.toml

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::AppConfig;

/// Env var that points at an explicit config file
pub const CONFIG_PATH_ENV: &str = "AGENT_MEMORY_CONFIG";

/// Get the config file path (env override, else ~/.agent-memory/config.toml)
pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".agent-memory")
        .join("config.toml")
}

/// Load config from a TOML file. Missing or unparsable files yield `None`.
pub fn load_file(path: &Path) -> Option<AppConfig> {
    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => {
                debug!(path = %path.display(), "Loaded config from file");
                Some(config)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to parse config file");
                None
            }
        },
        Err(_) => {
            debug!(path = %path.display(), "Config file not found, using defaults");
            None
        }
    }
}
