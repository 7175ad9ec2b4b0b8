//! Server configuration loading.
//!
//! Engine executables, pool sizing, and the listen address come from a TOML
//! file (`coach.toml` by default, overridable via `COACH_CONFIG`).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use engine_pool::EngineOptions;

/// Errors that can occur when loading or parsing configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file does not exist.
    #[error("config file not found: {0}")]
    NotFound(PathBuf),
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse the configuration file as valid TOML.
    #[error("failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
}

/// Per-flavor engine configuration tables.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EnginesConfig {
    /// Strength-adjustable engine serving suggestions.
    pub suggestion: EngineOptions,
    /// Full-strength engine serving analysis.
    pub analysis: EngineOptions,
}

/// Main server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CoachConfig {
    /// Address the server binds; localhost-only by default.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    pub engines: EnginesConfig,
}

fn default_listen_addr() -> String {
    "127.0.0.1:8765".to_string()
}

impl CoachConfig {
    /// Load the configuration from [`Self::config_path()`].
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Path to the configuration file: `COACH_CONFIG` if set, otherwise
    /// `coach.toml` in the working directory.
    pub fn config_path() -> PathBuf {
        std::env::var_os("COACH_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("coach.toml"))
    }

    /// Load and parse a configuration file.
    pub fn load_from(path: &PathBuf) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.clone()));
        }
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}
