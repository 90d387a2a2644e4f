//! Client configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (`--config` flag, which also reads `FRAMECHAT_CONFIG`)
//! 3. Environment variables
//! 4. Command-line flags (applied by the caller)

use framechat_protocol::DEFAULT_PORT;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Display name for the local prompt. Required; never sent on the wire.
    pub username: String,
    /// Server hostname or IP address.
    pub host: String,
    /// Server port.
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            username: String::new(),
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl Config {
    /// Loads configuration from an optional file, then applies environment
    /// variable overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        if let Ok(username) = std::env::var("FRAMECHAT_USERNAME") {
            self.username = username;
        }
        if let Ok(host) = std::env::var("FRAMECHAT_HOST") {
            self.host = host;
        }
        if let Ok(port) = std::env::var("FRAMECHAT_PORT") {
            if let Ok(parsed) = port.parse() {
                self.port = parsed;
            }
        }
    }

    /// Checks that all required fields are present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.username.trim().is_empty() {
            return Err(ConfigError::MissingUsername);
        }
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("cannot parse config file {0}: {1}")]
    Parse(PathBuf, String),

    #[error("no username configured; set `username` in the config file or FRAMECHAT_USERNAME")]
    MissingUsername,
}
