//! Server configuration
//!
//! Read from a TOML file: `SKULK_CONFIG` if set, otherwise `config.toml`
//! in the platform config directory. A missing file means defaults.
//! `PORT` overrides the configured port.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use skulk_core::GameRules;
use skulk_net::{DEFAULT_MAX_CONNECTIONS, DEFAULT_PORT};
use tracing::{debug, info, warn};

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub max_connections: usize,
    pub rules: GameRules,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            rules: GameRules::default(),
        }
    }
}

impl ServerConfig {
    /// Load using the process environment
    pub fn load() -> Result<Self> {
        let path = std::env::var_os("SKULK_CONFIG")
            .map(PathBuf::from)
            .or_else(default_path);
        let port = std::env::var("PORT").ok();
        Self::load_from(path.as_deref(), port.as_deref())
    }

    /// Load from an explicit file and optional port override
    pub fn load_from(path: Option<&Path>, port: Option<&str>) -> Result<Self> {
        let mut config = match path {
            Some(path) if path.exists() => {
                info!(path = %path.display(), "Loading config");
                Self::parse(&std::fs::read_to_string(path)?)?
            }
            Some(path) => {
                debug!(path = %path.display(), "No config file, using defaults");
                Self::default()
            }
            None => Self::default(),
        };

        if let Some(raw) = port {
            match raw.trim().parse() {
                Ok(port) => config.port = port,
                Err(_) => warn!(value = %raw, "Ignoring invalid PORT"),
            }
        }

        Ok(config)
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}

fn default_path() -> Option<PathBuf> {
    let dirs = ProjectDirs::from("dev", "skulk", "skulk")?;
    Some(dirs.config_dir().join("config.toml"))
}
