//! Configuration management for db-courier.
//!
//! Handles loading the dispatcher configuration from TOML files, with
//! serde-supplied defaults for every connection parameter.

use crate::error::{CourierError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration structure.
///
/// The dispatcher reads its settings from the `[database]` table; a host
/// application may embed this table inside a larger configuration file and
/// deserialize only this struct from it.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Database dispatcher configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
}

/// Connection parameters consumed by the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Whether the dispatcher runs at all. Disabled by default; a disabled
    /// dispatcher rejects every submission and spawns no worker.
    #[serde(default)]
    pub enabled: bool,

    /// Database user.
    #[serde(default = "default_username")]
    pub username: String,

    /// Database password.
    #[serde(default = "default_password")]
    pub password: String,

    /// Database server host.
    #[serde(default = "default_host")]
    pub host: String,

    /// Database server port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Database (schema) name.
    #[serde(default = "default_database")]
    pub database: String,
}

fn default_username() -> String {
    "user".to_string()
}

fn default_password() -> String {
    "password".to_string()
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    3306
}

fn default_database() -> String {
    "db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            username: default_username(),
            password: default_password(),
            host: default_host(),
            port: default_port(),
            database: default_database(),
        }
    }
}

impl DatabaseConfig {
    /// Returns a display-safe string (no password) for logging purposes.
    pub fn display_string(&self) -> String {
        format!(
            "{}@{}:{}/{}",
            self.username, self.host, self.port, self.database
        )
    }
}

impl Config {
    /// Loads configuration from a TOML file.
    ///
    /// A missing file yields the defaults (dispatcher disabled).
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| CourierError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    /// Parses configuration from a TOML string.
    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            CourierError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })
    }
}
