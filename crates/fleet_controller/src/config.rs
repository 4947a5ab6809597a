//! Configuration management for the fleet controller.
//!
//! This module handles loading, validation, and conversion of the controller
//! configuration from a TOML file. Every section is optional; missing values
//! fall back to their defaults.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use server_fleet::{BroadcastColors, RegistryConfig, WireEncoding};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Application configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Inbound listener for socket backends
    pub listener: ListenerSettings,
    /// Remote console dialing
    pub rcon: RconSettings,
    /// Wire format and chat styling shared by every backend
    pub sync: SyncSettings,
    /// Persisted connection parameters
    pub store: StoreSettings,
    /// Logging configuration settings
    pub logging: LoggingSettings,
}

/// Where socket backends dial in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerSettings {
    /// Whether to accept socket backends at all
    pub enabled: bool,
    /// Network address to bind to (e.g., "127.0.0.1:8765")
    pub bind_address: String,
}

impl Default for ListenerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "127.0.0.1:8765".to_string(),
        }
    }
}

/// How remote consoles are reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RconSettings {
    /// Host every remote console listens on; ports come from the store
    pub host: String,
    /// Bound on a single request, and on opening a session, in seconds
    pub request_timeout_secs: u64,
}

impl Default for RconSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            request_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Transform applied to socket frames: "plain" or "base64"
    pub wire_encoding: WireEncoding,
    pub color_source: String,
    pub color_player: String,
    pub color_message: String,
}

impl Default for SyncSettings {
    fn default() -> Self {
        let colors = BroadcastColors::default();
        Self {
            wire_encoding: WireEncoding::default(),
            color_source: colors.source,
            color_player: colors.player,
            color_message: colors.message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// TOML file holding the ordered server list
    pub path: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            path: "data/servers.toml".to_string(),
        }
    }
}

/// Logging system configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, writes the default configuration there and
    /// returns it.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    pub async fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content)
                .await
                .with_context(|| format!("writing default configuration to {}", path.display()))?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Checks addresses, timeouts, colors, the store path and the log level.
    ///
    /// # Returns
    ///
    /// `Ok(())` if the configuration is valid, or an error string describing the issue.
    pub fn validate(&self) -> Result<(), String> {
        if self.listener.bind_address.parse::<SocketAddr>().is_err() {
            return Err(format!("Invalid bind address: {}", &self.listener.bind_address));
        }

        if self.rcon.host.parse::<IpAddr>().is_err() {
            return Err(format!("Invalid RCON host: {}", &self.rcon.host));
        }

        if self.rcon.request_timeout_secs == 0 {
            return Err("RCON request timeout must be at least one second".to_string());
        }

        let colors = [
            ("color_source", &self.sync.color_source),
            ("color_player", &self.sync.color_player),
            ("color_message", &self.sync.color_message),
        ];
        if let Some((key, _)) = colors.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(format!("Broadcast color {key} cannot be empty"));
        }

        if self.store.path.trim().is_empty() {
            return Err("Store path cannot be empty".to_string());
        }

        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {VALID_LOG_LEVELS:?}",
                &self.logging.level
            ));
        }

        Ok(())
    }

    /// Translates the file settings into the registry's configuration.
    pub fn to_registry_config(&self) -> anyhow::Result<RegistryConfig> {
        Ok(RegistryConfig {
            rcon_host: self
                .rcon
                .host
                .parse()
                .with_context(|| format!("invalid RCON host {}", self.rcon.host))?,
            request_timeout: Duration::from_secs(self.rcon.request_timeout_secs),
            wire_encoding: self.sync.wire_encoding,
            colors: BroadcastColors {
                source: self.sync.color_source.clone(),
                player: self.sync.color_player.clone(),
                message: self.sync.color_message.clone(),
            },
        })
    }

    pub fn bind_address(&self) -> anyhow::Result<SocketAddr> {
        self.listener
            .bind_address
            .parse()
            .with_context(|| format!("invalid bind address {}", self.listener.bind_address))
    }

    pub fn store_path(&self) -> PathBuf {
        PathBuf::from(&self.store.path)
    }
}
