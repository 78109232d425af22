//! Configuration management for RelayDrop.
//!
//! ## Configuration File Locations
//!
//! | Platform | Path |
//! |----------|------|
//! | Linux | `~/.config/relaydrop/config.toml` |
//! | macOS | `~/Library/Application Support/com.relaydrop.RelayDrop/config.toml` |
//! | Windows | `%APPDATA%\relaydrop\RelayDrop\config\config.toml` |
//!
//! ## Example
//!
//! ```rust,ignore
//! use relaydrop_core::config::Config;
//!
//! let config = Config::load()?;
//! println!("Relay: {}", config.relay.url);
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::reassembly::CompletionPolicy;

/// Default relay URL used by clients.
pub const DEFAULT_RELAY_URL: &str = "ws://127.0.0.1:9470/ws";

/// Default base URL of the web receiver that share links point at.
pub const DEFAULT_SHARE_BASE_URL: &str = "http://localhost:3000";

/// Keys accepted by [`Config::get`] and [`Config::set`].
pub const KEYS: &[&str] = &[
    "relay.url",
    "relay.bind",
    "transfer.completion",
    "share.base_url",
    "receive.output_dir",
];

/// Main configuration struct for RelayDrop.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Relay settings
    pub relay: RelayConfig,
    /// Transfer settings
    pub transfer: TransferConfig,
    /// Share link settings
    pub share: ShareConfig,
    /// Receive settings
    pub receive: ReceiveConfig,
}

/// Relay configuration options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// WebSocket URL clients connect to
    pub url: String,
    /// Address `relaydrop relay` listens on
    pub bind: SocketAddr,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_RELAY_URL.to_string(),
            bind: SocketAddr::from(([0, 0, 0, 0], 9470)),
        }
    }
}

/// Transfer configuration options.
///
/// The chunk size is fixed by the protocol and deliberately absent here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// How receivers honour a completion marker that arrives with gaps
    pub completion: CompletionPolicy,
}

/// Share link configuration options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShareConfig {
    /// Base URL of the web receiver
    pub base_url: String,
}

impl Default for ShareConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_SHARE_BASE_URL.to_string(),
        }
    }
}

/// Receive configuration options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiveConfig {
    /// Directory received payloads are written to (current directory if unset)
    pub output_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// If the configuration file doesn't exist, returns the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, falling back to defaults if missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigError(format!("Failed to read config: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| Error::ConfigError(format!("Failed to parse config: {e}")))
    }

    /// Save configuration to the default location.
    ///
    /// Creates the configuration directory if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be written.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be written.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::ConfigError(format!("Failed to create config directory: {e}"))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| Error::ConfigError(format!("Failed to write config: {e}")))
    }

    /// Get the default configuration directory path.
    #[must_use]
    pub fn config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "relaydrop", "RelayDrop")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the full path to the configuration file.
    #[must_use]
    pub fn config_path() -> PathBuf {
        Self::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("config.toml")
    }

    /// Read a value by dotted key, e.g. `relay.url`.
    ///
    /// Returns `None` for unknown keys. An unset optional value reads as an
    /// empty string.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        let value = match key {
            "relay.url" => self.relay.url.clone(),
            "relay.bind" => self.relay.bind.to_string(),
            "transfer.completion" => self.transfer.completion.to_string(),
            "share.base_url" => self.share.base_url.clone(),
            "receive.output_dir" => self
                .receive
                .output_dir
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            _ => return None,
        };
        Some(value)
    }

    /// Set a value by dotted key.
    ///
    /// An empty value clears `receive.output_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for unknown keys or values that do not
    /// parse.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let invalid = |reason: String| Error::InvalidConfig {
            key: key.to_string(),
            reason,
        };

        match key {
            "relay.url" => {
                let parsed = url::Url::parse(value).map_err(|e| invalid(e.to_string()))?;
                if !matches!(parsed.scheme(), "ws" | "wss") {
                    return Err(invalid("relay URL must use ws:// or wss://".to_string()));
                }
                self.relay.url = value.to_string();
            }
            "relay.bind" => {
                self.relay.bind = value.parse().map_err(|e| invalid(format!("{e}")))?;
            }
            "transfer.completion" => {
                self.transfer.completion = value.parse().map_err(invalid)?;
            }
            "share.base_url" => {
                url::Url::parse(value).map_err(|e| invalid(e.to_string()))?;
                self.share.base_url = value.trim_end_matches('/').to_string();
            }
            "receive.output_dir" => {
                self.receive.output_dir = if value.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(value))
                };
            }
            _ => return Err(invalid("unknown configuration key".to_string())),
        }
        Ok(())
    }
}
