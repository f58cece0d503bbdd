//! Daemon configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use focusd_core::{DEFAULT_NOTIFY_TIMEOUT, Precedence};
use focusd_ipc::DEFAULT_PEER_DIR;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Daemon settings
    #[serde(default)]
    pub daemon: DaemonConfig,
    /// Socket and notification channel settings
    #[serde(default)]
    pub ipc: IpcConfig,
    /// Stream priority policy
    #[serde(default)]
    pub policy: PolicyConfig,
}

/// Daemon-specific settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self { log_level: default_log_level(), log_format: LogFormat::default() }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

fn default_log_level() -> String {
    "info".to_string()
}

/// IPC settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpcConfig {
    /// Request socket path (optional, uses default if not set)
    pub socket_path: Option<PathBuf>,
    /// Directory holding client notification FIFOs
    #[serde(default = "default_peer_dir")]
    pub peer_dir: PathBuf,
    /// Round-trip timeout for one notification
    #[serde(default = "default_notify_timeout_ms")]
    pub notify_timeout_ms: u64,
}

impl IpcConfig {
    #[must_use]
    pub fn notify_timeout(&self) -> Duration {
        Duration::from_millis(self.notify_timeout_ms)
    }
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            socket_path: None,
            peer_dir: default_peer_dir(),
            notify_timeout_ms: default_notify_timeout_ms(),
        }
    }
}

fn default_peer_dir() -> PathBuf {
    PathBuf::from(DEFAULT_PEER_DIR)
}

fn default_notify_timeout_ms() -> u64 {
    u64::try_from(DEFAULT_NOTIFY_TIMEOUT.as_millis()).unwrap_or(2500)
}

/// Stream priority policy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Which end of the priority range wins
    #[serde(default)]
    pub precedence: Precedence,
    /// External stream-map file; overrides `priorities` when set
    pub stream_map: Option<PathBuf>,
    /// Inline stream type priorities
    #[serde(default = "default_priorities")]
    pub priorities: BTreeMap<String, i32>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            precedence: Precedence::default(),
            stream_map: None,
            priorities: default_priorities(),
        }
    }
}

fn default_priorities() -> BTreeMap<String, i32> {
    [
        ("emergency", 1),
        ("call", 2),
        ("voip", 2),
        ("ringtone", 3),
        ("alarm", 4),
        ("voice-recognition", 5),
        ("notification", 6),
        ("system", 7),
        ("media", 8),
    ]
    .into_iter()
    .map(|(name, priority)| (name.to_string(), priority))
    .collect()
}

/// Load configuration from file or defaults.
pub fn load_config() -> Result<Config> {
    load_config_from(&config_path()?)
}

/// Load configuration from `config_path`, falling back to defaults if absent.
pub fn load_config_from(config_path: &Path) -> Result<Config> {
    if config_path.exists() {
        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {config_path:?}"))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {config_path:?}"))?;
        Ok(config)
    } else {
        info!(?config_path, "Config file not found, using defaults");
        Ok(Config::default())
    }
}

/// Get the configuration file path.
fn config_path() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("org", "focusd", "focusd")
        .context("Could not determine config directory")?;
    Ok(dirs.config_dir().join("config.toml"))
}
