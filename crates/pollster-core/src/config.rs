//! Application configuration management.
//!
//! This module handles loading and saving the application configuration:
//! the API base URL, which backend holds the session, the request timeout
//! and the last used username.
//!
//! Configuration is stored at `~/.config/pollster/config.json`. Environment
//! variables override file values.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::DEFAULT_TIMEOUT_SECS;
use crate::auth::{FileStorage, KeyringStorage, MemoryStorage, SessionStore, SlotStorage};

/// Application name used for config directory paths
const APP_NAME: &str = "pollster";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Session file name (file storage backend)
const SESSION_FILE: &str = "session.json";

/// API location used when nothing else is configured
pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8000/api/";

pub const ENV_API_URL: &str = "POLLSTER_API_URL";
pub const ENV_STORAGE: &str = "POLLSTER_STORAGE";
pub const ENV_USERNAME: &str = "POLLSTER_USERNAME";
pub const ENV_PASSWORD: &str = "POLLSTER_PASSWORD";

/// Where the session slots live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    File,
    Keyring,
    Memory,
}

impl FromStr for StorageKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(StorageKind::File),
            "keyring" => Ok(StorageKind::Keyring),
            "memory" => Ok(StorageKind::Memory),
            other => Err(anyhow::anyhow!(
                "Unknown storage backend '{}' (expected file, keyring or memory)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub storage: StorageKind,
    pub request_timeout_secs: u64,
    pub last_username: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            storage: StorageKind::default(),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            last_username: None,
        }
    }
}

impl Config {
    /// Load the config file (defaults when absent), then apply environment overrides
    pub fn load() -> Result<Self> {
        let mut config = Self::load_file()?;
        config.apply_env(|key| std::env::var(key).ok())?;
        debug!(api = %config.api_base_url, storage = ?config.storage, "Config loaded");
        Ok(config)
    }

    fn load_file() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    /// Apply overrides from a variable lookup
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = lookup(ENV_API_URL).filter(|v| !v.trim().is_empty()) {
            self.api_base_url = url;
        }
        if let Some(kind) = lookup(ENV_STORAGE).filter(|v| !v.trim().is_empty()) {
            self.storage = kind.parse()?;
        }
        if let Some(username) = lookup(ENV_USERNAME).filter(|v| !v.trim().is_empty()) {
            self.last_username = Some(username);
        }
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME))
    }

    fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join(CONFIG_FILE))
    }

    /// Location of the session file used by the file backend
    pub fn session_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join(SESSION_FILE))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Open the configured session backend
    pub fn open_session_store(&self) -> Result<Arc<SessionStore>> {
        let storage: Box<dyn SlotStorage> = match self.storage {
            StorageKind::File => Box::new(FileStorage::open(Self::session_path()?)?),
            StorageKind::Keyring => Box::new(KeyringStorage::new()),
            StorageKind::Memory => Box::new(MemoryStorage::new()),
        };
        Ok(Arc::new(SessionStore::new(storage)))
    }
}
