// src/config.rs
use crate::error::{Result as WatchResult, WatchError};
use crate::modules::fingerprint_store::FingerprintAlgorithm;
use crate::modules::scheduler::WatchOptions;
use crate::modules::watch_key::{WatchKey, DEFAULT_GROUP};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "nacos-watcher.toml";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_server_addr")]
    pub server_addr: String,
    /// Namespace applied to watch entries that do not name one.
    #[serde(default)]
    pub tenant: String,
    #[serde(default = "default_hold_timeout_ms")]
    pub hold_timeout_ms: u64,
    /// Timeout for plain (non long-poll) requests such as config fetches.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_fingerprint_algorithm")]
    pub fingerprint_algorithm: String, // "md5" or "sha256"
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default, rename = "watch")]
    pub watches: Vec<WatchEntryConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WatchEntryConfig {
    pub data_id: String,
    #[serde(default = "default_group")]
    pub group: String,
    #[serde(default)]
    pub tenant: Option<String>,
}

fn default_server_addr() -> String {
    "http://127.0.0.1:8848".to_string()
}

fn default_hold_timeout_ms() -> u64 {
    30_000
}

fn default_request_timeout_ms() -> u64 {
    5_000
}

fn default_initial_backoff_ms() -> u64 {
    1_000
}

fn default_max_backoff_ms() -> u64 {
    60_000
}

fn default_fingerprint_algorithm() -> String {
    "md5".to_string()
}

fn default_user_agent() -> String {
    "nacos-config-watcher/0.1.0".to_string()
}

fn default_group() -> String {
    DEFAULT_GROUP.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_addr: default_server_addr(),
            tenant: String::new(),
            hold_timeout_ms: default_hold_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            fingerprint_algorithm: default_fingerprint_algorithm(),
            user_agent: default_user_agent(),
            watches: Vec::new(),
        }
    }
}

impl Config {
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let path = config_path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file: {:?}", path))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML from config file: {:?}", path))?;
        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn watch_options(&self) -> WatchResult<WatchOptions> {
        if self.max_backoff_ms < self.initial_backoff_ms {
            return Err(WatchError::Config(format!(
                "max_backoff_ms ({}) must not be below initial_backoff_ms ({})",
                self.max_backoff_ms, self.initial_backoff_ms
            )));
        }
        Ok(WatchOptions {
            hold_timeout: Duration::from_millis(self.hold_timeout_ms),
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            fingerprint_algorithm: self.fingerprint_algorithm.parse::<FingerprintAlgorithm>()?,
        })
    }

    /// Validated keys for every `[[watch]]` entry, in file order.
    pub fn watch_keys(&self) -> WatchResult<Vec<WatchKey>> {
        self.watches
            .iter()
            .map(|entry| {
                let tenant = entry.tenant.as_deref().unwrap_or(&self.tenant);
                WatchKey::new(&entry.data_id, &entry.group, tenant)
            })
            .collect()
    }
}
