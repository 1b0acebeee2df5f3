// src/modules/listener.rs
use crate::error::Result;
use crate::modules::fingerprint_store::Fingerprint;
use crate::modules::watch_key::WatchKey;
use async_trait::async_trait;
use log::info;

/// Delivered to handlers when a watched config changes.
///
/// A deleted config arrives with empty content and an unknown fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigChange {
    pub key: WatchKey,
    pub content: String,
    pub fingerprint: Fingerprint,
}

impl ConfigChange {
    pub fn is_deleted(&self) -> bool {
        self.fingerprint.is_unknown()
    }
}

#[async_trait]
pub trait ConfigChangeHandler: Send + Sync {
    fn name(&self) -> &str {
        "anonymous"
    }

    async fn handle_change(&self, change: &ConfigChange) -> Result<()>;
}

#[async_trait]
impl<F> ConfigChangeHandler for F
where
    F: Fn(&ConfigChange) + Send + Sync,
{
    async fn handle_change(&self, change: &ConfigChange) -> Result<()> {
        self(change);
        Ok(())
    }
}

/// Logs every change it receives.
pub struct LoggingChangeHandler;

impl LoggingChangeHandler {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LoggingChangeHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConfigChangeHandler for LoggingChangeHandler {
    fn name(&self) -> &str {
        "LoggingChangeHandler"
    }

    async fn handle_change(&self, change: &ConfigChange) -> Result<()> {
        if change.is_deleted() {
            info!("Config {} was deleted", change.key);
        } else {
            info!(
                "Config {} changed: {} bytes, fingerprint {}",
                change.key,
                change.content.len(),
                change.fingerprint
            );
        }
        Ok(())
    }
}
