// src/modules/transport.rs
use crate::error::Result;
use crate::modules::watch_key::WatchKey;
use async_trait::async_trait;
use std::time::Duration;

/// Default time the server is asked to hold a listener request.
pub const DEFAULT_HOLD_TIMEOUT: Duration = Duration::from_millis(30_000);

const MIN_TIMEOUT_GRACE: Duration = Duration::from_secs(1);

/// Client-side timeout for a long-poll held for `hold`. Always strictly
/// greater than `hold` so a server answering at the end of the hold window
/// is not cut off.
pub fn long_poll_timeout(hold: Duration) -> Duration {
    hold + (hold / 2).max(MIN_TIMEOUT_GRACE)
}

#[async_trait]
pub trait LongPollTransport: Send + Sync {
    /// Sends the encoded watch list and waits for the server to answer,
    /// either with changed keys or with an empty body once `hold` elapses.
    async fn poll(&self, watch_list: &str, hold: Duration) -> Result<String>;
}

#[async_trait]
pub trait ConfigFetcher: Send + Sync {
    /// Fetches the current content of `key`. `Ok(None)` means the server has
    /// no such config.
    async fn fetch_config(&self, key: &WatchKey) -> Result<Option<String>>;
}
