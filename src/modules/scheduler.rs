// src/modules/scheduler.rs
//
// Watch loop: Idle -> Polling -> Processing -> Idle, until stopped.
//
// Callers own the key set (watch/unwatch); the loop owns fingerprints. The
// listener mutex is only held for short synchronous sections, never across
// an await.

use crate::error::{Result, WatchError};
use crate::modules::fingerprint_store::{Fingerprint, FingerprintAlgorithm, FingerprintStore};
use crate::modules::key_codec::{self, WatchRegistration};
use crate::modules::listener::{ConfigChange, ConfigChangeHandler};
use crate::modules::transport::{ConfigFetcher, LongPollTransport, DEFAULT_HOLD_TIMEOUT};
use crate::modules::watch_key::WatchKey;
use log::{debug, error, info, warn};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// How long the server is asked to hold each listener request.
    pub hold_timeout: Duration,
    /// Delay after the first consecutive poll failure.
    pub initial_backoff: Duration,
    /// Upper bound for the doubling failure delay.
    pub max_backoff: Duration,
    pub fingerprint_algorithm: FingerprintAlgorithm,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            hold_timeout: DEFAULT_HOLD_TIMEOUT,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            fingerprint_algorithm: FingerprintAlgorithm::Md5,
        }
    }
}

/// Exponential delay between consecutive failed polls.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Option<Duration>,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: None,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let next = match self.current {
            None => self.initial.min(self.max),
            Some(previous) => previous.saturating_mul(2).min(self.max),
        };
        self.current = Some(next);
        next
    }

    pub fn reset(&mut self) {
        self.current = None;
    }
}

struct ListenerEntry {
    key: WatchKey,
    handlers: Vec<Arc<dyn ConfigChangeHandler>>,
}

/// Watched keys in first-watch order, each with its handlers.
///
/// `reset` holds keys whose fingerprint must be forgotten before the next
/// poll, so a new handler is sent the current content on its first check.
#[derive(Default)]
struct ListenerSet {
    entries: Vec<ListenerEntry>,
    reset: HashSet<WatchKey>,
}

impl ListenerSet {
    /// Returns true when `key` was not watched before.
    fn add(&mut self, key: WatchKey, handler: Arc<dyn ConfigChangeHandler>) -> bool {
        self.reset.insert(key.clone());
        if let Some(entry) = self.entries.iter_mut().find(|e| e.key == key) {
            entry.handlers.push(handler);
            return false;
        }
        self.entries.push(ListenerEntry {
            key,
            handlers: vec![handler],
        });
        true
    }

    fn remove(&mut self, key: &WatchKey) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| &e.key != key);
        let removed = self.entries.len() < before;
        if removed {
            self.reset.insert(key.clone());
        }
        removed
    }

    fn take_reset(&mut self) -> HashSet<WatchKey> {
        std::mem::take(&mut self.reset)
    }

    fn keys(&self) -> Vec<WatchKey> {
        self.entries.iter().map(|e| e.key.clone()).collect()
    }

    fn handlers(&self, key: &WatchKey) -> Option<Vec<Arc<dyn ConfigChangeHandler>>> {
        self.entries
            .iter()
            .find(|e| &e.key == key)
            .map(|e| e.handlers.clone())
    }
}

struct Shared {
    listeners: Mutex<ListenerSet>,
    fingerprints: Arc<FingerprintStore>,
    transport: Arc<dyn LongPollTransport>,
    fetcher: Arc<dyn ConfigFetcher>,
    options: WatchOptions,
    key_added: Notify,
}

impl Shared {
    fn listeners(&self) -> std::sync::MutexGuard<'_, ListenerSet> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the current watch list. Also forgets fingerprints of keys
    /// that were watched or unwatched since the previous cycle.
    fn registrations(&self) -> Vec<WatchRegistration> {
        let (keys, reset) = {
            let mut listeners = self.listeners();
            (listeners.keys(), listeners.take_reset())
        };
        for key in &reset {
            self.fingerprints.remove(key);
        }
        self.fingerprints.retain(&keys);
        keys.into_iter()
            .map(|key| {
                let fingerprint = self.fingerprints.get(&key);
                WatchRegistration::new(key, fingerprint)
            })
            .collect()
    }

    async fn process(&self, body: &str) {
        let changed = match key_codec::decode(body) {
            Ok(keys) => keys,
            Err(e) => {
                warn!("Treating undecodable listener response as no change: {}", e);
                return;
            }
        };
        if changed.is_empty() {
            debug!("No config changes reported");
            return;
        }

        info!("Server reported {} changed config(s)", changed.len());
        for key in changed {
            let handlers = self.listeners().handlers(&key);
            let Some(handlers) = handlers else {
                debug!("Ignoring change for unwatched config {}", key);
                continue;
            };
            if let Err(e) = self.refresh(&key, &handlers).await {
                warn!("Keeping stale fingerprint for {}: {}", key, e);
            }
        }
    }

    async fn refresh(
        &self,
        key: &WatchKey,
        handlers: &[Arc<dyn ConfigChangeHandler>],
    ) -> Result<()> {
        let content = self.fetcher.fetch_config(key).await.map_err(|e| match e {
            WatchError::Fetch { .. } => e,
            other => WatchError::Fetch {
                key: key.to_string(),
                reason: other.to_string(),
            },
        })?;

        let change = match content {
            Some(content) => {
                let fingerprint =
                    Fingerprint::compute(&content, self.options.fingerprint_algorithm);
                let previous = self.fingerprints.set(key, fingerprint.clone());
                if previous == fingerprint {
                    debug!("Config {} refetched with unchanged fingerprint", key);
                    return Ok(());
                }
                ConfigChange {
                    key: key.clone(),
                    content,
                    fingerprint,
                }
            }
            None => match self.fingerprints.remove(key) {
                Some(previous) if !previous.is_unknown() => ConfigChange {
                    key: key.clone(),
                    content: String::new(),
                    fingerprint: Fingerprint::unknown(),
                },
                _ => {
                    debug!("Config {} does not exist on the server", key);
                    return Ok(());
                }
            },
        };

        for handler in handlers {
            if let Err(e) = handler.handle_change(&change).await {
                warn!(
                    "Handler {} failed for config {}: {}",
                    handler.name(),
                    key,
                    e
                );
            }
        }
        Ok(())
    }
}

/// Drives the long-poll cycle for a set of watched configs.
pub struct WatchScheduler {
    shared: Arc<Shared>,
    cancellation: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl WatchScheduler {
    pub fn new(
        transport: Arc<dyn LongPollTransport>,
        fetcher: Arc<dyn ConfigFetcher>,
        options: WatchOptions,
    ) -> Self {
        Self::with_fingerprint_store(transport, fetcher, options, Arc::new(FingerprintStore::new()))
    }

    pub fn with_fingerprint_store(
        transport: Arc<dyn LongPollTransport>,
        fetcher: Arc<dyn ConfigFetcher>,
        options: WatchOptions,
        fingerprints: Arc<FingerprintStore>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                listeners: Mutex::new(ListenerSet::default()),
                fingerprints,
                transport,
                fetcher,
                options,
                key_added: Notify::new(),
            }),
            cancellation: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    /// Registers `handler` for `key`. Takes effect from the next poll.
    pub fn watch<H>(&self, key: WatchKey, handler: H)
    where
        H: ConfigChangeHandler + 'static,
    {
        let name = key.to_string();
        let added = self.shared.listeners().add(key, Arc::new(handler));
        if added {
            debug!("Watching config {}", name);
            self.shared.key_added.notify_one();
        }
    }

    /// Stops watching `key` and drops all of its handlers.
    pub fn unwatch(&self, key: &WatchKey) -> bool {
        let removed = self.shared.listeners().remove(key);
        if removed {
            debug!("Stopped watching config {}", key);
        }
        removed
    }

    pub fn watched_keys(&self) -> Vec<WatchKey> {
        self.shared.listeners().keys()
    }

    pub fn fingerprints(&self) -> Arc<FingerprintStore> {
        self.shared.fingerprints.clone()
    }

    /// Spawns the watch loop on the current tokio runtime.
    pub fn start(&self) -> Result<()> {
        if self.cancellation.is_cancelled() {
            return Err(WatchError::Scheduler(
                "scheduler was stopped and cannot be restarted".to_string(),
            ));
        }
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.is_some() {
            return Err(WatchError::Scheduler("scheduler already started".to_string()));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| WatchError::Scheduler(format!("no tokio runtime: {}", e)))?;
        *task = Some(runtime.spawn(run(self.shared.clone(), self.cancellation.clone())));
        Ok(())
    }

    /// Requests the loop to stop. An in-flight poll is allowed to finish; its
    /// response is discarded.
    pub fn stop(&self) {
        if !self.cancellation.is_cancelled() {
            info!("Stopping config watch loop");
            self.cancellation.cancel();
        }
    }

    /// Waits for the loop task to exit. Returns immediately if never started.
    pub async fn join(&self) {
        let handle = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Config watch loop terminated abnormally: {}", e);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for WatchScheduler {
    fn drop(&mut self) {
        self.cancellation.cancel();
    }
}

/// Sleeps for `delay` unless stopped first. Returns false when stopped.
async fn sleep_or_stop(cancellation: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        _ = cancellation.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

async fn run(shared: Arc<Shared>, cancellation: CancellationToken) {
    let mut backoff = Backoff::new(shared.options.initial_backoff, shared.options.max_backoff);
    info!(
        "Config watch loop started (hold timeout {:?})",
        shared.options.hold_timeout
    );

    while !cancellation.is_cancelled() {
        let registrations = shared.registrations();
        if registrations.is_empty() {
            debug!("No watched configs; waiting for a watch registration");
            tokio::select! {
                _ = cancellation.cancelled() => break,
                _ = shared.key_added.notified() => continue,
            }
        }

        let watch_list = match key_codec::encode(&registrations) {
            Ok(body) => body,
            Err(e) => {
                let delay = backoff.next_delay();
                error!("Skipping poll, {}; retrying in {:?}", e, delay);
                if !sleep_or_stop(&cancellation, delay).await {
                    break;
                }
                continue;
            }
        };

        debug!("Polling {} watched config(s)", registrations.len());
        let response = shared
            .transport
            .poll(&watch_list, shared.options.hold_timeout)
            .await;
        if cancellation.is_cancelled() {
            debug!("Stop requested during poll; discarding response");
            break;
        }

        match response {
            Ok(body) => {
                backoff.reset();
                shared.process(&body).await;
            }
            Err(e) => {
                let delay = backoff.next_delay();
                warn!("Long-poll failed: {}; retrying in {:?}", e, delay);
                if !sleep_or_stop(&cancellation, delay).await {
                    break;
                }
            }
        }
    }

    info!("Config watch loop stopped");
}
