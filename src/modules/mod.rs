// src/modules/mod.rs

pub mod fingerprint_store;
pub mod key_codec;
pub mod listener;
pub mod scheduler;
pub mod transport;
pub mod watch_key;

// Re-export for easier access
pub use fingerprint_store::{Fingerprint, FingerprintAlgorithm, FingerprintStore};
pub use key_codec::WatchRegistration;
pub use listener::{ConfigChange, ConfigChangeHandler, LoggingChangeHandler};
pub use scheduler::{Backoff, WatchOptions, WatchScheduler};
pub use transport::{ConfigFetcher, LongPollTransport, DEFAULT_HOLD_TIMEOUT};
pub use watch_key::{WatchKey, DEFAULT_GROUP};
