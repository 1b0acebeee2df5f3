// src/lib.rs
//! Long-polling change watcher for Nacos-style configuration servers.
//!
//! A [`WatchScheduler`] keeps one listener request open against the server,
//! refetches every config the server reports as changed and hands the new
//! content to the handlers registered for it.

pub mod config;
pub mod error;
pub mod http_client;
pub mod modules;

pub use error::{Result, WatchError};
pub use http_client::NacosHttpClient;
pub use modules::{
    ConfigChange, ConfigChangeHandler, ConfigFetcher, Fingerprint, FingerprintAlgorithm,
    FingerprintStore, LongPollTransport, WatchKey, WatchOptions, WatchScheduler,
};
