// src/error.rs
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Invalid watch key: {0}")]
    InvalidKey(String),

    #[error("Failed to encode watch list: {0}")]
    Encoding(String),

    #[error("Long-poll transport error: {0}")]
    Transport(String),

    #[error("Failed to decode listener response: {0}")]
    Decode(String),

    #[error("Failed to fetch config {key}: {reason}")]
    Fetch { key: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unsupported fingerprint algorithm: {0}")]
    UnsupportedFingerprintAlgorithm(String),

    #[error("Scheduler error: {0}")]
    Scheduler(String),
}

pub type Result<T> = std::result::Result<T, WatchError>;
