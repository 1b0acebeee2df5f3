// src/modules/fingerprint_store.rs
use crate::error::{Result, WatchError};
use crate::modules::watch_key::WatchKey;
use log::debug;
use md5::Md5;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::{PoisonError, RwLock};

/// Hash used to summarise config content.
///
/// The Nacos server compares the client fingerprint against the MD5 of its
/// stored content, so `Md5` is the only choice that lets an unchanged key stay
/// quiet against a real server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FingerprintAlgorithm {
    #[default]
    Md5,
    Sha256,
}

impl FromStr for FingerprintAlgorithm {
    type Err = WatchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "md5" => Ok(Self::Md5),
            "sha256" => Ok(Self::Sha256),
            other => Err(WatchError::UnsupportedFingerprintAlgorithm(other.to_string())),
        }
    }
}

/// Last observed content summary for a key. Empty means unknown.
#[derive(Debug, Clone, PartialEq, Eq, Default, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn unknown() -> Self {
        Self(String::new())
    }

    pub fn compute(content: &str, algorithm: FingerprintAlgorithm) -> Self {
        let digest = match algorithm {
            FingerprintAlgorithm::Md5 => hex::encode(Md5::digest(content.as_bytes())),
            FingerprintAlgorithm::Sha256 => hex::encode(Sha256::digest(content.as_bytes())),
        };
        Self(digest)
    }

    pub fn is_unknown(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Fingerprint {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Last-known fingerprint per watched key.
///
/// Only the watch loop writes; callers and the encode step read. A poisoned
/// lock is recovered since every write replaces a whole entry.
#[derive(Debug, Default)]
pub struct FingerprintStore {
    entries: RwLock<HashMap<WatchKey, Fingerprint>>,
}

impl FingerprintStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &WatchKey) -> Fingerprint {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    pub fn contains(&self, key: &WatchKey) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// Stores `fingerprint` and returns the previous one (unknown if none).
    pub fn set(&self, key: &WatchKey, fingerprint: Fingerprint) -> Fingerprint {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), fingerprint)
            .unwrap_or_default()
    }

    pub fn remove(&self, key: &WatchKey) -> Option<Fingerprint> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
    }

    /// Drops every entry whose key is not in `active`.
    pub fn retain(&self, active: &[WatchKey]) {
        let active: HashSet<&WatchKey> = active.iter().collect();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|key, _| active.contains(key));
        if entries.len() < before {
            debug!("Pruned {} stale fingerprints", before - entries.len());
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
