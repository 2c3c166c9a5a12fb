//! External key-value store contract.
//!
//! The sync layer is the only consumer. Values are UTF-8 JSON documents;
//! every write is a whole-value overwrite under a stable key, so repeated or
//! concurrent writes of the same content are harmless.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::{HuginnError, Result};

/// Minimal key-value store used for state persistence.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Store name for logging/debugging.
    fn name(&self) -> &str;

    /// Read a value; `Ok(None)` when the key is absent.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value without expiry.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Write a value that expires after `ttl`.
    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Health probe. Never errors; an unreachable store is simply unhealthy.
    async fn ping(&self) -> bool;
}

/// In-process [`KvStore`].
///
/// Useful as a default when no external store is configured and in tests:
/// it counts writes and can be switched offline to simulate an outage.
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, (String, Option<Instant>)>>,
    writes: AtomicUsize,
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `set`/`set_with_expiry` calls so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make every call fail (or succeed again) with `ExternalStoreUnavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Keys currently stored (expired keys excluded), sorted.
    pub fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<String> = values
            .iter()
            .filter(|(_, (_, expires))| expires.is_none_or(|at| at > now))
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(HuginnError::ExternalStoreUnavailable(
                "memory store is offline".to_string(),
            ));
        }
        Ok(())
    }

    fn insert(&self, key: &str, value: &str, expires: Option<Instant>) {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), (value.to_string(), expires));
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.check_online()?;
        let now = Instant::now();
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(values
            .get(key)
            .filter(|(_, expires)| expires.is_none_or(|at| at > now))
            .map(|(v, _)| v.clone()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.check_online()?;
        self.insert(key, value, None);
        Ok(())
    }

    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.check_online()?;
        self.insert(key, value, Some(Instant::now() + ttl));
        Ok(())
    }

    async fn ping(&self) -> bool {
        !self.offline.load(Ordering::SeqCst)
    }
}
