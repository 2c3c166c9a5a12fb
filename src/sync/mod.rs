//! State hashing and change-driven persistence.
//!
//! The registry and the selection memory are mirrored to an external
//! [`KvStore`] so a cold-started process can pick up where the previous one
//! left off. Four collections are tracked, each under a stable key:
//!
//! | collection | key suffix | content |
//! |---|---|---|
//! | [`Collection::Animes`] | `animes` | anime records with their episodes |
//! | [`Collection::EpisodeIds`] | `episodeIds` | FIFO episode-id list |
//! | [`Collection::EpisodeNum`] | `episodeNum` | next anime/episode ids |
//! | [`Collection::Selection`] | `lastSelectMap` | keyword → anime id |
//!
//! # Change detection
//!
//! [`StateSync::snapshot`] serializes each collection to JSON and takes its
//! blake3 digest (order-sensitive). [`StateSync::sync_if_changed`] compares
//! the digests with the last persisted ones and writes only the collections
//! that differ, one write each. A field's persisted digest is updated only
//! after its write succeeds, so a failed write is retried by the next sync.
//!
//! # Failure policy
//!
//! The store is best-effort. Failures and timeouts are logged and counted;
//! in-memory state stays authoritative and no engine operation fails because
//! of the store.

pub mod store;
#[cfg(feature = "upstash")]
pub mod upstash;

pub use store::{KvStore, MemoryStore};
#[cfg(feature = "upstash")]
pub use upstash::UpstashStore;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::cache::BoundedCache;
use crate::registry::{Counters, EpisodeRef, IdentityRegistry, RegistryExport};
use crate::telemetry;
use crate::types::AnimeRecord;
use crate::{HuginnError, Result};

/// Settings for the sync layer.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Prefix prepended to every key. Default: `"huginn:"`.
    pub key_prefix: String,
    /// Timeout for each store call. Default: 5 seconds.
    pub timeout: Duration,
    /// Optional expiry for written values. Default: none.
    pub expiry: Option<Duration>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            key_prefix: "huginn:".to_string(),
            timeout: Duration::from_secs(5),
            expiry: None,
        }
    }
}

impl SyncConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn expiry(mut self, expiry: Duration) -> Self {
        self.expiry = Some(expiry);
        self
    }
}

/// A persisted collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Collection {
    Animes,
    EpisodeIds,
    EpisodeNum,
    Selection,
}

impl Collection {
    pub const ALL: [Collection; 4] = [
        Collection::Animes,
        Collection::EpisodeIds,
        Collection::EpisodeNum,
        Collection::Selection,
    ];

    /// Stable key suffix in the external store.
    pub fn key_name(&self) -> &'static str {
        match self {
            Collection::Animes => "animes",
            Collection::EpisodeIds => "episodeIds",
            Collection::EpisodeNum => "episodeNum",
            Collection::Selection => "lastSelectMap",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key_name())
    }
}

/// Content fingerprints of the tracked collections (hex blake3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateHashSnapshot {
    pub animes_hash: String,
    pub episode_ids_hash: String,
    pub episode_num_hash: String,
    pub selection_hash: String,
}

impl StateHashSnapshot {
    /// Digest of one collection.
    pub fn get(&self, collection: Collection) -> &str {
        match collection {
            Collection::Animes => &self.animes_hash,
            Collection::EpisodeIds => &self.episode_ids_hash,
            Collection::EpisodeNum => &self.episode_num_hash,
            Collection::Selection => &self.selection_hash,
        }
    }
}

/// Outcome of one [`StateSync::sync_if_changed`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Collections written successfully.
    pub written: Vec<Collection>,
    /// Collections whose write failed; they stay dirty.
    pub failed: Vec<Collection>,
}

impl SyncReport {
    /// Whether nothing needed writing.
    pub fn is_noop(&self) -> bool {
        self.written.is_empty() && self.failed.is_empty()
    }
}

/// Selection memory as tracked by the sync layer.
pub type SelectionMemory = BoundedCache<String, i64>;

/// Snapshots registry/selection state and mirrors it to a [`KvStore`].
pub struct StateSync {
    registry: Arc<IdentityRegistry>,
    selection: Arc<SelectionMemory>,
    store: Option<Arc<dyn KvStore>>,
    config: SyncConfig,
    persisted: Mutex<HashMap<Collection, String>>,
    /// Serializes whole sync runs.
    running: tokio::sync::Mutex<()>,
}

impl StateSync {
    /// `store = None` keeps everything in memory: syncs and rehydration are
    /// no-ops.
    pub fn new(
        registry: Arc<IdentityRegistry>,
        selection: Arc<SelectionMemory>,
        store: Option<Arc<dyn KvStore>>,
        config: SyncConfig,
    ) -> Self {
        Self {
            registry,
            selection,
            store,
            config,
            persisted: Mutex::new(HashMap::new()),
            running: tokio::sync::Mutex::new(()),
        }
    }

    pub fn store(&self) -> Option<&Arc<dyn KvStore>> {
        self.store.as_ref()
    }

    /// Fingerprint the current in-memory state.
    pub fn snapshot(&self) -> Result<StateHashSnapshot> {
        let payloads = self.payloads()?;
        Ok(snapshot_of(&payloads))
    }

    /// Digests as of the last successful write (or rehydration), if complete.
    pub fn persisted_snapshot(&self) -> Option<StateHashSnapshot> {
        let persisted = self.persisted();
        let get = |c: Collection| persisted.get(&c).cloned();
        Some(StateHashSnapshot {
            animes_hash: get(Collection::Animes)?,
            episode_ids_hash: get(Collection::EpisodeIds)?,
            episode_num_hash: get(Collection::EpisodeNum)?,
            selection_hash: get(Collection::Selection)?,
        })
    }

    /// Write every collection whose digest changed since its last
    /// successful write. Never fails: problems are logged and reported.
    #[instrument(skip(self))]
    pub async fn sync_if_changed(&self) -> SyncReport {
        let Some(store) = self.store.clone() else {
            return SyncReport::default();
        };
        let _running = self.running.lock().await;

        let payloads = match self.payloads() {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "failed to serialize state, skipping sync");
                return SyncReport::default();
            }
        };

        let dirty: Vec<(Collection, String, String)> = {
            let persisted = self.persisted();
            payloads
                .into_iter()
                .filter_map(|(collection, body)| {
                    let hash = digest(&body);
                    (persisted.get(&collection) != Some(&hash)).then_some((collection, body, hash))
                })
                .collect()
        };
        if dirty.is_empty() {
            return SyncReport::default();
        }

        let writes = dirty.iter().map(|(collection, body, _)| {
            let store = store.clone();
            let key = self.key(*collection);
            async move { self.write(store.as_ref(), &key, body).await }
        });
        let results = join_all(writes).await;

        let mut report = SyncReport::default();
        let mut persisted = self.persisted();
        for ((collection, _, hash), result) in dirty.into_iter().zip(results) {
            match result {
                Ok(()) => {
                    persisted.insert(collection, hash);
                    report.written.push(collection);
                    metrics::counter!(telemetry::STORE_WRITES_TOTAL,
                        "collection" => collection.key_name(),
                        "status" => "ok",
                    )
                    .increment(1);
                }
                Err(e) => {
                    warn!(%collection, store = store.name(), error = %e, "state write failed");
                    report.failed.push(collection);
                    metrics::counter!(telemetry::STORE_WRITES_TOTAL,
                        "collection" => collection.key_name(),
                        "status" => "error",
                    )
                    .increment(1);
                }
            }
        }
        debug!(written = report.written.len(), failed = report.failed.len(), "state sync finished");
        report
    }

    /// Load persisted collections into the registry and selection memory.
    ///
    /// Absent keys are not errors. An unreachable store or a corrupt value
    /// leaves the corresponding collection empty and is only logged.
    #[instrument(skip(self))]
    pub async fn rehydrate(&self) {
        let Some(store) = self.store.clone() else {
            return;
        };
        let _running = self.running.lock().await;

        let reads = Collection::ALL.map(|collection| {
            let store = store.clone();
            let key = self.key(collection);
            async move { (collection, self.read(store.as_ref(), &key).await) }
        });
        let mut loaded: HashMap<Collection, String> = HashMap::new();
        let mut reachable = true;
        for (collection, result) in join_all(reads).await {
            match result {
                Ok(Some(body)) => {
                    loaded.insert(collection, body);
                }
                Ok(None) => {}
                Err(e) => {
                    reachable = false;
                    warn!(%collection, store = store.name(), error = %e, "state read failed");
                }
            }
        }

        let animes: Vec<AnimeRecord> = parse(&loaded, Collection::Animes).unwrap_or_default();
        let episode_ids: Vec<EpisodeRef> =
            parse(&loaded, Collection::EpisodeIds).unwrap_or_default();
        let counters: Counters = parse(&loaded, Collection::EpisodeNum).unwrap_or_default();
        let selection: Vec<(String, i64)> =
            parse(&loaded, Collection::Selection).unwrap_or_default();

        if !animes.is_empty() || loaded.contains_key(&Collection::EpisodeNum) {
            self.registry.restore(RegistryExport {
                animes,
                episode_ids,
                counters,
            });
        }
        if !selection.is_empty() {
            self.selection.replace_all(selection);
        }

        // Record what the store holds so the next sync only writes real
        // changes. Keys that are absent match an empty local collection.
        // After a failed read nothing is recorded and the next sync rewrites.
        if reachable {
            let current = self.payloads().unwrap_or_default();
            let mut persisted = self.persisted();
            for (collection, body) in current {
                let stored = loaded.get(&collection).unwrap_or(&body);
                persisted.insert(collection, digest(stored));
            }
        }

        info!(
            animes = self.registry.len(),
            episodes = self.registry.episode_count(),
            selections = self.selection.len(),
            store = store.name(),
            "state rehydrated"
        );
    }

    /// Forget persisted digests so the next sync rewrites everything.
    pub fn mark_all_dirty(&self) {
        self.persisted().clear();
    }

    fn payloads(&self) -> Result<Vec<(Collection, String)>> {
        let export = self.registry.export();
        let selection = self.selection.entries();
        Ok(vec![
            (Collection::Animes, serde_json::to_string(&export.animes)?),
            (
                Collection::EpisodeIds,
                serde_json::to_string(&export.episode_ids)?,
            ),
            (
                Collection::EpisodeNum,
                serde_json::to_string(&export.counters)?,
            ),
            (Collection::Selection, serde_json::to_string(&selection)?),
        ])
    }

    fn key(&self, collection: Collection) -> String {
        format!("{}{}", self.config.key_prefix, collection.key_name())
    }

    async fn write(&self, store: &dyn KvStore, key: &str, body: &str) -> Result<()> {
        let call = async {
            match self.config.expiry {
                Some(ttl) => store.set_with_expiry(key, body, ttl).await,
                None => store.set(key, body).await,
            }
        };
        tokio::time::timeout(self.config.timeout, call)
            .await
            .map_err(|_| HuginnError::Timeout {
                operation: "store write",
                after: self.config.timeout,
            })?
    }

    async fn read(&self, store: &dyn KvStore, key: &str) -> Result<Option<String>> {
        tokio::time::timeout(self.config.timeout, store.get(key))
            .await
            .map_err(|_| HuginnError::Timeout {
                operation: "store read",
                after: self.config.timeout,
            })?
    }

    fn persisted(&self) -> std::sync::MutexGuard<'_, HashMap<Collection, String>> {
        self.persisted.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn digest(body: &str) -> String {
    blake3::hash(body.as_bytes()).to_hex().to_string()
}

fn snapshot_of(payloads: &[(Collection, String)]) -> StateHashSnapshot {
    let hash = |c: Collection| {
        payloads
            .iter()
            .find(|(p, _)| *p == c)
            .map(|(_, body)| digest(body))
            .unwrap_or_default()
    };
    StateHashSnapshot {
        animes_hash: hash(Collection::Animes),
        episode_ids_hash: hash(Collection::EpisodeIds),
        episode_num_hash: hash(Collection::EpisodeNum),
        selection_hash: hash(Collection::Selection),
    }
}

fn parse<T: for<'de> Deserialize<'de>>(
    loaded: &HashMap<Collection, String>,
    collection: Collection,
) -> Option<T> {
    let body = loaded.get(&collection)?;
    match serde_json::from_str(body) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(%collection, error = %e, "corrupt persisted state, ignoring");
            None
        }
    }
}
