//! Builder for configuring engine instances

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use super::{CommentCache, Huginn};
use crate::Result;
use crate::cache::{CacheConfig, HistoryConfig, RequestHistory};
use crate::danmu::DanmuOptions;
use crate::registry::{IdentityRegistry, RegistryConfig};
use crate::sources::{DEFAULT_SOURCE_TIMEOUT, FanOut, RetryConfig, SearchCache, Source, SourceTable};
use crate::sync::{KvStore, SelectionMemory, StateSync, SyncConfig};
use crate::telemetry::LogBuffer;

/// Default timeout for one comment fetch.
const DEFAULT_COMMENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Builder for [`Huginn`].
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use huginn::{Huginn, MemoryStore, CacheConfig};
/// # async fn example() -> huginn::Result<()> {
/// let engine = Huginn::builder()
///     .source_order("dandan,bilibili")
///     .search_cache(CacheConfig::new().max_entries(200))
///     .store(Arc::new(MemoryStore::new()))
///     .build()
///     .await?;
/// let results = engine.search("Frieren").await;
/// # let _ = results;
/// # Ok(())
/// # }
/// ```
pub struct HuginnBuilder {
    sources: Vec<Arc<dyn Source>>,
    source_order: Option<String>,
    retry: Option<RetryConfig>,
    source_timeout: Duration,
    comment_timeout: Duration,
    registry: RegistryConfig,
    search_cache: CacheConfig,
    comment_cache: CacheConfig,
    selection_capacity: usize,
    history: HistoryConfig,
    danmu: DanmuOptions,
    store: Option<Arc<dyn KvStore>>,
    sync: SyncConfig,
    logs: Option<LogBuffer>,
}

impl Default for HuginnBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HuginnBuilder {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            source_order: None,
            retry: None,
            source_timeout: DEFAULT_SOURCE_TIMEOUT,
            comment_timeout: DEFAULT_COMMENT_TIMEOUT,
            registry: RegistryConfig::default(),
            search_cache: CacheConfig::default(),
            comment_cache: CacheConfig::default(),
            selection_capacity: 100,
            history: HistoryConfig::default(),
            danmu: DanmuOptions::default(),
            store: None,
            sync: SyncConfig::default(),
            logs: None,
        }
    }

    /// Register a source (one per platform; a later one replaces an earlier).
    pub fn source(mut self, source: Arc<dyn Source>) -> Self {
        self.sources.push(source);
        self
    }

    /// Comma-separated priority list, e.g. `"dandan,bilibili"`.
    ///
    /// Unknown names fail [`build`](Self::build); known names without a
    /// registered source are skipped.
    pub fn source_order(mut self, order: impl Into<String>) -> Self {
        self.source_order = Some(order.into());
        self
    }

    /// Wrap every source in a retry decorator.
    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.retry = Some(config);
        self
    }

    /// Timeout for one source's search (default: 10s).
    pub fn source_timeout(mut self, timeout: Duration) -> Self {
        self.source_timeout = timeout;
        self
    }

    /// Timeout for one comment fetch (default: 30s).
    pub fn comment_timeout(mut self, timeout: Duration) -> Self {
        self.comment_timeout = timeout;
        self
    }

    pub fn registry(mut self, config: RegistryConfig) -> Self {
        self.registry = config;
        self
    }

    pub fn search_cache(mut self, config: CacheConfig) -> Self {
        self.search_cache = config;
        self
    }

    pub fn comment_cache(mut self, config: CacheConfig) -> Self {
        self.comment_cache = config;
        self
    }

    /// Number of remembered keyword → anime choices (default: 100).
    pub fn selection_capacity(mut self, n: usize) -> Self {
        self.selection_capacity = n;
        self
    }

    pub fn history(mut self, config: HistoryConfig) -> Self {
        self.history = config;
        self
    }

    pub fn danmu(mut self, options: DanmuOptions) -> Self {
        self.danmu = options;
        self
    }

    /// Persist state to `store`. Without one, state lives in memory only.
    pub fn store(mut self, store: Arc<dyn KvStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn sync(mut self, config: SyncConfig) -> Self {
        self.sync = config;
        self
    }

    /// Expose recent log events through [`Huginn::logs`]. The buffer's
    /// layer still has to be installed in the subscriber.
    pub fn log_buffer(mut self, buffer: LogBuffer) -> Self {
        self.logs = Some(buffer);
        self
    }

    /// Build the engine and rehydrate persisted state.
    pub async fn build(self) -> Result<Huginn> {
        let mut table = SourceTable::new();
        if let Some(config) = self.retry {
            table.set_retry_config(config);
        }
        for source in self.sources {
            table.add(source);
        }
        if let Some(order) = &self.source_order {
            table.set_order(order)?;
        }
        let sources = Arc::new(table);

        let registry = Arc::new(IdentityRegistry::new(self.registry));
        let selection = Arc::new(SelectionMemory::new(
            "selection",
            CacheConfig::new()
                .max_entries(self.selection_capacity)
                .no_ttl(),
        ));
        let search_cache = Arc::new(SearchCache::new("search", self.search_cache));
        let comment_cache = Arc::new(CommentCache::new("comment", self.comment_cache));

        let sync = Arc::new(StateSync::new(
            registry.clone(),
            selection.clone(),
            self.store,
            self.sync,
        ));
        sync.rehydrate().await;

        let fanout = FanOut::new(
            sources.clone(),
            registry.clone(),
            selection.clone(),
            search_cache.clone(),
            sync.clone(),
        )
        .with_source_timeout(self.source_timeout);

        info!(
            sources = ?sources.ordered_kinds(),
            animes = registry.len(),
            "engine ready"
        );

        Ok(Huginn {
            sources,
            registry,
            selection,
            search_cache,
            comment_cache,
            sync,
            fanout,
            history: RequestHistory::new(self.history),
            danmu: self.danmu,
            comment_timeout: self.comment_timeout,
            logs: self.logs,
        })
    }
}
