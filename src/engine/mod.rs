//! The engine facade.
//!
//! [`Huginn`] wires the identity registry, the three bounded caches, the
//! source table, the sync layer and the danmu pipeline together and exposes
//! the operations collaborators (an HTTP layer, an admin UI, the CLI) call.
//! Build one with [`Huginn::builder`]; building rehydrates persisted state,
//! so no query can be served before rehydration completes.

mod builder;
pub mod matcher;

pub use builder::HuginnBuilder;
pub use matcher::{ParsedName, parse_file_name};

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::cache::{BoundedCache, RequestHistory, RequestStats};
use crate::danmu::{self, DanmuOptions};
use crate::registry::IdentityRegistry;
use crate::sources::fanout::fetch_from;
use crate::sources::{FanOut, SearchCache, Source, SourceTable};
use crate::sync::{SelectionMemory, StateHashSnapshot, StateSync, SyncReport};
use crate::telemetry::{LogBuffer, LogRecord};
use crate::types::{
    AnimeRecord, Comment, CommentFormat, CommentSegment, EpisodeRecord, MatchResult,
    SegmentedComments, SourceKind,
};
use crate::{HuginnError, Result};

/// Comment cache: video key → prepared comments.
pub type CommentCache = BoundedCache<String, Arc<Vec<Comment>>>;

/// What to fetch comments for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommentKey {
    /// A registry-issued episode id.
    Episode(i64),
    /// A video url handled by one of the registered sources.
    Url(String),
}

impl From<i64> for CommentKey {
    fn from(id: i64) -> Self {
        CommentKey::Episode(id)
    }
}

impl std::str::FromStr for CommentKey {
    type Err = HuginnError;

    /// Numbers are episode ids, anything else is a url.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(HuginnError::InvalidInput("empty comment key".to_string()));
        }
        Ok(match s.parse::<i64>() {
            Ok(id) => CommentKey::Episode(id),
            Err(_) => CommentKey::Url(s.to_string()),
        })
    }
}

/// Diagnostics snapshot: sizes plus current and persisted state hashes.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateReport {
    pub animes: usize,
    pub episodes: usize,
    pub selections: usize,
    pub search_cache_entries: usize,
    pub comment_cache_entries: usize,
    pub sources: Vec<SourceKind>,
    /// Name of the external store, if one is configured.
    pub store: Option<String>,
    pub hashes: StateHashSnapshot,
    /// Hashes as of the last successful write; `None` until every
    /// collection has been persisted or rehydrated once.
    pub persisted: Option<StateHashSnapshot>,
}

/// Multi-source danmu engine.
pub struct Huginn {
    sources: Arc<SourceTable>,
    registry: Arc<IdentityRegistry>,
    selection: Arc<SelectionMemory>,
    search_cache: Arc<SearchCache>,
    comment_cache: Arc<CommentCache>,
    sync: Arc<StateSync>,
    fanout: FanOut,
    history: RequestHistory,
    danmu: DanmuOptions,
    comment_timeout: Duration,
    logs: Option<LogBuffer>,
}

impl Huginn {
    pub fn builder() -> HuginnBuilder {
        HuginnBuilder::new()
    }

    /// Search every source for `keyword`; merged in source order with the
    /// remembered selection first. Empty when nothing is found.
    #[instrument(skip(self))]
    pub async fn search(&self, keyword: &str) -> Vec<AnimeRecord> {
        self.fanout.aggregate(keyword).await
    }

    /// Episodes of a registered anime, in index order.
    pub fn episodes(&self, anime_id: i64) -> Result<Vec<EpisodeRecord>> {
        self.registry
            .episodes_of(anime_id)
            .ok_or_else(|| HuginnError::not_found("anime", anime_id))
    }

    /// Remember that `anime_id` is the user's choice for `keyword`.
    #[instrument(skip(self))]
    pub async fn select(&self, keyword: &str, anime_id: i64) -> Result<()> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Err(HuginnError::InvalidInput("empty keyword".to_string()));
        }
        if self.registry.anime(anime_id).is_none() {
            return Err(HuginnError::not_found("anime", anime_id));
        }
        self.selection.put(keyword.to_string(), anime_id);
        self.sync.sync_if_changed().await;
        Ok(())
    }

    /// Match a video file name to an episode.
    ///
    /// The parsed title is searched like [`search`](Self::search); the first
    /// result (remembered selection first) that has the parsed episode wins.
    #[instrument(skip(self))]
    pub async fn auto_match(&self, file_name: &str) -> Result<Option<MatchResult>> {
        let parsed = parse_file_name(file_name).ok_or_else(|| {
            HuginnError::InvalidInput(format!("cannot parse a title from '{file_name}'"))
        })?;
        debug!(title = %parsed.title, episode = parsed.episode, "parsed file name");

        let found = self
            .search(&parsed.title)
            .await
            .into_iter()
            .find_map(|anime| {
                let episode = anime
                    .episodes
                    .iter()
                    .find(|e| e.index == parsed.episode)?
                    .clone();
                Some(MatchResult {
                    anime_id: anime.id,
                    anime_title: anime.title,
                    platform: anime.platform,
                    episode,
                })
            });
        Ok(found)
    }

    /// Normalized comments for `key`, split into time windows.
    #[instrument(skip(self))]
    pub async fn comments(&self, key: &CommentKey) -> Result<SegmentedComments> {
        let prepared = self.prepared_comments(key).await?;
        Ok(danmu::segment(prepared.as_ref().clone(), &self.danmu))
    }

    /// Comments for `key` rendered as JSON or XML.
    pub async fn export_comments(&self, key: &CommentKey, format: CommentFormat) -> Result<String> {
        let prepared = self.prepared_comments(key).await?;
        danmu::render::render(prepared.iter(), format)
    }

    /// Only the window containing playback `time` (seconds).
    pub async fn comments_at(&self, key: &CommentKey, time: f64) -> Result<CommentSegment> {
        if !time.is_finite() || time < 0.0 {
            return Err(HuginnError::InvalidInput(format!(
                "playback time must be a non-negative number, got {time}"
            )));
        }
        let segmented = self.comments(key).await?;
        danmu::segment_at(&segmented, time)
    }

    /// Empty the search and comment caches. Registry and selection memory
    /// are state, not caches, and are kept.
    pub fn clear_all_caches(&self) {
        self.search_cache.clear();
        self.comment_cache.clear();
        info!("search and comment caches cleared");
    }

    pub fn state_report(&self) -> Result<StateReport> {
        Ok(StateReport {
            animes: self.registry.len(),
            episodes: self.registry.episode_count(),
            selections: self.selection.len(),
            search_cache_entries: self.search_cache.len(),
            comment_cache_entries: self.comment_cache.len(),
            sources: self.sources.ordered_kinds(),
            store: self.sync.store().map(|s| s.name().to_string()),
            hashes: self.sync.snapshot()?,
            persisted: self.sync.persisted_snapshot(),
        })
    }

    /// Push any unsaved state to the external store now.
    pub async fn sync(&self) -> SyncReport {
        self.sync.sync_if_changed().await
    }

    /// Whether the external store answers; `None` without a store.
    pub async fn store_healthy(&self) -> Option<bool> {
        match self.sync.store() {
            Some(store) => Some(store.ping().await),
            None => None,
        }
    }

    /// Record one request from `ip` for soft rate accounting.
    pub fn record_request(&self, ip: &str) -> RequestStats {
        let stats = self.history.record(ip);
        if stats.over_limit {
            debug!(ip, recent = stats.recent, "client over soft request limit");
        }
        stats
    }

    /// Recent log events, oldest first; empty without a log buffer.
    pub fn logs(&self) -> Vec<LogRecord> {
        self.logs.as_ref().map(LogBuffer::recent).unwrap_or_default()
    }

    pub fn registry(&self) -> &IdentityRegistry {
        &self.registry
    }

    pub fn sources(&self) -> &SourceTable {
        &self.sources
    }

    pub fn danmu_options(&self) -> &DanmuOptions {
        &self.danmu
    }

    // ========================================================================
    // Comment resolution
    // ========================================================================

    async fn prepared_comments(&self, key: &CommentKey) -> Result<Arc<Vec<Comment>>> {
        let (source, target) = self.resolve(key)?;
        let cache_key = format!("{}:{}", source.kind(), target);
        if let Some(hit) = self.comment_cache.get(&cache_key) {
            return Ok(hit);
        }

        let raw = fetch_from(source.as_ref(), &target, self.comment_timeout).await?;
        let prepared = Arc::new(danmu::prepare(raw, source.kind(), &self.danmu));
        debug!(key = %cache_key, comments = prepared.len(), "comments cached");
        self.comment_cache.put(cache_key, prepared.clone());
        Ok(prepared)
    }

    /// Source and fetch target for `key`.
    fn resolve(&self, key: &CommentKey) -> Result<(Arc<dyn Source>, String)> {
        match key {
            CommentKey::Episode(id) => {
                let episode = self
                    .registry
                    .episode(*id)
                    .ok_or_else(|| HuginnError::not_found("episode", id))?;
                let anime = self
                    .registry
                    .anime(episode.anime_id)
                    .ok_or_else(|| HuginnError::not_found("anime", episode.anime_id))?;
                let source = self.sources.get(anime.platform).ok_or_else(|| {
                    HuginnError::SourceUnavailable {
                        source_name: anime.platform.to_string(),
                        reason: "no source registered for this platform".to_string(),
                    }
                })?;
                Ok((source, episode.source_url))
            }
            CommentKey::Url(url) => {
                let source = self.sources.for_url(url).ok_or_else(|| {
                    HuginnError::InvalidInput(format!("no source handles '{url}'"))
                })?;
                Ok((source, url.clone()))
            }
        }
    }
}
