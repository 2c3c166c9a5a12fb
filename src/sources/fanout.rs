//! Concurrent multi-source search with a deterministic merge.
//!
//! # Flow
//!
//! ```text
//! aggregate("Frieren")
//!     │
//!     ├── search cache hit (every id still registered)? ──► promote, return
//!     │
//!     ▼
//! ┌────────────┐ ┌────────────┐ ┌────────────┐
//! │  source 0  │ │  source 1  │ │  source 2  │   concurrent, each under
//! └─────┬──────┘ └─────┬──────┘ └─────┬──────┘   its own timeout
//!       └──────────────┼──────────────┘
//!                      ▼  joined positionally (configured order)
//!          dedup per source by original id
//!                      ▼
//!          truncate to registry capacity (tail first)
//!                      ▼
//!          register in configured order ──► ids
//!                      ▼
//!          promote remembered selection to the front
//!                      ▼
//!          search cache ◄── ids      sync_if_changed()
//! ```
//!
//! Registration happens after the join, so the ids and the merged order do
//! not depend on which source answered first. A failed, timed-out or empty
//! source is logged and left out; it never fails the aggregate.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use tracing::{debug, instrument, warn};

use super::registry::SourceTable;
use super::traits::Source;
use crate::cache::BoundedCache;
use crate::registry::IdentityRegistry;
use crate::sync::{SelectionMemory, StateSync};
use crate::telemetry;
use crate::types::{AnimeRecord, RawComment, RawItem, SourceKind};
use crate::{HuginnError, Result};

/// Default per-source search timeout.
pub const DEFAULT_SOURCE_TIMEOUT: Duration = Duration::from_secs(10);

/// Search cache: keyword → merged anime ids.
pub type SearchCache = BoundedCache<String, Vec<i64>>;

/// Fan-out coordinator. Cheap to share behind an `Arc`.
pub struct FanOut {
    sources: Arc<SourceTable>,
    registry: Arc<IdentityRegistry>,
    selection: Arc<SelectionMemory>,
    search_cache: Arc<SearchCache>,
    sync: Arc<StateSync>,
    source_timeout: Duration,
}

impl FanOut {
    pub fn new(
        sources: Arc<SourceTable>,
        registry: Arc<IdentityRegistry>,
        selection: Arc<SelectionMemory>,
        search_cache: Arc<SearchCache>,
        sync: Arc<StateSync>,
    ) -> Self {
        Self {
            sources,
            registry,
            selection,
            search_cache,
            sync,
            source_timeout: DEFAULT_SOURCE_TIMEOUT,
        }
    }

    /// Override the per-source timeout.
    pub fn with_source_timeout(mut self, timeout: Duration) -> Self {
        self.source_timeout = timeout;
        self
    }

    pub fn source_timeout(&self) -> Duration {
        self.source_timeout
    }

    /// Search every ordered source for `keyword` and merge the hits.
    ///
    /// Never fails: when nothing is found the result is empty.
    #[instrument(skip(self), fields(sources = self.sources.len()))]
    pub async fn aggregate(&self, keyword: &str) -> Vec<AnimeRecord> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Vec::new();
        }

        if let Some(ids) = self.search_cache.get(keyword) {
            match self.resolve_all(&ids) {
                Some(records) => return self.promote_selection(keyword, records),
                None => debug!(keyword, "cached search references evicted ids, refreshing"),
            }
        }

        let ordered = self.sources.ordered();
        let searches = ordered.iter().map(|source| self.search_one(source, keyword));
        let results = join_all(searches).await;

        // Capped at registry capacity: no hit may evict another from the same merge.
        let capacity = self.registry.config().max_animes;
        let mut merged: Vec<(SourceKind, RawItem)> = Vec::new();
        for (source, items) in ordered.iter().zip(results) {
            let Some(items) = items else { continue };
            let kind = source.kind();
            merged.extend(dedup_items(items).into_iter().map(|item| (kind, item)));
        }
        if merged.len() > capacity {
            debug!(
                keyword,
                merged = merged.len(),
                capacity,
                "merge exceeds registry capacity, dropping lowest-priority hits"
            );
            merged.truncate(capacity);
        }

        let mut ids = Vec::new();
        for (kind, item) in &merged {
            let id = self.registry.register_item(*kind, item);
            if !ids.contains(&id) {
                ids.push(id);
            }
        }

        let records: Vec<AnimeRecord> =
            ids.iter().filter_map(|id| self.registry.anime(*id)).collect();
        let ids: Vec<i64> = records.iter().map(|r| r.id).collect();
        debug!(keyword, results = ids.len(), "fan-out merged");

        self.search_cache.put(keyword.to_string(), ids);
        self.sync.sync_if_changed().await;

        self.promote_selection(keyword, records)
    }

    /// Query one source under the timeout. `None` if it failed, timed out
    /// or found nothing.
    async fn search_one(&self, source: &Arc<dyn Source>, keyword: &str) -> Option<Vec<RawItem>> {
        let start = Instant::now();
        let name = source.name();
        let (status, items) =
            match tokio::time::timeout(self.source_timeout, source.search(keyword)).await {
                Ok(Ok(items)) if items.is_empty() => ("empty", None),
                Ok(Ok(items)) => ("ok", Some(items)),
                Ok(Err(e)) => {
                    let e = HuginnError::SourceUnavailable {
                        source_name: name.to_string(),
                        reason: e.to_string(),
                    };
                    warn!(source = name, keyword, error = %e, "source excluded from merge");
                    ("error", None)
                }
                Err(_) => {
                    warn!(
                        source = name,
                        keyword,
                        timeout_ms = self.source_timeout.as_millis() as u64,
                        "source timed out, excluded from merge"
                    );
                    ("timeout", None)
                }
            };
        record_request(name, "search", status, start);
        items
    }

    /// Records for every id, or `None` if any was evicted.
    fn resolve_all(&self, ids: &[i64]) -> Option<Vec<AnimeRecord>> {
        ids.iter().map(|id| self.registry.anime(*id)).collect()
    }

    /// Move the remembered choice for `keyword` to the front, keeping the
    /// rest in place.
    fn promote_selection(&self, keyword: &str, mut records: Vec<AnimeRecord>) -> Vec<AnimeRecord> {
        if let Some(selected) = self.selection.get(keyword) {
            promote(&mut records, selected);
        }
        records
    }
}

/// Move the record with id `selected` to index 0, shifting the ones before it.
pub(crate) fn promote(records: &mut [AnimeRecord], selected: i64) {
    if let Some(pos) = records.iter().position(|r| r.id == selected) {
        records[..=pos].rotate_right(1);
    }
}

/// Drop repeated `original_id`s within one source's list, keeping the first.
fn dedup_items(items: Vec<RawItem>) -> Vec<RawItem> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.original_id.clone()))
        .collect()
}

/// Record source call metrics (counter + histogram).
pub(crate) fn record_request(
    source: &str,
    operation: &'static str,
    status: &'static str,
    start: Instant,
) {
    metrics::counter!(telemetry::SOURCE_REQUESTS_TOTAL,
        "source" => source.to_owned(),
        "operation" => operation,
        "status" => status,
    )
    .increment(1);
    metrics::histogram!(telemetry::SOURCE_DURATION_SECONDS,
        "source" => source.to_owned(),
        "operation" => operation,
    )
    .record(start.elapsed().as_secs_f64());
}

/// Fetch raw comments from one source under `timeout`, with metrics.
pub(crate) async fn fetch_from(
    source: &dyn Source,
    target: &str,
    timeout: Duration,
) -> Result<Vec<RawComment>> {
    let start = Instant::now();
    let unavailable = |reason: String| HuginnError::SourceUnavailable {
        source_name: source.name().to_string(),
        reason,
    };
    let (status, result) = match tokio::time::timeout(timeout, source.fetch_comments(target)).await
    {
        Ok(Ok(raw)) => ("ok", Ok(raw)),
        Ok(Err(e)) => ("error", Err(unavailable(e.to_string()))),
        Err(_) => (
            "timeout",
            Err(unavailable(format!("timed out after {timeout:?}"))),
        ),
    };
    record_request(source.name(), "fetch_comments", status, start);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SourceKind;

    fn record(id: i64) -> AnimeRecord {
        AnimeRecord {
            id,
            title: format!("a{id}"),
            platform: SourceKind::Dandan,
            original_id: id.to_string(),
            url: String::new(),
            episodes: Vec::new(),
        }
    }

    #[test]
    fn promote_moves_selected_to_front_stably() {
        let mut records: Vec<_> = [1, 2, 3, 4].into_iter().map(record).collect();
        promote(&mut records, 3);
        let ids: Vec<i64> = records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![3, 1, 2, 4]);

        promote(&mut records, 99);
        let ids: Vec<i64> = records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![3, 1, 2, 4]);
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let items = vec![
            RawItem::new("1", "first", "u1"),
            RawItem::new("2", "other", "u2"),
            RawItem::new("1", "second", "u3"),
        ];
        let kept = dedup_items(items);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].title, "first");
    }
}
