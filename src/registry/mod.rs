//! Identity registry: canonical ids for platform titles and episodes.
//!
//! Every `(platform, original id)` pair seen during a search gets a stable
//! anime id from a counter seeded at [`FIRST_ID`]; every `(anime id, index)`
//! pair gets an episode id from a second counter with the same seed. Ids are
//! never reused, including after eviction.
//!
//! Both collections are bounded FIFO by insertion:
//!
//! - evicting an anime drops all of its episodes from the episode-id list;
//! - evicting an episode id removes it from its anime's episode list.
//!
//! Lookups for evicted ids return `None`; callers re-resolve through a fresh
//! search. All mutations run under one write lock, lookups share a read lock.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::telemetry;
use crate::types::{AnimeRecord, EpisodeRecord, RawItem, SourceKind};

/// First id issued by both counters.
pub const FIRST_ID: i64 = 10001;

/// Capacity limits for the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryConfig {
    /// Maximum registered animes. Default: 100.
    pub max_animes: usize,
    /// Maximum entries in the episode-id list. Default: 2,000.
    pub max_episodes: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_animes: 100,
            max_episodes: 2_000,
        }
    }
}

impl RegistryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the anime capacity (at least 1).
    pub fn max_animes(mut self, n: usize) -> Self {
        self.max_animes = n.max(1);
        self
    }

    /// Set the episode-id capacity (at least 1).
    pub fn max_episodes(mut self, n: usize) -> Self {
        self.max_episodes = n.max(1);
        self
    }
}

/// Entry of the persisted episode-id list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpisodeRef {
    pub id: i64,
    pub anime_id: i64,
    pub index: u32,
}

/// Next values of both id counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Counters {
    pub next_anime_id: i64,
    pub next_episode_id: i64,
}

impl Default for Counters {
    fn default() -> Self {
        Self {
            next_anime_id: FIRST_ID,
            next_episode_id: FIRST_ID,
        }
    }
}

/// Owned copy of the registry's persisted collections.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistryExport {
    /// Oldest first.
    pub animes: Vec<AnimeRecord>,
    /// Oldest first.
    pub episode_ids: Vec<EpisodeRef>,
    pub counters: Counters,
}

#[derive(Default)]
struct State {
    animes: IndexMap<i64, AnimeRecord>,
    by_origin: HashMap<(SourceKind, String), i64>,
    episode_ids: IndexMap<i64, EpisodeRef>,
    counters: Counters,
}

/// Bounded anime/episode id registry.
pub struct IdentityRegistry {
    config: RegistryConfig,
    state: RwLock<State>,
}

impl IdentityRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            state: RwLock::new(State::default()),
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Return the id for `(platform, original_id)`, registering it if new.
    pub fn register_or_lookup(
        &self,
        platform: SourceKind,
        original_id: &str,
        title: &str,
        url: &str,
    ) -> i64 {
        let mut state = self.write();
        self.register_locked(&mut state, platform, original_id, title, url)
    }

    /// Register a search hit and all of its episodes in one step.
    ///
    /// Episode `i` of `item.episodes` gets index `i + 1`.
    pub fn register_item(&self, platform: SourceKind, item: &RawItem) -> i64 {
        let mut state = self.write();
        let anime_id =
            self.register_locked(&mut state, platform, &item.original_id, &item.title, &item.url);
        for (pos, episode) in item.episodes.iter().enumerate() {
            self.resolve_episode_locked(
                &mut state,
                anime_id,
                pos as u32 + 1,
                &episode.title,
                &episode.url,
            );
        }
        anime_id
    }

    /// Return the episode id for `(anime_id, index)`, allocating one if absent.
    ///
    /// `None` when `anime_id` is unknown or evicted.
    pub fn resolve_episode(
        &self,
        anime_id: i64,
        index: u32,
        title: &str,
        source_url: &str,
    ) -> Option<i64> {
        let mut state = self.write();
        self.resolve_episode_locked(&mut state, anime_id, index, title, source_url)
    }

    /// Id already assigned to `(platform, original_id)`, if still registered.
    pub fn find(&self, platform: SourceKind, original_id: &str) -> Option<i64> {
        self.read()
            .by_origin
            .get(&(platform, original_id.to_string()))
            .copied()
    }

    pub fn anime(&self, id: i64) -> Option<AnimeRecord> {
        self.read().animes.get(&id).cloned()
    }

    pub fn episode(&self, id: i64) -> Option<EpisodeRecord> {
        let state = self.read();
        let key = state.episode_ids.get(&id)?;
        state
            .animes
            .get(&key.anime_id)?
            .episodes
            .iter()
            .find(|e| e.id == id)
            .cloned()
    }

    /// Episodes of `anime_id` in index order; `None` if the anime is unknown.
    pub fn episodes_of(&self, anime_id: i64) -> Option<Vec<EpisodeRecord>> {
        self.read()
            .animes
            .get(&anime_id)
            .map(|a| a.episodes.clone())
    }

    /// Number of registered animes.
    pub fn len(&self) -> usize {
        self.read().animes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of entries in the episode-id list.
    pub fn episode_count(&self) -> usize {
        self.read().episode_ids.len()
    }

    /// Copy of the persisted collections.
    pub fn export(&self) -> RegistryExport {
        let state = self.read();
        RegistryExport {
            animes: state.animes.values().cloned().collect(),
            episode_ids: state.episode_ids.values().copied().collect(),
            counters: state.counters,
        }
    }

    /// Replace the registry content with previously exported collections.
    ///
    /// Capacity limits are re-applied (oldest entries dropped first), episode
    /// references to unknown animes are discarded, and counters are raised
    /// past every restored id so ids are never reissued.
    pub fn restore(&self, export: RegistryExport) {
        let mut state = State {
            counters: export.counters,
            ..State::default()
        };

        let skip = export.animes.len().saturating_sub(self.config.max_animes);
        for mut anime in export.animes.into_iter().skip(skip) {
            anime.episodes.sort_by_key(|e| e.index);
            state
                .by_origin
                .insert((anime.platform, anime.original_id.clone()), anime.id);
            state.counters.next_anime_id = state.counters.next_anime_id.max(anime.id + 1);
            for episode in &anime.episodes {
                state.counters.next_episode_id =
                    state.counters.next_episode_id.max(episode.id + 1);
            }
            state.animes.insert(anime.id, anime);
        }

        let known: Vec<EpisodeRef> = export
            .episode_ids
            .into_iter()
            .filter(|r| {
                state
                    .animes
                    .get(&r.anime_id)
                    .is_some_and(|a| a.episodes.iter().any(|e| e.id == r.id))
            })
            .collect();
        let skip = known.len().saturating_sub(self.config.max_episodes);
        for (pos, r) in known.into_iter().enumerate() {
            if pos < skip {
                if let Some(anime) = state.animes.get_mut(&r.anime_id) {
                    anime.episodes.retain(|e| e.id != r.id);
                }
                continue;
            }
            state.episode_ids.insert(r.id, r);
        }

        // Episodes without an entry in the id list are unreachable; drop them.
        let listed = &state.episode_ids;
        for anime in state.animes.values_mut() {
            anime.episodes.retain(|e| listed.contains_key(&e.id));
        }

        *self.write() = state;
    }

    fn register_locked(
        &self,
        state: &mut State,
        platform: SourceKind,
        original_id: &str,
        title: &str,
        url: &str,
    ) -> i64 {
        if let Some(&id) = state.by_origin.get(&(platform, original_id.to_string())) {
            return id;
        }

        let id = state.counters.next_anime_id;
        state.counters.next_anime_id += 1;
        state.animes.insert(
            id,
            AnimeRecord {
                id,
                title: title.to_string(),
                platform,
                original_id: original_id.to_string(),
                url: url.to_string(),
                episodes: Vec::new(),
            },
        );
        state
            .by_origin
            .insert((platform, original_id.to_string()), id);

        while state.animes.len() > self.config.max_animes {
            let Some((old_id, old)) = state.animes.shift_remove_index(0) else {
                break;
            };
            state.by_origin.remove(&(old.platform, old.original_id));
            for episode in &old.episodes {
                state.episode_ids.shift_remove(&episode.id);
            }
            debug!(anime_id = old_id, "registry full, evicted oldest anime");
            metrics::counter!(telemetry::EVICTIONS_TOTAL, "collection" => "animes").increment(1);
        }
        id
    }

    fn resolve_episode_locked(
        &self,
        state: &mut State,
        anime_id: i64,
        index: u32,
        title: &str,
        source_url: &str,
    ) -> Option<i64> {
        let next_id = state.counters.next_episode_id;
        let anime = state.animes.get_mut(&anime_id)?;
        if let Some(existing) = anime.episodes.iter().find(|e| e.index == index) {
            return Some(existing.id);
        }

        let pos = anime.episodes.partition_point(|e| e.index < index);
        anime.episodes.insert(
            pos,
            EpisodeRecord {
                id: next_id,
                anime_id,
                index,
                title: title.to_string(),
                source_url: source_url.to_string(),
            },
        );
        state.counters.next_episode_id += 1;
        state.episode_ids.insert(
            next_id,
            EpisodeRef {
                id: next_id,
                anime_id,
                index,
            },
        );

        while state.episode_ids.len() > self.config.max_episodes {
            let Some((old_id, old)) = state.episode_ids.shift_remove_index(0) else {
                break;
            };
            if let Some(owner) = state.animes.get_mut(&old.anime_id) {
                owner.episodes.retain(|e| e.id != old_id);
            }
            debug!(episode_id = old_id, "episode list full, evicted oldest id");
            metrics::counter!(telemetry::EVICTIONS_TOTAL, "collection" => "episodes").increment(1);
        }
        Some(next_id)
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for IdentityRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(max_animes: usize, max_episodes: usize) -> IdentityRegistry {
        IdentityRegistry::new(
            RegistryConfig::new()
                .max_animes(max_animes)
                .max_episodes(max_episodes),
        )
    }

    #[test]
    fn ids_start_at_seed_and_increase() {
        let r = registry(10, 10);
        let a = r.register_or_lookup(SourceKind::Dandan, "1", "A", "u1");
        let b = r.register_or_lookup(SourceKind::Dandan, "2", "B", "u2");
        assert_eq!(a, FIRST_ID);
        assert_eq!(b, FIRST_ID + 1);
    }

    #[test]
    fn same_platform_item_is_idempotent() {
        let r = registry(10, 10);
        let first = r.register_or_lookup(SourceKind::Bilibili, "ss1", "A", "u");
        let second = r.register_or_lookup(SourceKind::Bilibili, "ss1", "A renamed", "u2");
        assert_eq!(first, second);
        assert_eq!(r.len(), 1);
    }

    #[test]
    fn same_original_id_on_other_platform_is_distinct() {
        let r = registry(10, 10);
        let a = r.register_or_lookup(SourceKind::Bilibili, "42", "A", "u");
        let b = r.register_or_lookup(SourceKind::Tencent, "42", "A", "u");
        assert_ne!(a, b);
    }

    #[test]
    fn overflow_evicts_oldest_anime_and_its_episodes() {
        let r = registry(2, 10);
        let first = r.register_item(
            SourceKind::Dandan,
            &RawItem::new("1", "A", "u").episode("e1", "x1"),
        );
        let ep = r.episodes_of(first).unwrap()[0].id;
        r.register_or_lookup(SourceKind::Dandan, "2", "B", "u");
        r.register_or_lookup(SourceKind::Dandan, "3", "C", "u");

        assert_eq!(r.len(), 2);
        assert!(r.anime(first).is_none());
        assert!(r.episode(ep).is_none());
        assert_eq!(r.episode_count(), 0);
        assert_eq!(r.find(SourceKind::Dandan, "1"), None);
    }

    #[test]
    fn evicted_ids_are_not_reused() {
        let r = registry(1, 10);
        let a = r.register_or_lookup(SourceKind::Dandan, "1", "A", "u");
        let b = r.register_or_lookup(SourceKind::Dandan, "2", "B", "u");
        let again = r.register_or_lookup(SourceKind::Dandan, "1", "A", "u");
        assert!(b > a);
        assert!(again > b);
    }

    #[test]
    fn resolve_episode_allocates_once() {
        let r = registry(10, 10);
        let anime = r.register_or_lookup(SourceKind::Dandan, "1", "A", "u");
        let e1 = r.resolve_episode(anime, 1, "Ep 1", "s1").unwrap();
        let again = r.resolve_episode(anime, 1, "Ep 1", "s1").unwrap();
        assert_eq!(e1, again);
        assert_eq!(e1, FIRST_ID);

        let ep = r.episode(e1).unwrap();
        assert_eq!(ep.anime_id, anime);
        assert_eq!(ep.source_url, "s1");
    }

    #[test]
    fn resolve_episode_for_unknown_anime_is_none() {
        let r = registry(10, 10);
        assert_eq!(r.resolve_episode(99, 1, "t", "u"), None);
    }

    #[test]
    fn episodes_stay_sorted_by_index() {
        let r = registry(10, 10);
        let anime = r.register_or_lookup(SourceKind::Dandan, "1", "A", "u");
        r.resolve_episode(anime, 3, "3", "s3");
        r.resolve_episode(anime, 1, "1", "s1");
        r.resolve_episode(anime, 2, "2", "s2");
        let indexes: Vec<u32> = r
            .episodes_of(anime)
            .unwrap()
            .iter()
            .map(|e| e.index)
            .collect();
        assert_eq!(indexes, vec![1, 2, 3]);
    }

    #[test]
    fn episode_list_overflow_evicts_oldest_episode() {
        let r = registry(10, 2);
        let anime = r.register_item(
            SourceKind::Dandan,
            &RawItem::new("1", "A", "u")
                .episode("e1", "s1")
                .episode("e2", "s2")
                .episode("e3", "s3"),
        );
        let episodes = r.episodes_of(anime).unwrap();
        assert_eq!(episodes.len(), 2);
        assert_eq!(episodes[0].index, 2);
        assert_eq!(r.episode_count(), 2);
    }

    #[test]
    fn export_restore_round_trip_keeps_counters() {
        let r = registry(10, 10);
        r.register_item(
            SourceKind::Dandan,
            &RawItem::new("1", "A", "u").episode("e1", "s1"),
        );
        let export = r.export();

        let fresh = registry(10, 10);
        fresh.restore(export.clone());
        assert_eq!(fresh.export(), export);

        let next = fresh.register_or_lookup(SourceKind::Dandan, "2", "B", "u");
        assert_eq!(next, FIRST_ID + 1);
    }

    #[test]
    fn restore_applies_capacity_and_raises_stale_counters() {
        let source = registry(10, 10);
        for i in 0..4 {
            source.register_or_lookup(SourceKind::Dandan, &i.to_string(), "t", "u");
        }
        let mut export = source.export();
        export.counters = Counters::default();

        let small = registry(2, 10);
        small.restore(export);
        assert_eq!(small.len(), 2);
        assert!(small.anime(FIRST_ID).is_none());
        assert!(small.anime(FIRST_ID + 3).is_some());
        let next = small.register_or_lookup(SourceKind::Dandan, "new", "t", "u");
        assert_eq!(next, FIRST_ID + 4);
    }
}
