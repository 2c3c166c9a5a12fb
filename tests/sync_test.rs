//! Tests for change-driven state persistence and cold-start rehydration.

use std::sync::Arc;

use async_trait::async_trait;
use huginn::{
    Collection, CommentKey, Huginn, KvStore, MemoryStore, RawComment, RawItem, Result, Source,
    SourceKind, SyncConfig,
};

struct StaticSource {
    items: Vec<RawItem>,
}

#[async_trait]
impl Source for StaticSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Dandan
    }

    async fn search(&self, _title: &str) -> Result<Vec<RawItem>> {
        Ok(self.items.clone())
    }

    async fn fetch_comments(&self, target: &str) -> Result<Vec<RawComment>> {
        Ok(vec![RawComment::Packed {
            cid: Some(1),
            p: "12.5,1,16777215,u1".to_string(),
            m: format!("comment for {target}"),
        }])
    }
}

fn source() -> Arc<dyn Source> {
    Arc::new(StaticSource {
        items: vec![
            RawItem::new("1", "Frieren", "u1")
                .episode("Episode 1", "101")
                .episode("Episode 2", "102"),
            RawItem::new("2", "Frieren Specials", "u2").episode("SP1", "201"),
        ],
    })
}

async fn engine(store: &Arc<MemoryStore>) -> Huginn {
    Huginn::builder()
        .source(source())
        .store(store.clone())
        .build()
        .await
        .unwrap()
}

// ============================================================================
// Change detection
// ============================================================================

#[tokio::test]
async fn unchanged_state_writes_nothing() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine(&store).await;

    let report = engine.sync().await;
    assert!(report.is_noop());
    assert_eq!(store.writes(), 0);
}

#[tokio::test]
async fn only_changed_collections_are_written() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine(&store).await;

    let results = engine.search("Frieren").await;
    // animes, episodeIds and episodeNum changed; the selection did not.
    assert_eq!(store.writes(), 3);

    engine.select("Frieren", results[1].id).await.unwrap();
    assert_eq!(store.writes(), 4);

    // Served from cache, nothing new to persist.
    engine.search("Frieren").await;
    assert!(engine.sync().await.is_noop());
    assert_eq!(store.writes(), 4);

    assert_eq!(
        store.keys(),
        vec![
            "huginn:animes",
            "huginn:episodeIds",
            "huginn:episodeNum",
            "huginn:lastSelectMap"
        ]
    );
}

#[tokio::test]
async fn re_registering_known_items_is_not_a_change() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine(&store).await;

    engine.search("Frieren").await;
    let writes = store.writes();

    // A different keyword misses the search cache but finds the same items.
    engine.search("Sousou no Frieren").await;
    assert_eq!(store.writes(), writes);
}

#[tokio::test]
async fn state_report_tracks_persisted_hashes() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine(&store).await;
    engine.search("Frieren").await;

    let report = engine.state_report().unwrap();
    assert_eq!(report.animes, 2);
    assert_eq!(report.episodes, 3);
    assert_eq!(report.store.as_deref(), Some("memory"));
    assert_eq!(report.persisted.as_ref(), Some(&report.hashes));
    for collection in Collection::ALL {
        assert!(!report.hashes.get(collection).is_empty());
    }
}

#[tokio::test]
async fn custom_prefix_and_expiry_are_used() {
    let store = Arc::new(MemoryStore::new());
    let engine = Huginn::builder()
        .source(source())
        .store(store.clone())
        .sync(
            SyncConfig::new()
                .key_prefix("test:")
                .expiry(std::time::Duration::from_secs(3600)),
        )
        .build()
        .await
        .unwrap();

    engine.search("Frieren").await;
    assert!(store.keys().iter().all(|k| k.starts_with("test:")));
    assert!(store.get("test:animes").await.unwrap().is_some());
}

// ============================================================================
// Outages
// ============================================================================

#[tokio::test]
async fn store_outage_never_fails_requests_and_heals_later() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine(&store).await;

    store.set_offline(true);
    let results = engine.search("Frieren").await;
    assert_eq!(results.len(), 2, "search still answers from memory");
    assert_eq!(engine.store_healthy().await, Some(false));

    let report = engine.sync().await;
    assert_eq!(report.failed.len(), 3);
    assert!(report.written.is_empty());

    store.set_offline(false);
    let report = engine.sync().await;
    assert_eq!(
        report.written,
        vec![
            Collection::Animes,
            Collection::EpisodeIds,
            Collection::EpisodeNum
        ]
    );
    assert!(engine.sync().await.is_noop());
    assert_eq!(engine.store_healthy().await, Some(true));
}

#[tokio::test]
async fn unreachable_store_at_startup_starts_empty() {
    let store = Arc::new(MemoryStore::new());
    store.set_offline(true);
    let engine = engine(&store).await;

    assert!(engine.registry().is_empty());
    assert!(engine.state_report().unwrap().persisted.is_none());

    // Nothing is known about the store, so everything is written once it
    // comes back.
    store.set_offline(false);
    assert_eq!(engine.sync().await.written.len(), 4);
}

#[tokio::test]
async fn no_store_means_memory_only() {
    let engine = Huginn::builder().source(source()).build().await.unwrap();
    engine.search("Frieren").await;

    assert!(engine.sync().await.is_noop());
    assert_eq!(engine.store_healthy().await, None);
    assert!(engine.state_report().unwrap().store.is_none());
}

// ============================================================================
// Rehydration
// ============================================================================

#[tokio::test]
async fn ids_survive_a_cold_start() {
    let store = Arc::new(MemoryStore::new());

    let first = engine(&store).await;
    let results = first.search("Frieren").await;
    let episode = results[0].episodes[1].clone();
    first.select("Frieren", results[1].id).await.unwrap();
    drop(first);

    let writes = store.writes();
    let second = engine(&store).await;

    // Ids issued before the restart still resolve without a new search.
    assert_eq!(second.episodes(results[0].id).unwrap()[1], episode);
    let comments = second
        .comments(&CommentKey::Episode(episode.id))
        .await
        .unwrap();
    assert_eq!(comments.len(), 1);

    // The remembered selection comes back too.
    let again = second.search("Frieren").await;
    assert_eq!(again[0].id, results[1].id);

    // Rehydrated state matches the store, so no rewrite is needed.
    assert!(second.sync().await.is_noop());
    assert_eq!(store.writes(), writes);
}

#[tokio::test]
async fn counters_continue_after_a_cold_start() {
    let store = Arc::new(MemoryStore::new());
    let first = engine(&store).await;
    first.search("Frieren").await;
    drop(first);

    let second = Huginn::builder()
        .source(Arc::new(StaticSource {
            items: vec![RawItem::new("99", "Something Else", "u99").episode("1", "991")],
        }))
        .store(store.clone())
        .build()
        .await
        .unwrap();

    let results = second.search("else").await;
    assert_eq!(results[0].id, 10003);
    assert_eq!(results[0].episodes[0].id, 10004);
}

#[tokio::test]
async fn corrupt_persisted_value_is_ignored() {
    let store = Arc::new(MemoryStore::new());
    store.set("huginn:animes", "{not json").await.unwrap();

    let engine = engine(&store).await;
    assert!(engine.registry().is_empty());

    let results = engine.search("Frieren").await;
    assert_eq!(results.len(), 2);
    let stored = store.get("huginn:animes").await.unwrap().unwrap();
    assert!(stored.starts_with('['), "corrupt value was overwritten");
}
