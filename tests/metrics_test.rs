//! Tests for metrics emission.
//!
//! Uses `metrics_util::debugging::DebuggingRecorder` to capture and assert
//! on emitted metrics without needing a real exporter.

use std::sync::Arc;

use async_trait::async_trait;
use metrics_util::MetricKind;
use metrics_util::debugging::{DebugValue, DebuggingRecorder};

use huginn::telemetry;
use huginn::{
    CommentKey, Huginn, HuginnError, MemoryStore, RawComment, RawItem, Result, Source, SourceKind,
};

// ============================================================================
// Mock sources
// ============================================================================

struct GoodSource;

#[async_trait]
impl Source for GoodSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Dandan
    }

    async fn search(&self, title: &str) -> Result<Vec<RawItem>> {
        Ok(vec![RawItem::new("1", title, "u1").episode("Episode 1", "101")])
    }

    async fn fetch_comments(&self, _target: &str) -> Result<Vec<RawComment>> {
        Ok(vec![
            RawComment::Packed {
                cid: Some(1),
                p: "1.0,1,16777215,a".to_string(),
                m: "ok".to_string(),
            },
            RawComment::Packed {
                cid: Some(2),
                p: "2.0,9,16777215,a".to_string(),
                m: "unknown mode".to_string(),
            },
            RawComment::Bilibili {
                attrs: "3.0".to_string(),
                text: "too few fields".to_string(),
            },
        ])
    }
}

struct BrokenSource;

#[async_trait]
impl Source for BrokenSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Bilibili
    }

    async fn search(&self, _title: &str) -> Result<Vec<RawItem>> {
        Err(HuginnError::Http("connection refused".to_string()))
    }

    async fn fetch_comments(&self, _target: &str) -> Result<Vec<RawComment>> {
        Err(HuginnError::Http("connection refused".to_string()))
    }
}

struct EmptySource;

#[async_trait]
impl Source for EmptySource {
    fn kind(&self) -> SourceKind {
        SourceKind::Tencent
    }

    async fn search(&self, _title: &str) -> Result<Vec<RawItem>> {
        Ok(Vec::new())
    }

    async fn fetch_comments(&self, _target: &str) -> Result<Vec<RawComment>> {
        Ok(Vec::new())
    }
}

/// One hit named after the searched title.
struct TitleSource;

#[async_trait]
impl Source for TitleSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Youku
    }

    async fn search(&self, title: &str) -> Result<Vec<RawItem>> {
        Ok(vec![RawItem::new(title, title, format!("u-{title}"))])
    }

    async fn fetch_comments(&self, _target: &str) -> Result<Vec<RawComment>> {
        Ok(Vec::new())
    }
}

// ============================================================================
// Snapshot helpers
// ============================================================================

type SnapshotVec = Vec<(
    metrics_util::CompositeKey,
    Option<metrics::Unit>,
    Option<metrics::SharedString>,
    DebugValue,
)>;

/// Sum counter values for `name` whose labels include every `(key, value)`.
fn counter_total(snapshot: &SnapshotVec, name: &str, labels: &[(&str, &str)]) -> u64 {
    snapshot
        .iter()
        .filter(|(key, _, _, _)| key.kind() == MetricKind::Counter && key.key().name() == name)
        .filter(|(key, _, _, _)| {
            labels.iter().all(|(k, v)| {
                key.key()
                    .labels()
                    .any(|label| label.key() == *k && label.value() == *v)
            })
        })
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(v) => *v,
            _ => 0,
        })
        .sum()
}

fn has_histogram(snapshot: &SnapshotVec, name: &str) -> bool {
    snapshot
        .iter()
        .any(|(key, _, _, _)| key.kind() == MetricKind::Histogram && key.key().name() == name)
}

/// Runs async code within a local recorder scope on the multi-thread runtime.
///
/// `block_in_place` keeps the sync `with_local_recorder` closure on the
/// current thread while `block_on` drives the inner async work.
fn capture<F, Fut>(f: F) -> SnapshotVec
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    metrics::with_local_recorder(&recorder, || {
        tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(f()))
    });
    snapshotter.snapshot().into_vec()
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn fan_out_records_one_request_per_source() {
    let snapshot = capture(|| async {
        let engine = Huginn::builder()
            .source(Arc::new(GoodSource))
            .source(Arc::new(BrokenSource))
            .source(Arc::new(EmptySource))
            .build()
            .await
            .unwrap();
        engine.search("Frieren").await;
    });

    let requests = telemetry::SOURCE_REQUESTS_TOTAL;
    assert_eq!(counter_total(&snapshot, requests, &[]), 3);
    assert_eq!(
        counter_total(&snapshot, requests, &[("source", "dandan"), ("status", "ok")]),
        1
    );
    assert_eq!(
        counter_total(&snapshot, requests, &[("source", "bilibili"), ("status", "error")]),
        1
    );
    assert_eq!(
        counter_total(&snapshot, requests, &[("source", "tencent"), ("status", "empty")]),
        1
    );
    assert!(has_histogram(&snapshot, telemetry::SOURCE_DURATION_SECONDS));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn search_cache_hits_and_misses_are_counted() {
    let snapshot = capture(|| async {
        let engine = Huginn::builder()
            .source(Arc::new(GoodSource))
            .build()
            .await
            .unwrap();
        engine.search("Frieren").await;
        engine.search("Frieren").await;
    });

    let search = [("cache", "search")];
    assert_eq!(counter_total(&snapshot, telemetry::CACHE_MISSES_TOTAL, &search), 1);
    assert_eq!(counter_total(&snapshot, telemetry::CACHE_HITS_TOTAL, &search), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn store_writes_are_counted_per_collection() {
    let snapshot = capture(|| async {
        let engine = Huginn::builder()
            .source(Arc::new(GoodSource))
            .store(Arc::new(MemoryStore::new()))
            .build()
            .await
            .unwrap();
        engine.search("Frieren").await;
        engine.sync().await;
    });

    let writes = telemetry::STORE_WRITES_TOTAL;
    assert_eq!(counter_total(&snapshot, writes, &[("status", "ok")]), 3);
    assert_eq!(
        counter_total(&snapshot, writes, &[("collection", "lastSelectMap")]),
        0
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn malformed_comments_are_counted() {
    let snapshot = capture(|| async {
        let engine = Huginn::builder()
            .source(Arc::new(GoodSource))
            .build()
            .await
            .unwrap();
        let results = engine.search("Frieren").await;
        let key = CommentKey::Episode(results[0].episodes[0].id);
        let comments = engine.comments(&key).await.unwrap();
        assert_eq!(comments.len(), 1);
    });

    assert_eq!(
        counter_total(
            &snapshot,
            telemetry::COMMENTS_DROPPED_TOTAL,
            &[("reason", "malformed")]
        ),
        2
    );
    assert_eq!(
        counter_total(
            &snapshot,
            telemetry::SOURCE_REQUESTS_TOTAL,
            &[("operation", "fetch_comments"), ("status", "ok")]
        ),
        1
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn registry_evictions_are_counted() {
    let snapshot = capture(|| async {
        let engine = Huginn::builder()
            .source(Arc::new(TitleSource))
            .registry(huginn::RegistryConfig::new().max_animes(1))
            .build()
            .await
            .unwrap();
        let first = engine.search("Frieren").await;
        engine.search("Mushishi").await;
        assert!(engine.registry().anime(first[0].id).is_none());
    });

    assert_eq!(
        counter_total(
            &snapshot,
            telemetry::EVICTIONS_TOTAL,
            &[("collection", "animes")]
        ),
        1
    );
}

#[tokio::test]
async fn metrics_are_noop_without_recorder() {
    // Verify no panics when no recorder is installed.
    let engine = Huginn::builder()
        .source(Arc::new(GoodSource))
        .build()
        .await
        .unwrap();
    assert_eq!(engine.search("Frieren").await.len(), 1);
}
