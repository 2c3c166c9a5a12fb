//! Huginn - multi-source danmu aggregation with stateful caching
//!
//! This crate searches several independently failing danmu sources
//! concurrently, gives every title and episode it sees a stable numeric id,
//! normalizes and time-segments comment streams, and mirrors its identity
//! state to an external key-value store only when that state has changed.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use huginn::{CommentKey, DandanSource, Huginn};
//!
//! #[tokio::main]
//! async fn main() -> huginn::Result<()> {
//!     let engine = Huginn::builder()
//!         .source(Arc::new(DandanSource::new()?))
//!         .build()
//!         .await?;
//!
//!     let results = engine.search("Frieren").await;
//!     let Some(episode) = results.first().and_then(|a| a.episodes.first()) else {
//!         return Ok(());
//!     };
//!
//!     let comments = engine.comments(&CommentKey::Episode(episode.id)).await?;
//!     println!("{} comments in {} windows", comments.len(), comments.segments.len());
//!
//!     let window = engine.comments_at(&CommentKey::Episode(episode.id), 305.0).await?;
//!     println!("{} comments between {}s and {}s", window.comments.len(), window.start, window.end);
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`registry`]: bounded anime/episode id registry
//! - [`cache`]: FIFO + TTL caches and request bookkeeping
//! - [`sync`]: state hashing and change-driven persistence
//! - [`sources`]: the [`Source`] contract and concurrent fan-out
//! - [`danmu`]: comment normalization, segmentation and rendering
//! - [`engine`]: the [`Huginn`] facade
//! - [`config`]: TOML configuration and secrets

pub mod cache;
pub mod config;
pub mod danmu;
pub mod engine;
pub mod error;
pub mod registry;
pub mod sources;
pub mod sync;
pub mod telemetry;
pub mod types;

// Re-export main types at crate root
pub use cache::{BoundedCache, CacheConfig, HistoryConfig, RequestHistory, RequestStats};
pub use config::{Config, Secrets};
pub use danmu::{Blocklist, ColorPolicy, DanmuOptions};
pub use engine::{CommentKey, Huginn, HuginnBuilder, StateReport};
pub use error::{HuginnError, Result};
pub use registry::{IdentityRegistry, RegistryConfig};
pub use sources::{FanOut, RetryConfig, RetryingSource, Source, SourceTable};
pub use sync::{
    Collection, KvStore, MemoryStore, StateHashSnapshot, StateSync, SyncConfig, SyncReport,
};
pub use telemetry::{LogBuffer, LogRecord};

#[cfg(feature = "dandan")]
pub use sources::DandanSource;
#[cfg(feature = "upstash")]
pub use sync::UpstashStore;

// Re-export all types
pub use types::{
    AnimeRecord, Comment, CommentFormat, CommentMode, CommentSegment, EpisodeRecord, MatchResult,
    RawComment, RawEpisode, RawItem, SegmentedComments, SourceKind,
};
