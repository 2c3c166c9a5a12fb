//! Canonical anime and episode records.
//!
//! Records are owned by the [`IdentityRegistry`](crate::registry::IdentityRegistry);
//! everything else refers to them by id. Field names serialize in camelCase,
//! which is also the shape persisted to the external store.

use serde::{Deserialize, Serialize};

use super::SourceKind;

/// A title as seen on one platform, with a registry-issued id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnimeRecord {
    pub id: i64,
    pub title: String,
    pub platform: SourceKind,
    /// Identifier on the originating platform.
    pub original_id: String,
    pub url: String,
    /// Episodes in index order.
    #[serde(default)]
    pub episodes: Vec<EpisodeRecord>,
}

/// One episode of an [`AnimeRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpisodeRecord {
    pub id: i64,
    /// Back-reference to the owning anime.
    pub anime_id: i64,
    /// 1-based position within the anime.
    pub index: u32,
    pub title: String,
    /// Where the source fetches this episode's comments from.
    pub source_url: String,
}

/// Result of [`Huginn::auto_match`](crate::Huginn::auto_match).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub anime_id: i64,
    pub anime_title: String,
    pub platform: SourceKind,
    pub episode: EpisodeRecord,
}
