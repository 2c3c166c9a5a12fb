//! Raw, per-platform payloads returned by sources before normalization.

use serde::{Deserialize, Serialize};

/// One search hit as reported by a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawItem {
    /// Identifier on the originating platform.
    pub original_id: String,
    pub title: String,
    pub url: String,
    /// Episodes in playback order; position `i` becomes index `i + 1`.
    #[serde(default)]
    pub episodes: Vec<RawEpisode>,
}

impl RawItem {
    pub fn new(
        original_id: impl Into<String>,
        title: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            original_id: original_id.into(),
            title: title.into(),
            url: url.into(),
            episodes: Vec::new(),
        }
    }

    /// Append an episode.
    pub fn episode(mut self, title: impl Into<String>, url: impl Into<String>) -> Self {
        self.episodes.push(RawEpisode {
            title: title.into(),
            url: url.into(),
        });
        self
    }
}

/// One episode within a [`RawItem`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEpisode {
    pub title: String,
    /// Comment target handed back to [`Source::fetch_comments`](crate::sources::Source::fetch_comments).
    pub url: String,
}

/// A comment exactly as a platform encodes it.
///
/// Mapping into [`Comment`](super::Comment) happens in
/// [`danmu::map`](crate::danmu::map); a variant that cannot be mapped is
/// dropped there rather than failing the batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RawComment {
    /// dandanplay encoding: `p = "time,mode,color,uid"`, `m = text`.
    Packed {
        #[serde(default)]
        cid: Option<i64>,
        p: String,
        m: String,
    },
    /// bilibili XML attributes: `"time,mode,size,color,timestamp,pool,uid,rowid"`.
    Bilibili { attrs: String, text: String },
    /// Already split into fields.
    Structured {
        #[serde(default)]
        id: Option<i64>,
        offset: f64,
        /// Numeric mode code (`"1"`, `"4"`, ...) or a name (`"top"`, `"scroll"`).
        #[serde(default)]
        mode: Option<String>,
        /// Decimal integer or `#RRGGBB`.
        #[serde(default)]
        color: Option<String>,
        #[serde(default)]
        sender: Option<String>,
        content: String,
    },
}
