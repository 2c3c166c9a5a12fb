//! Canonical comment model and time segments.

use serde::{Deserialize, Serialize};

use super::SourceKind;

/// Default color: white.
pub const WHITE: u32 = 0xFF_FF_FF;

/// How a comment is displayed over the video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommentMode {
    Scroll,
    Top,
    Bottom,
}

impl CommentMode {
    /// dandanplay / bilibili numeric mode code.
    pub fn code(&self) -> u8 {
        match self {
            CommentMode::Scroll => 1,
            CommentMode::Bottom => 4,
            CommentMode::Top => 5,
        }
    }
}

/// A normalized danmu comment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: i64,
    /// Playback position in seconds.
    pub offset_seconds: f64,
    pub mode: CommentMode,
    /// `0xRRGGBB`.
    pub color: u32,
    pub sender_id: String,
    pub content: String,
    pub source_platform: SourceKind,
}

/// A fixed-width window `[start, end)` of a comment stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentSegment {
    pub start: f64,
    pub end: f64,
    pub comments: Vec<Comment>,
}

impl CommentSegment {
    /// Whether `time` falls inside `[start, end)`.
    pub fn contains(&self, time: f64) -> bool {
        time >= self.start && time < self.end
    }
}

/// Comments partitioned into fixed-width windows ordered by start time.
///
/// Only windows holding comments are present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentedComments {
    pub segment_width: f64,
    pub segments: Vec<CommentSegment>,
}

impl SegmentedComments {
    /// Total number of comments across all segments.
    pub fn len(&self) -> usize {
        self.segments.iter().map(|s| s.comments.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All comments in time order.
    pub fn iter(&self) -> impl Iterator<Item = &Comment> {
        self.segments.iter().flat_map(|s| s.comments.iter())
    }
}

/// Output encoding for [`Huginn::export_comments`](crate::Huginn::export_comments).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommentFormat {
    /// dandanplay-shaped `{ "count": n, "comments": [{ "cid", "p", "m" }] }`.
    #[default]
    Json,
    /// bilibili-shaped `<i><d p="...">text</d></i>`.
    Xml,
}

impl std::str::FromStr for CommentFormat {
    type Err = crate::HuginnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(CommentFormat::Json),
            "xml" => Ok(CommentFormat::Xml),
            other => Err(crate::HuginnError::InvalidInput(format!(
                "unknown comment format '{other}'"
            ))),
        }
    }
}
