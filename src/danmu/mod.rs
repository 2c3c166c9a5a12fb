//! Danmu normalization pipeline.
//!
//! ```text
//! Vec<RawComment> ─► map ─► filter ─► dedup ─► post-process ─► segment
//!                   (drop    (block-   (bucket   (scroll,        (windows of
//!                malformed)   list)     merge)    color, cap)    segment_width)
//! ```
//!
//! [`prepare`] runs everything up to post-processing and is what the engine
//! caches; [`segment`] is applied per request. [`normalize`] does both.

pub mod dedup;
pub mod filter;
pub mod map;
pub mod render;
pub mod segment;

pub use filter::Blocklist;
pub use segment::{DEFAULT_SEGMENT_WIDTH, segment_at};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::telemetry;
use crate::types::{Comment, CommentMode, RawComment, SegmentedComments, SourceKind, WHITE};

/// Color handling after normalization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorPolicy {
    /// Keep the source color.
    #[default]
    Keep,
    /// Render everything white.
    White,
}

/// Pipeline settings.
///
/// ```rust
/// # use huginn::danmu::{Blocklist, DanmuOptions};
/// let options = DanmuOptions::new()
///     .group_minute(2)
///     .segment_width(120.0)
///     .max_comments(5000)
///     .blocklist(Blocklist::new(["^spam"]).unwrap());
/// assert_eq!(options.group_minute, 2);
/// ```
#[derive(Debug, Clone)]
pub struct DanmuOptions {
    pub blocklist: Blocklist,
    /// Dedup bucket width in minutes; 0 disables merging. Default: 1.
    pub group_minute: u32,
    /// Segment width in seconds. Default: 300.
    pub segment_width: f64,
    /// Convert top/bottom comments to scrolling ones. Default: false.
    pub force_scroll: bool,
    pub color: ColorPolicy,
    /// Cap per video; 0 = unlimited. Default: 0.
    pub max_comments: usize,
}

impl Default for DanmuOptions {
    fn default() -> Self {
        Self {
            blocklist: Blocklist::default(),
            group_minute: 1,
            segment_width: DEFAULT_SEGMENT_WIDTH,
            force_scroll: false,
            color: ColorPolicy::Keep,
            max_comments: 0,
        }
    }
}

impl DanmuOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn blocklist(mut self, blocklist: Blocklist) -> Self {
        self.blocklist = blocklist;
        self
    }

    pub fn group_minute(mut self, minutes: u32) -> Self {
        self.group_minute = minutes;
        self
    }

    /// Non-positive or non-finite widths fall back to the default.
    pub fn segment_width(mut self, seconds: f64) -> Self {
        self.segment_width = if seconds.is_finite() && seconds > 0.0 {
            seconds
        } else {
            DEFAULT_SEGMENT_WIDTH
        };
        self
    }

    pub fn force_scroll(mut self, enabled: bool) -> Self {
        self.force_scroll = enabled;
        self
    }

    pub fn color(mut self, policy: ColorPolicy) -> Self {
        self.color = policy;
        self
    }

    pub fn max_comments(mut self, n: usize) -> Self {
        self.max_comments = n;
        self
    }
}

/// Map, filter, dedup and post-process one video's raw comments.
///
/// The result is time-ordered and ready to cache.
pub fn prepare(raw: Vec<RawComment>, platform: SourceKind, options: &DanmuOptions) -> Vec<Comment> {
    let total = raw.len();
    let mapped = map::map_comments(raw, platform);

    let (kept, blocked) = options.blocklist.apply(mapped);
    count_dropped("blocked", blocked);

    let before = kept.len();
    let deduped = dedup::dedup(kept, options.group_minute);
    count_dropped("duplicate", before - deduped.len());

    let before = deduped.len();
    let comments = post_process(deduped, options);
    count_dropped("sampled", before - comments.len());

    debug!(
        source = %platform,
        total,
        blocked,
        kept = comments.len(),
        "comments prepared"
    );
    comments
}

/// Split prepared comments into windows of `options.segment_width`.
pub fn segment(comments: Vec<Comment>, options: &DanmuOptions) -> SegmentedComments {
    segment::segment(comments, options.segment_width)
}

/// [`prepare`] followed by [`segment`].
pub fn normalize(
    raw: Vec<RawComment>,
    platform: SourceKind,
    options: &DanmuOptions,
) -> SegmentedComments {
    segment(prepare(raw, platform, options), options)
}

fn post_process(mut comments: Vec<Comment>, options: &DanmuOptions) -> Vec<Comment> {
    for comment in &mut comments {
        if options.force_scroll {
            comment.mode = CommentMode::Scroll;
        }
        if options.color == ColorPolicy::White {
            comment.color = WHITE;
        }
    }
    sample_evenly(comments, options.max_comments)
}

/// Keep `max` evenly spaced comments, preserving order. `0` keeps all.
fn sample_evenly(comments: Vec<Comment>, max: usize) -> Vec<Comment> {
    let len = comments.len();
    if max == 0 || len <= max {
        return comments;
    }
    let mut picks = (0..max).map(|i| i * len / max).peekable();
    comments
        .into_iter()
        .enumerate()
        .filter_map(|(i, c)| {
            if picks.peek() == Some(&i) {
                picks.next();
                Some(c)
            } else {
                None
            }
        })
        .collect()
}

fn count_dropped(reason: &'static str, n: usize) {
    if n > 0 {
        metrics::counter!(telemetry::COMMENTS_DROPPED_TOTAL, "reason" => reason).increment(n as u64);
    }
}
