//! Public types for the Huginn API.

mod anime;
mod comment;
mod raw;
mod source;

pub use anime::{AnimeRecord, EpisodeRecord, MatchResult};
pub use comment::{
    Comment, CommentFormat, CommentMode, CommentSegment, SegmentedComments, WHITE,
};
pub use raw::{RawComment, RawEpisode, RawItem};
pub use source::SourceKind;
