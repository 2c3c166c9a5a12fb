//! Fixed-width time windows.

use crate::types::{Comment, CommentSegment, SegmentedComments};
use crate::{HuginnError, Result};

/// Default window width in seconds.
pub const DEFAULT_SEGMENT_WIDTH: f64 = 300.0;

/// Partition `comments` into `[k*w, (k+1)*w)` windows ordered by start.
///
/// Only windows holding at least one comment are materialized; gaps are
/// answered by [`segment_at`] with an empty window.
pub fn segment(comments: Vec<Comment>, width: f64) -> SegmentedComments {
    let width = effective_width(width);
    let mut segments: Vec<CommentSegment> = Vec::new();
    for comment in comments {
        let index = window_index(comment.offset_seconds, width);
        let last = segments.last().map(|s| start_index(s, width));
        let pos = match last {
            Some(last) if last == index => segments.len() - 1,
            None => {
                segments.push(empty_window(index, width));
                0
            }
            Some(last) if last < index => {
                segments.push(empty_window(index, width));
                segments.len() - 1
            }
            Some(_) => match find_window(&segments, index, width) {
                Ok(pos) => pos,
                Err(pos) => {
                    segments.insert(pos, empty_window(index, width));
                    pos
                }
            },
        };
        segments[pos].comments.push(comment);
    }
    SegmentedComments {
        segment_width: width,
        segments,
    }
}

/// The window containing `time`; empty when no comment falls inside it.
///
/// Negative or non-finite times are rejected.
pub fn segment_at(segmented: &SegmentedComments, time: f64) -> Result<CommentSegment> {
    if !time.is_finite() || time < 0.0 {
        return Err(HuginnError::InvalidInput(format!(
            "playback time must be a non-negative number, got {time}"
        )));
    }
    let width = effective_width(segmented.segment_width);
    let index = window_index(time, width);
    Ok(match find_window(&segmented.segments, index, width) {
        Ok(pos) => segmented.segments[pos].clone(),
        Err(_) => empty_window(index, width),
    })
}

fn find_window(
    segments: &[CommentSegment],
    index: usize,
    width: f64,
) -> std::result::Result<usize, usize> {
    segments.binary_search_by_key(&index, |s| start_index(s, width))
}

fn empty_window(index: usize, width: f64) -> CommentSegment {
    let start = index as f64 * width;
    CommentSegment {
        start,
        end: start + width,
        comments: Vec::new(),
    }
}

fn window_index(time: f64, width: f64) -> usize {
    (time / width).floor() as usize
}

/// Window number of an existing segment; `start` is an exact multiple of
/// `width` up to rounding.
fn start_index(segment: &CommentSegment, width: f64) -> usize {
    (segment.start / width).round() as usize
}

fn effective_width(width: f64) -> f64 {
    if width.is_finite() && width > 0.0 {
        width
    } else {
        DEFAULT_SEGMENT_WIDTH
    }
}
