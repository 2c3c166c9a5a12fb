//! Time-bucketed duplicate merging.

use std::collections::HashSet;

use crate::types::Comment;

/// Sort by offset and, when `group_minute > 0`, merge comments with the same
/// normalized content inside the same `group_minute`-minute bucket. The
/// earliest comment of each group survives.
pub fn dedup(mut comments: Vec<Comment>, group_minute: u32) -> Vec<Comment> {
    comments.sort_by(|a, b| a.offset_seconds.total_cmp(&b.offset_seconds));
    if group_minute == 0 {
        return comments;
    }

    let bucket_width = f64::from(group_minute) * 60.0;
    let mut seen = HashSet::new();
    comments
        .into_iter()
        .filter(|c| {
            let bucket = (c.offset_seconds / bucket_width).floor() as u64;
            seen.insert((bucket, normalize_content(&c.content)))
        })
        .collect()
}

/// Trim and collapse inner whitespace runs to one space.
pub fn normalize_content(content: &str) -> String {
    content.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CommentMode, SourceKind, WHITE};

    fn comment(id: i64, offset: f64, content: &str) -> Comment {
        Comment {
            id,
            offset_seconds: offset,
            mode: CommentMode::Scroll,
            color: WHITE,
            sender_id: String::new(),
            content: content.to_string(),
            source_platform: SourceKind::Dandan,
        }
    }

    #[test]
    fn same_bucket_duplicates_merge_to_earliest() {
        let out = dedup(
            vec![comment(2, 65.0, "lol"), comment(1, 61.0, " lol ")],
            1,
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, 1);
        assert_eq!(out[0].offset_seconds, 61.0);
    }

    #[test]
    fn zero_group_minute_keeps_everything_sorted() {
        let out = dedup(
            vec![comment(2, 65.0, "lol"), comment(1, 61.0, "lol")],
            0,
        );
        let ids: Vec<i64> = out.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn different_buckets_do_not_merge() {
        let out = dedup(
            vec![comment(1, 59.0, "lol"), comment(2, 61.0, "lol")],
            1,
        );
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn whitespace_is_normalized() {
        assert_eq!(normalize_content("  a \t b\n c "), "a b c");
    }
}
