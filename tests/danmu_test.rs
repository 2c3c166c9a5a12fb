//! Tests for the comment pipeline as exposed by `huginn::danmu`.

use huginn::danmu::{self, render};
use huginn::{
    Blocklist, CommentFormat, CommentMode, DanmuOptions, HuginnError, RawComment, SourceKind,
};

fn mixed_batch() -> Vec<RawComment> {
    vec![
        RawComment::Bilibili {
            attrs: "61.2,1,25,16777215,1700000000,0,9a8b7c,4455".to_string(),
            text: "  nice   shot ".to_string(),
        },
        RawComment::Structured {
            id: Some(9),
            offset: 65.0,
            mode: Some("scroll".to_string()),
            color: Some("#00FF00".to_string()),
            sender: Some("viewer".to_string()),
            content: "nice shot".to_string(),
        },
        RawComment::Packed {
            cid: None,
            p: "2.5,4,16711680,u1".to_string(),
            m: "bottom <b>text</b>".to_string(),
        },
        RawComment::Packed {
            cid: Some(77),
            p: "-1,1,0".to_string(),
            m: "negative offset".to_string(),
        },
        RawComment::Structured {
            id: None,
            offset: 400.0,
            mode: None,
            color: None,
            sender: None,
            content: "   ".to_string(),
        },
    ]
}

#[test]
fn mixed_encodings_are_normalized() {
    let comments = danmu::prepare(mixed_batch(), SourceKind::Bilibili, &DanmuOptions::default());

    // Negative offset and blank content dropped; "nice shot" at 61.2s and
    // 65s fall in the same minute and merge into the earlier one.
    assert_eq!(comments.len(), 2);

    let bottom = &comments[0];
    assert_eq!(bottom.offset_seconds, 2.5);
    assert_eq!(bottom.mode, CommentMode::Bottom);
    assert_eq!(bottom.color, 0xFF0000);
    assert_eq!(bottom.id, 3, "missing id falls back to position + 1");

    let merged = &comments[1];
    assert_eq!(merged.id, 4455);
    assert_eq!(merged.sender_id, "9a8b7c");
    assert_eq!(merged.source_platform, SourceKind::Bilibili);
}

#[test]
fn without_grouping_duplicates_are_kept() {
    let options = DanmuOptions::new().group_minute(0);
    let comments = danmu::prepare(mixed_batch(), SourceKind::Bilibili, &options);
    assert_eq!(comments.len(), 3);
}

#[test]
fn normalize_segments_the_prepared_stream() {
    let options = DanmuOptions::new().segment_width(60.0);
    let segmented = danmu::normalize(mixed_batch(), SourceKind::Bilibili, &options);

    assert_eq!(segmented.segment_width, 60.0);
    assert_eq!(segmented.segments.len(), 2);
    assert_eq!(segmented.segments[0].comments.len(), 1);
    assert_eq!(segmented.segments[1].start, 60.0);

    let window = danmu::segment_at(&segmented, 61.0).unwrap();
    assert_eq!(window.comments[0].id, 4455);
    assert!(matches!(
        danmu::segment_at(&segmented, -0.5),
        Err(HuginnError::InvalidInput(_))
    ));
}

#[test]
fn blocklist_from_lines_skips_blanks_and_comments() {
    let blocklist = Blocklist::from_lines("# ads\n\n(?i)subscribe\n^\\d+$\n").unwrap();
    assert_eq!(blocklist.patterns().len(), 2);
    assert!(blocklist.is_blocked("Please SUBSCRIBE"));
    assert!(blocklist.is_blocked("233333"));
    assert!(!blocklist.is_blocked("233 lol"));

    let err = Blocklist::new(["ok", "(unclosed"]).unwrap_err();
    assert!(matches!(err, HuginnError::Configuration(ref msg) if msg.contains("(unclosed")));
}

#[test]
fn rendered_xml_escapes_markup() {
    let comments = danmu::prepare(mixed_batch(), SourceKind::Dandan, &DanmuOptions::default());
    let xml = render::render(&comments, CommentFormat::Xml).unwrap();
    assert!(xml.contains("bottom &lt;b&gt;text&lt;/b&gt;"));
    assert!(!xml.contains("<b>"));

    let json = render::render(&comments, CommentFormat::Json).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["count"], 2);
    assert_eq!(value["comments"][0]["p"], "2.50,4,16711680,u1");
}

#[test]
fn blocklist_runs_before_same_minute_merge() {
    let raw = vec![
        RawComment::Packed {
            cid: Some(1),
            p: "61,1,16777215,u1".to_string(),
            m: "a  b".to_string(),
        },
        RawComment::Packed {
            cid: Some(2),
            p: "65,1,16777215,u2".to_string(),
            m: "a b".to_string(),
        },
    ];
    let options = DanmuOptions::new()
        .group_minute(1)
        .blocklist(Blocklist::new(["a  b"]).unwrap());

    let comments = danmu::prepare(raw, SourceKind::Dandan, &options);

    // Merged first, the pair would collapse into the blocked 61s comment.
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0].id, 2);
    assert_eq!(comments[0].offset_seconds, 65.0);
    assert_eq!(comments[0].content, "a b");
}

#[test]
fn far_offset_comment_is_dropped_without_growing_segments() {
    let raw = vec![
        RawComment::Packed {
            cid: Some(1),
            p: "10,1,16777215,u1".to_string(),
            m: "early".to_string(),
        },
        RawComment::Packed {
            cid: Some(2),
            p: "1e12,1,16777215,u2".to_string(),
            m: "far future".to_string(),
        },
        RawComment::Structured {
            id: Some(3),
            offset: 3e8,
            mode: None,
            color: None,
            sender: None,
            content: "also far".to_string(),
        },
    ];
    let segmented = danmu::normalize(raw, SourceKind::Dandan, &DanmuOptions::default());

    assert_eq!(segmented.len(), 1);
    assert_eq!(segmented.segments.len(), 1);
    assert!(danmu::segment_at(&segmented, 3e8).unwrap().comments.is_empty());
}

#[test]
fn sparse_windows_leave_gaps_empty() {
    let raw = vec![
        RawComment::Packed {
            cid: Some(1),
            p: "10,1,16777215,u1".to_string(),
            m: "opening".to_string(),
        },
        RawComment::Packed {
            cid: Some(2),
            p: "3600,1,16777215,u2".to_string(),
            m: "an hour in".to_string(),
        },
    ];
    let segmented = danmu::normalize(raw, SourceKind::Dandan, &DanmuOptions::default());

    let starts: Vec<f64> = segmented.segments.iter().map(|s| s.start).collect();
    assert_eq!(starts, vec![0.0, 3600.0]);
    let gap = danmu::segment_at(&segmented, 1800.0).unwrap();
    assert_eq!((gap.start, gap.end), (1800.0, 2100.0));
    assert!(gap.comments.is_empty());
    assert_eq!(danmu::segment_at(&segmented, 3700.0).unwrap().comments[0].id, 2);
}
