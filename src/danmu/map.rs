//! Raw platform comments → [`Comment`].
//!
//! Mode codes follow the dandanplay/bilibili convention:
//! `1`, `2`, `3`, `6` scroll, `4` bottom, `5` top. Anything that cannot be
//! mapped (unknown mode, an offset outside `0..=MAX_OFFSET_SECONDS`, color
//! outside `0..=0xFFFFFF`, empty text, unparseable fields) is a
//! [`MalformedPayload`](HuginnError::MalformedPayload) for that one comment.

use tracing::debug;

use crate::telemetry;
use crate::types::{Comment, CommentMode, RawComment, SourceKind, WHITE};
use crate::{HuginnError, Result};

/// Latest accepted offset: 24 hours.
pub const MAX_OFFSET_SECONDS: f64 = 24.0 * 60.0 * 60.0;

/// Map a batch, dropping (and counting) the comments that fail.
///
/// Comments without an id get `position + 1`.
pub fn map_comments(raw: Vec<RawComment>, platform: SourceKind) -> Vec<Comment> {
    let total = raw.len();
    let mapped: Vec<Comment> = raw
        .iter()
        .enumerate()
        .filter_map(|(position, item)| match map_one(item, position, platform) {
            Ok(comment) => Some(comment),
            Err(e) => {
                debug!(source = %platform, position, error = %e, "dropping comment");
                None
            }
        })
        .collect();

    let dropped = total - mapped.len();
    if dropped > 0 {
        metrics::counter!(telemetry::COMMENTS_DROPPED_TOTAL, "reason" => "malformed")
            .increment(dropped as u64);
    }
    mapped
}

/// Map a single raw comment.
pub fn map_one(raw: &RawComment, position: usize, platform: SourceKind) -> Result<Comment> {
    let fallback_id = position as i64 + 1;
    match raw {
        RawComment::Packed { cid, p, m } => {
            let fields: Vec<&str> = p.split(',').map(str::trim).collect();
            if fields.len() < 3 {
                return Err(malformed(format!("packed attributes '{p}'")));
            }
            Ok(Comment {
                id: cid.unwrap_or(fallback_id),
                offset_seconds: parse_offset(fields[0])?,
                mode: mode_from_code(fields[1])?,
                color: parse_color(fields[2])?,
                sender_id: fields.get(3).copied().unwrap_or_default().to_string(),
                content: content(m)?,
                source_platform: platform,
            })
        }
        RawComment::Bilibili { attrs, text } => {
            let fields: Vec<&str> = attrs.split(',').map(str::trim).collect();
            if fields.len() < 4 {
                return Err(malformed(format!("bilibili attributes '{attrs}'")));
            }
            Ok(Comment {
                id: fields
                    .get(7)
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(fallback_id),
                offset_seconds: parse_offset(fields[0])?,
                mode: mode_from_code(fields[1])?,
                color: parse_color(fields[3])?,
                sender_id: fields.get(6).copied().unwrap_or_default().to_string(),
                content: content(text)?,
                source_platform: platform,
            })
        }
        RawComment::Structured {
            id,
            offset,
            mode,
            color,
            sender,
            content: text,
        } => Ok(Comment {
            id: id.unwrap_or(fallback_id),
            offset_seconds: check_offset(*offset)?,
            mode: match mode {
                Some(m) => parse_mode(m)?,
                None => CommentMode::Scroll,
            },
            color: match color {
                Some(c) => parse_color(c)?,
                None => WHITE,
            },
            sender_id: sender.clone().unwrap_or_default(),
            content: content(text)?,
            source_platform: platform,
        }),
    }
}

/// Numeric mode code to display mode.
pub fn mode_from_code(code: &str) -> Result<CommentMode> {
    match code.trim().parse::<i64>() {
        Ok(1 | 2 | 3 | 6) => Ok(CommentMode::Scroll),
        Ok(4) => Ok(CommentMode::Bottom),
        Ok(5) => Ok(CommentMode::Top),
        _ => Err(malformed(format!("mode '{code}'"))),
    }
}

/// Numeric code or a name: `scroll`/`rtl`, `top`, `bottom`.
fn parse_mode(mode: &str) -> Result<CommentMode> {
    match mode.trim().to_ascii_lowercase().as_str() {
        "scroll" | "rtl" | "right" | "normal" => Ok(CommentMode::Scroll),
        "top" => Ok(CommentMode::Top),
        "bottom" => Ok(CommentMode::Bottom),
        other => mode_from_code(other),
    }
}

/// Decimal integer or `#RRGGBB`.
pub fn parse_color(color: &str) -> Result<u32> {
    let color = color.trim();
    let parsed = match color.strip_prefix('#') {
        Some(hex) if hex.len() == 6 => u32::from_str_radix(hex, 16).ok(),
        Some(_) => None,
        None => color.parse::<u32>().ok(),
    };
    parsed
        .filter(|c| *c <= WHITE)
        .ok_or_else(|| malformed(format!("color '{color}'")))
}

fn parse_offset(field: &str) -> Result<f64> {
    let offset = field
        .parse::<f64>()
        .map_err(|_| malformed(format!("offset '{field}'")))?;
    check_offset(offset)
}

fn check_offset(offset: f64) -> Result<f64> {
    if offset.is_finite() && (0.0..=MAX_OFFSET_SECONDS).contains(&offset) {
        Ok(offset)
    } else {
        Err(malformed(format!("offset {offset}")))
    }
}

fn content(text: &str) -> Result<String> {
    if text.trim().is_empty() {
        return Err(malformed("empty text".to_string()));
    }
    Ok(text.to_string())
}

fn malformed(what: String) -> HuginnError {
    HuginnError::MalformedPayload(what)
}
