//! Output encodings for normalized comments.
//!
//! JSON follows the dandanplay comment response:
//!
//! ```json
//! {"count": 1, "comments": [{"cid": 1, "p": "12.50,1,16777215,uid", "m": "text"}]}
//! ```
//!
//! XML follows the bilibili danmaku document, where `p` is
//! `time,mode,fontsize,color,timestamp,pool,sender,id`.

use std::fmt::Write as _;

use serde::Serialize;

use crate::Result;
use crate::types::{Comment, CommentFormat};

/// Render `comments` (time-ordered) in `format`.
pub fn render<'a>(
    comments: impl IntoIterator<Item = &'a Comment>,
    format: CommentFormat,
) -> Result<String> {
    match format {
        CommentFormat::Json => to_json(comments),
        CommentFormat::Xml => Ok(to_xml(comments)),
    }
}

#[derive(Serialize)]
struct JsonDocument<'a> {
    count: usize,
    comments: Vec<JsonComment<'a>>,
}

#[derive(Serialize)]
struct JsonComment<'a> {
    cid: i64,
    p: String,
    m: &'a str,
}

pub fn to_json<'a>(comments: impl IntoIterator<Item = &'a Comment>) -> Result<String> {
    let comments: Vec<JsonComment<'a>> = comments
        .into_iter()
        .map(|c| JsonComment {
            cid: c.id,
            p: format!(
                "{:.2},{},{},{}",
                c.offset_seconds,
                c.mode.code(),
                c.color,
                p_field(&c.sender_id)
            ),
            m: &c.content,
        })
        .collect();
    Ok(serde_json::to_string(&JsonDocument {
        count: comments.len(),
        comments,
    })?)
}

pub fn to_xml<'a>(comments: impl IntoIterator<Item = &'a Comment>) -> String {
    let mut out = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<i>\n  <chatserver>chat.bilibili.com</chatserver>\n  <chatid>0</chatid>\n",
    );
    for c in comments {
        // Writing to a String cannot fail.
        let _ = writeln!(
            out,
            "  <d p=\"{:.2},{},25,{},0,0,{},{}\">{}</d>",
            c.offset_seconds,
            c.mode.code(),
            c.color,
            escape_xml(&p_field(&c.sender_id)),
            c.id,
            escape_xml(&c.content)
        );
    }
    out.push_str("</i>\n");
    out
}

/// Sender ids land in a comma-separated attribute; commas are stripped.
fn p_field(sender: &str) -> String {
    sender.chars().filter(|c| *c != ',').collect()
}

/// Escape markup characters and drop control characters XML 1.0 forbids.
fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '\t' | '\n' | '\r' => out.push(ch),
            c if (c as u32) < 0x20 => {}
            c => out.push(c),
        }
    }
    out
}
