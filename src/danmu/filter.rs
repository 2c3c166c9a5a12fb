//! Regex blocklist.

use regex::RegexSet;

use crate::types::Comment;
use crate::{HuginnError, Result};

/// Compiled set of blocking patterns. A comment whose content matches any
/// pattern is removed.
#[derive(Debug, Clone, Default)]
pub struct Blocklist {
    set: Option<RegexSet>,
}

impl Blocklist {
    /// Compile `patterns`. Blank patterns are ignored; an invalid one is a
    /// configuration error naming the pattern.
    pub fn new<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns: Vec<String> = patterns
            .into_iter()
            .map(|p| p.as_ref().trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        if patterns.is_empty() {
            return Ok(Self::default());
        }
        for pattern in &patterns {
            regex::Regex::new(pattern).map_err(|e| {
                HuginnError::Configuration(format!("invalid blocklist pattern '{pattern}': {e}"))
            })?;
        }
        let set = RegexSet::new(&patterns)
            .map_err(|e| HuginnError::Configuration(format!("invalid blocklist: {e}")))?;
        Ok(Self { set: Some(set) })
    }

    /// Parse one pattern per line; lines starting with `#` are comments.
    pub fn from_lines(text: &str) -> Result<Self> {
        Self::new(text.lines().filter(|l| !l.trim_start().starts_with('#')))
    }

    pub fn patterns(&self) -> &[String] {
        self.set.as_ref().map(RegexSet::patterns).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_none()
    }

    pub fn is_blocked(&self, content: &str) -> bool {
        self.set.as_ref().is_some_and(|set| set.is_match(content))
    }

    /// Drop blocked comments. Returns the survivors and the number removed.
    pub fn apply(&self, comments: Vec<Comment>) -> (Vec<Comment>, usize) {
        if self.is_empty() {
            return (comments, 0);
        }
        let before = comments.len();
        let kept: Vec<Comment> = comments
            .into_iter()
            .filter(|c| !self.is_blocked(&c.content))
            .collect();
        let removed = before - kept.len();
        (kept, removed)
    }
}
