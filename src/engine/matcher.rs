//! Video file name parsing for auto-match.
//!
//! Recognized forms (extension and leading `[group]` tags are ignored):
//!
//! - `Title S01E03`, `Title.S01E03.1080p`
//! - `Title E03`, `Title EP03`
//! - `Title 第3集`, `Title 第03话`
//! - `Title - 03`
//!
//! A name without an episode marker is taken as a single-episode title
//! (episode 1).

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// Parsed file name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedName {
    pub title: String,
    pub season: Option<u32>,
    pub episode: u32,
}

const PATTERNS: &[&str] = &[
    r"(?i)^(?P<title>.+?)[\s._\-]*S(?P<season>\d{1,2})[\s._]*E(?P<episode>\d{1,4})(?:\D|$)",
    r"(?i)^(?P<title>.+?)[\s._\-]+EP?(?P<episode>\d{1,4})(?:\D|$)",
    r"^(?P<title>.+?)\s*第\s*(?P<episode>\d{1,4})\s*[集话話]",
    r"^(?P<title>.+?)\s+-\s+(?P<episode>\d{1,4})(?:\D|$)",
];

static COMPILED: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    PATTERNS
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
});

static LEADING_TAGS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(?:\s*[\[【][^\]】]*[\]】])+").ok());

/// Parse `file_name`; `None` when no title remains.
pub fn parse_file_name(file_name: &str) -> Option<ParsedName> {
    let stem = strip_extension(file_name.trim());
    let stem = match LEADING_TAGS.as_ref() {
        Some(tags) => tags.replace(stem, "").into_owned(),
        None => stem.to_string(),
    };

    for pattern in COMPILED.iter() {
        let Some(caps) = pattern.captures(&stem) else {
            continue;
        };
        let title = clean_title(&caps["title"]);
        let Some(episode) = caps.name("episode").and_then(|m| m.as_str().parse().ok()) else {
            continue;
        };
        if title.is_empty() {
            continue;
        }
        return Some(ParsedName {
            title,
            season: caps.name("season").and_then(|m| m.as_str().parse().ok()),
            episode,
        });
    }

    let title = clean_title(&stem);
    (!title.is_empty()).then_some(ParsedName {
        title,
        season: None,
        episode: 1,
    })
}

fn strip_extension(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, ext))
            if (2..=4).contains(&ext.len()) && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            stem
        }
        _ => name,
    }
}

fn clean_title(raw: &str) -> String {
    raw.replace(['.', '_'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_matches(|c: char| c == '-' || c.is_whitespace())
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(title: &str, season: Option<u32>, episode: u32) -> Option<ParsedName> {
        Some(ParsedName {
            title: title.to_string(),
            season,
            episode,
        })
    }

    #[test]
    fn all_patterns_compile() {
        assert_eq!(COMPILED.len(), PATTERNS.len());
        assert!(LEADING_TAGS.is_some());
    }

    #[test]
    fn season_episode_form() {
        assert_eq!(
            parse_file_name("Frieren S01E03.mkv"),
            parsed("Frieren", Some(1), 3)
        );
        assert_eq!(
            parse_file_name("Spy.x.Family.S02E11.1080p.WEB.mp4"),
            parsed("Spy x Family", Some(2), 11)
        );
    }

    #[test]
    fn episode_only_form() {
        assert_eq!(parse_file_name("Frieren E07"), parsed("Frieren", None, 7));
        assert_eq!(parse_file_name("Frieren EP12.mp4"), parsed("Frieren", None, 12));
    }

    #[test]
    fn chinese_form_and_tags() {
        assert_eq!(
            parse_file_name("[SubGroup]葬送的芙莉莲 第3集.mp4"),
            parsed("葬送的芙莉莲", None, 3)
        );
        assert_eq!(parse_file_name("庆余年 第 12 话"), parsed("庆余年", None, 12));
    }

    #[test]
    fn dash_form() {
        assert_eq!(
            parse_file_name("[Group] Bocchi the Rock - 05 [1080p].mkv"),
            parsed("Bocchi the Rock", None, 5)
        );
    }

    #[test]
    fn bare_title_is_episode_one() {
        assert_eq!(parse_file_name("Your Name.mkv"), parsed("Your Name", None, 1));
        assert_eq!(parse_file_name("  "), None);
    }
}
