//! Platform identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::HuginnError;

/// The external platform a record or comment came from.
///
/// Also the key of the [`SourceTable`](crate::sources::SourceTable): at most
/// one [`Source`](crate::sources::Source) is registered per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// dandanplay-compatible open API.
    Dandan,
    Bilibili,
    Tencent,
    Iqiyi,
    Youku,
    Mgtv,
    Renren,
    Hanjutv,
    Bahamut,
}

impl SourceKind {
    /// Every known kind, in declaration order.
    pub const ALL: [SourceKind; 9] = [
        SourceKind::Dandan,
        SourceKind::Bilibili,
        SourceKind::Tencent,
        SourceKind::Iqiyi,
        SourceKind::Youku,
        SourceKind::Mgtv,
        SourceKind::Renren,
        SourceKind::Hanjutv,
        SourceKind::Bahamut,
    ];

    /// Lowercase identifier used in configuration and serialized state.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Dandan => "dandan",
            SourceKind::Bilibili => "bilibili",
            SourceKind::Tencent => "tencent",
            SourceKind::Iqiyi => "iqiyi",
            SourceKind::Youku => "youku",
            SourceKind::Mgtv => "mgtv",
            SourceKind::Renren => "renren",
            SourceKind::Hanjutv => "hanjutv",
            SourceKind::Bahamut => "bahamut",
        }
    }

    /// Parse a comma-separated priority list such as `"dandan, bilibili"`.
    ///
    /// Blank entries are ignored; duplicates keep their first position.
    pub fn parse_list(list: &str) -> crate::Result<Vec<SourceKind>> {
        let mut kinds = Vec::new();
        for name in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let kind = name.parse()?;
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        Ok(kinds)
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = HuginnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        SourceKind::ALL
            .into_iter()
            .find(|k| k.as_str() == lower)
            .ok_or_else(|| HuginnError::Configuration(format!("unknown source '{s}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("Bilibili".parse::<SourceKind>().unwrap(), SourceKind::Bilibili);
        assert_eq!(" dandan ".parse::<SourceKind>().unwrap(), SourceKind::Dandan);
    }

    #[test]
    fn parse_unknown_is_configuration_error() {
        let err = "netflix".parse::<SourceKind>().unwrap_err();
        assert!(matches!(err, HuginnError::Configuration(_)));
    }

    #[test]
    fn parse_list_keeps_order_and_drops_duplicates() {
        let kinds = SourceKind::parse_list("tencent,dandan,,tencent, mgtv").unwrap();
        assert_eq!(
            kinds,
            vec![SourceKind::Tencent, SourceKind::Dandan, SourceKind::Mgtv]
        );
    }

    #[test]
    fn serde_uses_lowercase_names() {
        let json = serde_json::to_string(&SourceKind::Iqiyi).unwrap();
        assert_eq!(json, "\"iqiyi\"");
        let back: SourceKind = serde_json::from_str("\"hanjutv\"").unwrap();
        assert_eq!(back, SourceKind::Hanjutv);
    }
}
