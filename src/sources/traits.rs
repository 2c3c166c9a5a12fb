//! The uniform contract every danmu source implements.
//!
//! A source knows how to find titles on one platform and how to pull the raw
//! comment stream of one of its episodes. Everything platform-specific stays
//! behind this trait; the fan-out coordinator and the normalization pipeline
//! only ever see [`RawItem`] and [`RawComment`].
//!
//! # Example
//!
//! ```ignore
//! struct StaticSource;
//!
//! #[async_trait]
//! impl Source for StaticSource {
//!     fn kind(&self) -> SourceKind {
//!         SourceKind::Bilibili
//!     }
//!
//!     async fn search(&self, title: &str) -> Result<Vec<RawItem>> {
//!         Ok(vec![RawItem::new("ss1", title, "https://example.com/ss1")])
//!     }
//!
//!     async fn fetch_comments(&self, _target: &str) -> Result<Vec<RawComment>> {
//!         Ok(Vec::new())
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::Result;
use crate::types::{RawComment, RawItem, SourceKind};

/// A platform that can be searched and asked for comments.
#[async_trait]
pub trait Source: Send + Sync {
    /// Platform this source speaks for.
    fn kind(&self) -> SourceKind;

    /// Source name for logging/debugging. Defaults to the platform name.
    fn name(&self) -> &str {
        self.kind().as_str()
    }

    /// Search the platform for `title`.
    ///
    /// An empty list means "nothing found", not an error.
    async fn search(&self, title: &str) -> Result<Vec<RawItem>>;

    /// Fetch the raw comments of one episode. `target` is the episode url
    /// this source reported in [`RawItem::episodes`], or a user-supplied
    /// video url this source [handles](Source::handles_url).
    async fn fetch_comments(&self, target: &str) -> Result<Vec<RawComment>>;

    /// Whether this source can fetch comments for an arbitrary video url.
    fn handles_url(&self, _url: &str) -> bool {
        false
    }
}
