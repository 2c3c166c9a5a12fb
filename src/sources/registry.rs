//! Source table with a configured priority order.
//!
//! At most one [`Source`] is registered per [`SourceKind`]. The order in
//! which sources are queried and merged comes from a comma-separated priority
//! list (`"dandan,bilibili,tencent"`); kinds not mentioned there are not
//! queried. Without a configured order, registration order is used.
//!
//! When a [`RetryConfig`] is set, sources registered afterwards are wrapped
//! in [`RetryingSource`].

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use super::retry::{RetryConfig, RetryingSource};
use super::traits::Source;
use crate::Result;
use crate::types::SourceKind;

/// Registered sources plus their query order.
#[derive(Default)]
pub struct SourceTable {
    sources: HashMap<SourceKind, Arc<dyn Source>>,
    registered: Vec<SourceKind>,
    order: Option<Vec<SourceKind>>,
    retry_config: Option<RetryConfig>,
}

impl SourceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap sources registered after this call in [`RetryingSource`].
    pub fn set_retry_config(&mut self, config: RetryConfig) {
        self.retry_config = Some(config);
    }

    /// Register `source` under its [`kind`](Source::kind), replacing any
    /// previous source of the same kind.
    pub fn add(&mut self, source: Arc<dyn Source>) {
        let kind = source.kind();
        let source = self.maybe_wrap(source);
        if self.sources.insert(kind, source).is_none() {
            self.registered.push(kind);
        }
    }

    /// Set the query order from a comma-separated list of platform names.
    ///
    /// Unknown names are a configuration error. Known names without a
    /// registered source are skipped with a warning. An empty list restores
    /// registration order.
    pub fn set_order(&mut self, list: &str) -> Result<()> {
        let kinds = SourceKind::parse_list(list)?;
        self.order = if kinds.is_empty() { None } else { Some(kinds) };
        for kind in self.order.iter().flatten() {
            if !self.sources.contains_key(kind) {
                warn!(source = %kind, "source listed in order but not registered, skipping");
            }
        }
        Ok(())
    }

    /// Registered sources in query order.
    pub fn ordered(&self) -> Vec<Arc<dyn Source>> {
        self.ordered_kinds()
            .into_iter()
            .filter_map(|kind| self.sources.get(&kind).cloned())
            .collect()
    }

    /// Kinds that will be queried, in order.
    pub fn ordered_kinds(&self) -> Vec<SourceKind> {
        match &self.order {
            Some(order) => order
                .iter()
                .copied()
                .filter(|k| self.sources.contains_key(k))
                .collect(),
            None => self.registered.clone(),
        }
    }

    pub fn get(&self, kind: SourceKind) -> Option<Arc<dyn Source>> {
        self.sources.get(&kind).cloned()
    }

    /// First ordered source that accepts `url`.
    pub fn for_url(&self, url: &str) -> Option<Arc<dyn Source>> {
        self.ordered().into_iter().find(|s| s.handles_url(url))
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    fn maybe_wrap(&self, source: Arc<dyn Source>) -> Arc<dyn Source> {
        match &self.retry_config {
            Some(config) => Arc::new(RetryingSource::new(source, config.clone())),
            None => source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HuginnError;
    use crate::types::{RawComment, RawItem};
    use async_trait::async_trait;

    struct Named {
        kind: SourceKind,
        prefix: &'static str,
    }

    #[async_trait]
    impl Source for Named {
        fn kind(&self) -> SourceKind {
            self.kind
        }

        async fn search(&self, _title: &str) -> Result<Vec<RawItem>> {
            Ok(Vec::new())
        }

        async fn fetch_comments(&self, _target: &str) -> Result<Vec<RawComment>> {
            Ok(Vec::new())
        }

        fn handles_url(&self, url: &str) -> bool {
            url.starts_with(self.prefix)
        }
    }

    fn table() -> SourceTable {
        let mut table = SourceTable::new();
        table.add(Arc::new(Named {
            kind: SourceKind::Tencent,
            prefix: "https://v.qq.com",
        }));
        table.add(Arc::new(Named {
            kind: SourceKind::Bilibili,
            prefix: "https://www.bilibili.com",
        }));
        table
    }

    #[test]
    fn registration_order_is_the_default() {
        let table = table();
        assert_eq!(
            table.ordered_kinds(),
            vec![SourceKind::Tencent, SourceKind::Bilibili]
        );
    }

    #[test]
    fn configured_order_wins_and_skips_unregistered() {
        let mut table = table();
        table.set_order("bilibili, youku, tencent").unwrap();
        assert_eq!(
            table.ordered_kinds(),
            vec![SourceKind::Bilibili, SourceKind::Tencent]
        );

        table.set_order("bilibili").unwrap();
        assert_eq!(table.ordered_kinds(), vec![SourceKind::Bilibili]);

        table.set_order("").unwrap();
        assert_eq!(table.ordered_kinds().len(), 2);
    }

    #[test]
    fn unknown_name_is_a_configuration_error() {
        let mut table = table();
        let err = table.set_order("dandan,netflix").unwrap_err();
        assert!(matches!(err, HuginnError::Configuration(_)));
    }

    #[test]
    fn url_routing_uses_first_accepting_source() {
        let table = table();
        let source = table.for_url("https://www.bilibili.com/video/BV1").unwrap();
        assert_eq!(source.kind(), SourceKind::Bilibili);
        assert!(table.for_url("https://example.com").is_none());
    }

    #[test]
    fn re_registering_a_kind_replaces_it() {
        let mut table = table();
        table.add(Arc::new(Named {
            kind: SourceKind::Tencent,
            prefix: "https://m.v.qq.com",
        }));
        assert_eq!(table.len(), 2);
        assert!(table.for_url("https://m.v.qq.com/x").is_some());
        assert!(table.for_url("https://v.qq.com/x").is_none());
    }
}
