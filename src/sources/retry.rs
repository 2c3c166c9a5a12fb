//! Retry configuration, delay calculation, and the source decorator.
//!
//! [`RetryingSource`] wraps any [`Source`] and retries transient errors
//! with exponential backoff. All retry logic lives in `with_retry()`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use super::traits::Source;
use crate::telemetry;
use crate::types::{RawComment, RawItem, SourceKind};
use crate::{HuginnError, Result};

/// Configuration for retry behaviour on transient errors.
///
/// ```rust
/// # use huginn::RetryConfig;
/// # use std::time::Duration;
/// let config = RetryConfig::new()
///     .max_attempts(5)
///     .initial_delay(Duration::from_millis(200));
/// assert_eq!(config.delay_for_attempt(1), Duration::from_millis(400));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the initial request).
    /// 1 = no retry. Default: 3.
    pub max_attempts: u32,
    /// Base delay before the first retry. Default: 500ms.
    pub initial_delay: Duration,
    /// Maximum delay between retries (caps exponential growth). Default: 30s.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// A config that disables retries (single attempt).
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Delay before retry number `attempt + 1` (0-indexed):
    /// `initial_delay * 2^attempt`, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self
            .initial_delay
            .saturating_mul(2u32.saturating_pow(attempt));
        delay.min(self.max_delay)
    }

    /// Like [`delay_for_attempt`](Self::delay_for_attempt), but a
    /// `retry_after` hint from a `RateLimited` error takes precedence.
    pub fn effective_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        retry_after.unwrap_or_else(|| self.delay_for_attempt(attempt))
    }
}

// ============================================================================
// Shared retry helper
// ============================================================================

/// Run `f` until it succeeds, fails permanently, or attempts run out.
pub(crate) async fn with_retry<F, Fut, T>(
    config: &RetryConfig,
    source_name: &str,
    operation: &'static str,
    f: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_err = None;
    for attempt in 0..config.max_attempts.max(1) {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_transient() => {
                metrics::counter!(telemetry::RETRIES_TOTAL,
                    "source" => source_name.to_owned(),
                    "operation" => operation,
                )
                .increment(1);
                if attempt + 1 < config.max_attempts {
                    let delay = config.effective_delay(attempt, e.retry_after());
                    warn!(
                        source = source_name,
                        operation,
                        attempt = attempt + 1,
                        max_attempts = config.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying after transient error"
                    );
                    tokio::time::sleep(delay).await;
                }
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err.unwrap_or_else(|| HuginnError::SourceUnavailable {
        source_name: source_name.to_string(),
        reason: "no attempts made".to_string(),
    }))
}

// ============================================================================
// RetryingSource
// ============================================================================

/// Decorator that wraps a [`Source`] with retry logic.
///
/// Transient errors (see [`HuginnError::is_transient()`]) are retried with
/// exponential backoff; permanent errors are returned immediately.
pub struct RetryingSource {
    inner: Arc<dyn Source>,
    config: RetryConfig,
}

impl RetryingSource {
    pub fn new(inner: Arc<dyn Source>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl Source for RetryingSource {
    fn kind(&self) -> SourceKind {
        self.inner.kind()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn search(&self, title: &str) -> Result<Vec<RawItem>> {
        with_retry(&self.config, self.inner.name(), "search", || {
            self.inner.search(title)
        })
        .await
    }

    async fn fetch_comments(&self, target: &str) -> Result<Vec<RawComment>> {
        with_retry(&self.config, self.inner.name(), "fetch_comments", || {
            self.inner.fetch_comments(target)
        })
        .await
    }

    fn handles_url(&self, url: &str) -> bool {
        self.inner.handles_url(url)
    }
}
