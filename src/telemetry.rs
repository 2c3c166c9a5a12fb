//! Telemetry: metric name constants and the in-memory log buffer.
//!
//! Consumers install their own `metrics` recorder (e.g. prometheus, statsd);
//! without a recorder installed, all metric calls are no-ops. Logging goes
//! through `tracing`; the library never installs a subscriber itself.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `huginn_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `source`: platform name (e.g. "dandan", "bilibili")
//! - `status`: outcome: "ok", "empty", "error" or "timeout"
//! - `cache`: cache instance: "search", "comment" or "selection"
//! - `collection`: persisted collection or bounded registry list
//!
//! # Log buffer
//!
//! [`LogBuffer`] keeps the most recent log events in memory so an admin
//! surface can show them without a log sink. Install its layer next to
//! whatever formatter the binary uses:
//!
//! ```rust
//! use huginn::telemetry::LogBuffer;
//! use tracing_subscriber::prelude::*;
//!
//! let buffer = LogBuffer::new(200);
//! let subscriber = tracing_subscriber::registry().with(buffer.layer());
//! tracing::subscriber::with_default(subscriber, || {
//!     tracing::info!(source = "dandan", "search finished");
//! });
//! assert_eq!(buffer.len(), 1);
//! ```

use std::collections::VecDeque;
use std::fmt::{self, Write as _};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use serde::Serialize;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

/// Source queries issued during fan-out or comment fetches.
///
/// Labels: `source`, `operation` ("search" | "fetch_comments"),
/// `status` ("ok" | "empty" | "error" | "timeout").
pub const SOURCE_REQUESTS_TOTAL: &str = "huginn_source_requests_total";

/// Source query duration in seconds.
///
/// Labels: `source`, `operation`.
pub const SOURCE_DURATION_SECONDS: &str = "huginn_source_duration_seconds";

/// Transient failures seen by the retry decorator.
///
/// Labels: `source`, `operation`.
pub const RETRIES_TOTAL: &str = "huginn_retries_total";

/// Total cache hits.
///
/// Labels: `cache`.
pub const CACHE_HITS_TOTAL: &str = "huginn_cache_hits_total";

/// Total cache misses (absent or expired).
///
/// Labels: `cache`.
pub const CACHE_MISSES_TOTAL: &str = "huginn_cache_misses_total";

/// Entries evicted because a bounded collection reached capacity.
///
/// Labels: `collection`.
pub const EVICTIONS_TOTAL: &str = "huginn_evictions_total";

/// External store writes performed by the sync layer.
///
/// Labels: `collection`, `status` ("ok" | "error").
pub const STORE_WRITES_TOTAL: &str = "huginn_store_writes_total";

/// Raw comments dropped by the normalization pipeline.
///
/// Labels: `reason` ("malformed" | "blocked" | "duplicate" | "sampled").
pub const COMMENTS_DROPPED_TOTAL: &str = "huginn_comments_dropped_total";

/// Default number of events a [`LogBuffer`] retains.
pub const DEFAULT_LOG_CAPACITY: usize = 500;

/// One captured log event.
#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    pub timestamp: SystemTime,
    #[serde(serialize_with = "serialize_level")]
    pub level: Level,
    pub target: String,
    pub message: String,
    /// Structured fields rendered as `key=value`, space separated.
    pub fields: String,
}

fn serialize_level<S: serde::Serializer>(level: &Level, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(level.as_str())
}

/// Bounded ring buffer of recent log events.
///
/// Cloning is cheap; all clones share the same buffer. Oldest events are
/// dropped once `capacity` is reached.
#[derive(Clone)]
pub struct LogBuffer {
    inner: Arc<Mutex<VecDeque<LogRecord>>>,
    capacity: usize,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::with_capacity(capacity.min(1024)))),
            capacity: capacity.max(1),
        }
    }

    /// A `tracing-subscriber` layer writing into this buffer.
    pub fn layer(&self) -> LogBufferLayer {
        LogBufferLayer {
            buffer: self.clone(),
        }
    }

    /// Append a record, dropping the oldest one when full.
    pub fn push(&self, record: LogRecord) {
        // A poisoned buffer only loses log lines; never propagate.
        if let Ok(mut records) = self.inner.lock() {
            if records.len() >= self.capacity {
                records.pop_front();
            }
            records.push_back(record);
        }
    }

    /// Snapshot of buffered events, oldest first.
    pub fn recent(&self) -> Vec<LogRecord> {
        self.inner
            .lock()
            .map(|records| records.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut records) = self.inner.lock() {
            records.clear();
        }
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

/// Layer produced by [`LogBuffer::layer`].
pub struct LogBufferLayer {
    buffer: LogBuffer,
}

impl<S: Subscriber> Layer<S> for LogBufferLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = FieldCollector::default();
        event.record(&mut visitor);
        let metadata = event.metadata();
        self.buffer.push(LogRecord {
            timestamp: SystemTime::now(),
            level: *metadata.level(),
            target: metadata.target().to_string(),
            message: visitor.message,
            fields: visitor.fields,
        });
    }
}

#[derive(Default)]
struct FieldCollector {
    message: String,
    fields: String,
}

impl FieldCollector {
    fn push_field(&mut self, name: &str, value: fmt::Arguments<'_>) {
        if !self.fields.is_empty() {
            self.fields.push(' ');
        }
        let _ = write!(self.fields, "{name}={value}");
    }
}

impl Visit for FieldCollector {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.push_field(field.name(), format_args!("{value}"));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.push_field(field.name(), format_args!("{value:?}"));
        }
    }
}
