//! Huginn error types

use std::time::Duration;

/// Huginn error types
#[derive(Debug, thiserror::Error)]
pub enum HuginnError {
    // Transport errors from HTTP collaborators
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    // Source errors
    /// A single source failed or timed out.
    ///
    /// Recovered during fan-out (the source is excluded from the merge).
    /// Surfaced only when one specific source is the sole way to obtain the
    /// requested data, e.g. a comment fetch for one of its episodes.
    #[error("source '{source_name}' unavailable: {reason}")]
    SourceUnavailable { source_name: String, reason: String },

    /// The caller referenced an id that is unknown or was evicted.
    ///
    /// Callers should re-resolve through a fresh search.
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    // State store errors
    /// External key-value store failure. Best-effort: in-memory state stays
    /// authoritative and this never fails a user-facing request.
    #[error("external store unavailable: {0}")]
    ExternalStoreUnavailable(String),

    // Data errors
    /// One raw comment or item could not be mapped. Dropped, never fatal.
    #[error("malformed upstream payload: {0}")]
    MalformedPayload(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl HuginnError {
    /// Whether a retry has a reasonable chance of succeeding.
    ///
    /// Transient: network failures, rate limits, timeouts and 5xx responses.
    /// Everything else (not found, malformed data, 4xx) is permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            HuginnError::Http(_)
            | HuginnError::RateLimited { .. }
            | HuginnError::Timeout { .. }
            | HuginnError::ExternalStoreUnavailable(_) => true,
            HuginnError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Server-supplied retry hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            HuginnError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Shorthand for [`HuginnError::NotFound`].
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        HuginnError::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

/// Result type alias for Huginn operations
pub type Result<T> = std::result::Result<T, HuginnError>;
