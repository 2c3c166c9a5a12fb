//! Danmu sources and the fan-out coordinator.
//!
//! - [`Source`]: uniform per-platform contract (search + comment fetch)
//! - [`SourceTable`]: one source per [`SourceKind`](crate::SourceKind) with a
//!   configured priority order
//! - [`RetryingSource`]: exponential-backoff decorator for transient errors
//! - [`FanOut`]: concurrent search across the table with a deterministic merge
//! - [`DandanSource`]: reference client for the dandanplay open API
//!   (feature `dandan`)

#[cfg(feature = "dandan")]
pub mod dandan;
pub mod fanout;
pub mod registry;
pub mod retry;
pub mod traits;

#[cfg(feature = "dandan")]
pub use dandan::DandanSource;
pub use fanout::{DEFAULT_SOURCE_TIMEOUT, FanOut, SearchCache};
pub use registry::SourceTable;
pub use retry::{RetryConfig, RetryingSource};
pub use traits::Source;
