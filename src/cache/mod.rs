//! Caching subsystem.
//!
//! - [`BoundedCache`]: FIFO + TTL map instantiated three times by the
//!   engine: search results (`keyword -> anime ids`), comment payloads
//!   (`video key -> comments`) and selection memory (`keyword -> anime id`,
//!   no TTL). Each instance has its own [`CacheConfig`].
//!
//! - [`RequestHistory`]: per-client request timestamps for soft rate
//!   accounting. Never blocks a request.

pub mod bounded;
pub mod history;

pub use bounded::{BoundedCache, CacheConfig};
pub use history::{HistoryConfig, RequestHistory, RequestStats};
