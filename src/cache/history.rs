//! Per-client request bookkeeping.
//!
//! Tracks recent request timestamps per client IP. Used for logging and soft
//! rate accounting only: [`RequestHistory::record`] never rejects anything,
//! it reports whether a client is over the configured limit and leaves the
//! decision to the caller.
//!
//! Moka-backed: idle clients age out after the retention window, and the
//! number of tracked clients is bounded.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use moka::sync::Cache;
use serde::Serialize;

/// Configuration for [`RequestHistory`].
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryConfig {
    /// Timestamps older than this are discarded. Default: 60 seconds.
    pub retention: Duration,
    /// Soft per-client limit within `retention`. 0 disables. Default: 0.
    pub max_requests: usize,
    /// Maximum number of tracked clients. Default: 10,000.
    pub max_clients: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            retention: Duration::from_secs(60),
            max_requests: 0,
            max_clients: 10_000,
        }
    }
}

impl HistoryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn max_requests(mut self, n: usize) -> Self {
        self.max_requests = n;
        self
    }

    pub fn max_clients(mut self, n: u64) -> Self {
        self.max_clients = n;
        self
    }
}

/// Outcome of recording one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RequestStats {
    /// Requests from this client within the retention window, this one included.
    pub recent: usize,
    /// Whether `recent` exceeds the soft limit.
    pub over_limit: bool,
}

type Timestamps = Arc<Mutex<VecDeque<Instant>>>;

/// Map of client IP to recent request timestamps.
pub struct RequestHistory {
    clients: Cache<String, Timestamps>,
    config: HistoryConfig,
}

impl RequestHistory {
    pub fn new(config: HistoryConfig) -> Self {
        let clients = Cache::builder()
            .max_capacity(config.max_clients)
            .time_to_idle(config.retention)
            .build();
        Self { clients, config }
    }

    /// Record a request from `ip` and purge its expired timestamps.
    pub fn record(&self, ip: &str) -> RequestStats {
        let now = Instant::now();
        let stamps = self
            .clients
            .get_with(ip.to_string(), || Arc::new(Mutex::new(VecDeque::new())));
        let mut stamps = stamps.lock().unwrap_or_else(PoisonError::into_inner);
        purge(&mut stamps, now, self.config.retention);
        stamps.push_back(now);

        let recent = stamps.len();
        RequestStats {
            recent,
            over_limit: self.config.max_requests > 0 && recent > self.config.max_requests,
        }
    }

    /// Requests from `ip` still inside the retention window.
    pub fn recent(&self, ip: &str) -> usize {
        let Some(stamps) = self.clients.get(ip) else {
            return 0;
        };
        let mut stamps = stamps.lock().unwrap_or_else(PoisonError::into_inner);
        purge(&mut stamps, Instant::now(), self.config.retention);
        stamps.len()
    }

    /// Forget every client.
    pub fn clear(&self) {
        self.clients.invalidate_all();
    }
}

fn purge(stamps: &mut VecDeque<Instant>, now: Instant, retention: Duration) {
    while stamps
        .front()
        .is_some_and(|t| now.saturating_duration_since(*t) >= retention)
    {
        stamps.pop_front();
    }
}
