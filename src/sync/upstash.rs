//! Upstash Redis REST client.
//!
//! Commands are POSTed to the database URL as a JSON array
//! (`["SET", "key", "value"]`) with a bearer token. Replies are
//! `{"result": ...}` on success and `{"error": "..."}` on failure.
//! See: <https://upstash.com/docs/redis/features/restapi>

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use super::store::KvStore;
use crate::{HuginnError, Result};

/// Default per-request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// [`KvStore`] backed by an Upstash Redis database.
#[derive(Clone)]
pub struct UpstashStore {
    base_url: String,
    token: String,
    http: Client,
}

#[derive(Deserialize)]
struct Reply {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<String>,
}

impl UpstashStore {
    /// Create a client for the database at `base_url`.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, token, DEFAULT_TIMEOUT)
    }

    /// Create a client with a custom request timeout.
    pub fn with_timeout(
        base_url: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HuginnError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            http,
        })
    }

    async fn command(&self, args: &[&str]) -> Result<Value> {
        let response = self
            .http
            .post(&self.base_url)
            .bearer_auth(&self.token)
            .json(args)
            .send()
            .await
            .map_err(|e| HuginnError::ExternalStoreUnavailable(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 401 {
            return Err(HuginnError::Configuration(
                "upstash rejected the REST token".to_string(),
            ));
        }

        let reply: Reply = response.json().await.map_err(|e| {
            HuginnError::ExternalStoreUnavailable(format!("unreadable reply ({status}): {e}"))
        })?;
        if let Some(error) = reply.error {
            return Err(HuginnError::ExternalStoreUnavailable(error));
        }
        if !status.is_success() {
            return Err(HuginnError::ExternalStoreUnavailable(format!(
                "upstash returned {status}"
            )));
        }
        Ok(reply.result)
    }
}

#[async_trait]
impl KvStore for UpstashStore {
    fn name(&self) -> &str {
        "upstash"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        match self.command(&["GET", key]).await? {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(s)),
            other => Err(HuginnError::ExternalStoreUnavailable(format!(
                "unexpected GET result: {other}"
            ))),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.command(&["SET", key, value]).await.map(|_| ())
    }

    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let secs = ttl.as_secs().max(1).to_string();
        self.command(&["SET", key, value, "EX", &secs])
            .await
            .map(|_| ())
    }

    async fn ping(&self) -> bool {
        matches!(self.command(&["PING"]).await, Ok(Value::String(s)) if s == "PONG")
    }
}
