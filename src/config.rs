//! Configuration loading.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. `--config <path>` (CLI flag)
//! 2. `~/.huginn/config.toml` (user)
//! 3. `/etc/huginn/config.toml` (system)
//!
//! Every section is optional; with no file at all the defaults apply.
//!
//! Secrets are loaded separately with mandatory permission checks:
//! 1. `~/.huginn/secrets.toml` (user, must be 0600)
//! 2. `/etc/huginn/secrets.toml` (system, must be 0600)
//!
//! Missing secrets fall back to environment variables.

use std::fs;
use std::path::{Path, PathBuf};
#[cfg(any(feature = "dandan", feature = "upstash"))]
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::cache::{CacheConfig, HistoryConfig};
use crate::danmu::{Blocklist, ColorPolicy, DanmuOptions};
use crate::engine::HuginnBuilder;
use crate::registry::RegistryConfig;
use crate::sources::RetryConfig;
use crate::sync::SyncConfig;
use crate::{HuginnError, Result};

/// Engine configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub registry: RegistrySection,
    #[serde(default)]
    pub danmu: DanmuSection,
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub history: HistorySection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Source selection and timeouts.
#[derive(Debug, Clone, Deserialize)]
pub struct SourcesConfig {
    /// Comma-separated priority list (default: "dandan").
    #[serde(default = "default_order")]
    pub order: String,
    /// Per-source search timeout in seconds (default: 10).
    #[serde(default = "default_source_timeout")]
    pub timeout_secs: u64,
    /// Comment fetch timeout in seconds (default: 30).
    #[serde(default = "default_comment_timeout")]
    pub comment_timeout_secs: u64,
    #[serde(default)]
    pub retry: Option<RetrySection>,
    #[serde(default)]
    pub dandan: DandanSection,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            order: default_order(),
            timeout_secs: default_source_timeout(),
            comment_timeout_secs: default_comment_timeout(),
            retry: None,
            dandan: DandanSection::default(),
        }
    }
}

fn default_order() -> String {
    "dandan".to_string()
}

fn default_source_timeout() -> u64 {
    10
}

fn default_comment_timeout() -> u64 {
    30
}

/// Retry settings for every source.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

impl RetrySection {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig::new()
            .max_attempts(self.max_attempts)
            .initial_delay(Duration::from_millis(self.initial_delay_ms))
            .max_delay(Duration::from_millis(self.max_delay_ms))
    }
}

/// dandanplay-compatible source.
#[derive(Debug, Clone, Deserialize)]
pub struct DandanSection {
    /// API base URL (default: https://api.dandanplay.net).
    #[serde(default = "default_dandan_url")]
    pub base_url: String,
    /// Route arbitrary video urls through the external comment endpoint.
    #[serde(default)]
    pub external_urls: bool,
}

impl Default for DandanSection {
    fn default() -> Self {
        Self {
            base_url: default_dandan_url(),
            external_urls: false,
        }
    }
}

fn default_dandan_url() -> String {
    "https://api.dandanplay.net".to_string()
}

/// Cache sizes and lifetimes.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSection {
    #[serde(default = "default_cache_entries")]
    pub search_max_entries: usize,
    /// Search cache TTL in seconds; 0 disables expiry (default: 60).
    #[serde(default = "default_cache_ttl")]
    pub search_ttl_secs: u64,
    #[serde(default = "default_cache_entries")]
    pub comment_max_entries: usize,
    /// Comment cache TTL in seconds; 0 disables expiry (default: 60).
    #[serde(default = "default_cache_ttl")]
    pub comment_ttl_secs: u64,
    #[serde(default = "default_cache_entries")]
    pub selection_capacity: usize,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            search_max_entries: default_cache_entries(),
            search_ttl_secs: default_cache_ttl(),
            comment_max_entries: default_cache_entries(),
            comment_ttl_secs: default_cache_ttl(),
            selection_capacity: default_cache_entries(),
        }
    }
}

fn default_cache_entries() -> usize {
    100
}

fn default_cache_ttl() -> u64 {
    60
}

fn cache_config(max_entries: usize, ttl_secs: u64) -> CacheConfig {
    let config = CacheConfig::new().max_entries(max_entries);
    if ttl_secs == 0 {
        config.no_ttl()
    } else {
        config.ttl(Duration::from_secs(ttl_secs))
    }
}

/// Identity registry bounds.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistrySection {
    #[serde(default = "default_max_animes")]
    pub max_animes: usize,
    #[serde(default = "default_max_episodes")]
    pub max_episodes: usize,
}

impl Default for RegistrySection {
    fn default() -> Self {
        Self {
            max_animes: default_max_animes(),
            max_episodes: default_max_episodes(),
        }
    }
}

fn default_max_animes() -> usize {
    100
}

fn default_max_episodes() -> usize {
    2000
}

/// Comment pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct DanmuSection {
    /// Regex patterns; matching comments are dropped.
    #[serde(default)]
    pub blocklist: Vec<String>,
    #[serde(default = "default_group_minute")]
    pub group_minute: u32,
    #[serde(default = "default_segment_width")]
    pub segment_width_secs: f64,
    #[serde(default)]
    pub force_scroll: bool,
    #[serde(default)]
    pub color: ColorPolicy,
    #[serde(default)]
    pub max_comments: usize,
}

impl Default for DanmuSection {
    fn default() -> Self {
        Self {
            blocklist: Vec::new(),
            group_minute: default_group_minute(),
            segment_width_secs: default_segment_width(),
            force_scroll: false,
            color: ColorPolicy::Keep,
            max_comments: 0,
        }
    }
}

fn default_group_minute() -> u32 {
    1
}

fn default_segment_width() -> f64 {
    crate::danmu::DEFAULT_SEGMENT_WIDTH
}

impl DanmuSection {
    /// Compile into pipeline options; an invalid blocklist pattern fails.
    pub fn to_options(&self) -> Result<DanmuOptions> {
        Ok(DanmuOptions::new()
            .blocklist(Blocklist::new(&self.blocklist)?)
            .group_minute(self.group_minute)
            .segment_width(self.segment_width_secs)
            .force_scroll(self.force_scroll)
            .color(self.color)
            .max_comments(self.max_comments))
    }
}

/// External state store.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreSection {
    /// Persist to Upstash when credentials are available (default: true).
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    #[serde(default = "default_store_timeout")]
    pub timeout_secs: u64,
    /// Expiry for written values in seconds; 0 = none.
    #[serde(default)]
    pub expiry_secs: u64,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            enabled: true,
            key_prefix: default_key_prefix(),
            timeout_secs: default_store_timeout(),
            expiry_secs: 0,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_key_prefix() -> String {
    "huginn:".to_string()
}

fn default_store_timeout() -> u64 {
    5
}

impl StoreSection {
    pub fn to_sync_config(&self) -> SyncConfig {
        let config = SyncConfig::new()
            .key_prefix(self.key_prefix.clone())
            .timeout(Duration::from_secs(self.timeout_secs));
        if self.expiry_secs > 0 {
            config.expiry(Duration::from_secs(self.expiry_secs))
        } else {
            config
        }
    }
}

/// Request bookkeeping.
#[derive(Debug, Clone, Deserialize)]
pub struct HistorySection {
    #[serde(default = "default_cache_ttl")]
    pub retention_secs: u64,
    /// Soft per-client limit within the retention window; 0 disables.
    #[serde(default)]
    pub max_requests: usize,
}

impl Default for HistorySection {
    fn default() -> Self {
        Self {
            retention_secs: default_cache_ttl(),
            max_requests: 0,
        }
    }
}

/// Log output.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSection {
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is
    /// unset (default: "info").
    #[serde(default = "default_log_filter")]
    pub filter: String,
    /// Events kept in the in-memory log buffer (default: 500).
    #[serde(default = "default_log_capacity")]
    pub buffer_capacity: usize,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            buffer_capacity: default_log_capacity(),
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}

fn default_log_capacity() -> usize {
    crate::telemetry::DEFAULT_LOG_CAPACITY
}

/// Secrets (store and source credentials).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Secrets {
    #[serde(default)]
    pub upstash: Option<UpstashSecret>,
    #[serde(default)]
    pub dandan: Option<DandanSecret>,
}

/// Upstash Redis REST credentials.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UpstashSecret {
    pub url: String,
    pub token: String,
}

/// dandanplay app credentials.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DandanSecret {
    pub app_id: String,
    pub app_secret: String,
}

const UPSTASH_URL_ENV: &str = "UPSTASH_REDIS_REST_URL";
const UPSTASH_TOKEN_ENV: &str = "UPSTASH_REDIS_REST_TOKEN";
const DANDAN_APP_ID_ENV: &str = "DANDAN_APP_ID";
const DANDAN_APP_SECRET_ENV: &str = "DANDAN_APP_SECRET";

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// Resolution order:
    /// 1. Explicit path (if provided; must exist)
    /// 2. `~/.huginn/config.toml`
    /// 3. `/etc/huginn/config.toml`
    /// 4. Built-in defaults
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        match Self::resolve_config_path(explicit_path)? {
            Some(path) => Self::load_from_file(&path),
            None => {
                debug!("no config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            HuginnError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            HuginnError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
        })
    }

    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(HuginnError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".huginn").join("config.toml");
            if user_config.exists() {
                return Ok(Some(user_config));
            }
        }

        let system_config = PathBuf::from("/etc/huginn/config.toml");
        if system_config.exists() {
            return Ok(Some(system_config));
        }

        Ok(None)
    }

    /// Translate into an engine builder: sources, store, caches, pipeline.
    ///
    /// The reference dandan source and the Upstash store are only wired in
    /// when their features are enabled; the store additionally needs
    /// credentials.
    #[cfg_attr(
        not(any(feature = "dandan", feature = "upstash")),
        allow(unused_variables)
    )]
    pub fn builder(&self, secrets: &Secrets) -> Result<HuginnBuilder> {
        let mut builder = HuginnBuilder::new()
            .source_order(self.sources.order.clone())
            .source_timeout(Duration::from_secs(self.sources.timeout_secs))
            .comment_timeout(Duration::from_secs(self.sources.comment_timeout_secs))
            .registry(
                RegistryConfig::new()
                    .max_animes(self.registry.max_animes)
                    .max_episodes(self.registry.max_episodes),
            )
            .search_cache(cache_config(
                self.cache.search_max_entries,
                self.cache.search_ttl_secs,
            ))
            .comment_cache(cache_config(
                self.cache.comment_max_entries,
                self.cache.comment_ttl_secs,
            ))
            .selection_capacity(self.cache.selection_capacity)
            .history(
                HistoryConfig::new()
                    .retention(Duration::from_secs(self.history.retention_secs))
                    .max_requests(self.history.max_requests),
            )
            .danmu(self.danmu.to_options()?)
            .sync(self.store.to_sync_config());

        if let Some(retry) = &self.sources.retry {
            builder = builder.retry(retry.to_retry_config());
        }

        #[cfg(feature = "dandan")]
        {
            let mut source = crate::sources::DandanSource::with_base_url(&self.sources.dandan.base_url)?
                .with_external_urls(self.sources.dandan.external_urls);
            if let Some(creds) = secrets.dandan_credentials() {
                source = source.with_credentials(creds.app_id, creds.app_secret);
            }
            builder = builder.source(Arc::new(source));
        }

        #[cfg(feature = "upstash")]
        if self.store.enabled {
            if let Some(creds) = secrets.upstash_credentials() {
                let store = crate::sync::UpstashStore::with_timeout(
                    creds.url,
                    creds.token,
                    Duration::from_secs(self.store.timeout_secs),
                )?;
                builder = builder.store(Arc::new(store));
            }
        }

        Ok(builder)
    }
}

impl Secrets {
    /// Load secrets from the standard locations with permission checks.
    ///
    /// Resolution order:
    /// 1. `~/.huginn/secrets.toml` (if exists, must be 0600)
    /// 2. `/etc/huginn/secrets.toml` (if exists, must be 0600)
    ///
    /// Returns empty secrets if no file exists (env vars may still apply).
    pub fn load() -> Result<Self> {
        if let Some(home) = dirs::home_dir() {
            let user_secrets = home.join(".huginn").join("secrets.toml");
            if user_secrets.exists() {
                return Self::load_from_file(&user_secrets);
            }
        }

        let system_secrets = PathBuf::from("/etc/huginn/secrets.toml");
        if system_secrets.exists() {
            return Self::load_from_file(&system_secrets);
        }

        Ok(Secrets::default())
    }

    /// Load one secrets file after checking its permissions.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        Self::check_permissions(path)?;
        let content = fs::read_to_string(path).map_err(|e| {
            HuginnError::Configuration(format!("Failed to read secrets file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            HuginnError::Configuration(format!("Failed to parse secrets file {path:?}: {e}"))
        })
    }

    /// Check that the secrets file has secure permissions (0600 or 0400).
    #[cfg(unix)]
    fn check_permissions(path: &Path) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let metadata = fs::metadata(path).map_err(|e| {
            HuginnError::Configuration(format!("Failed to stat secrets file {path:?}: {e}"))
        })?;

        let mode = metadata.permissions().mode();
        if mode & 0o077 != 0 {
            return Err(HuginnError::Configuration(format!(
                "Secrets file {path:?} has insecure permissions {:o}. Must be 0600 or 0400.",
                mode & 0o777
            )));
        }

        Ok(())
    }

    #[cfg(not(unix))]
    fn check_permissions(_path: &Path) -> Result<()> {
        Ok(())
    }

    /// Upstash credentials from the file, else from
    /// `UPSTASH_REDIS_REST_URL` / `UPSTASH_REDIS_REST_TOKEN`.
    pub fn upstash_credentials(&self) -> Option<UpstashSecret> {
        self.upstash.clone().or_else(|| {
            Some(UpstashSecret {
                url: std::env::var(UPSTASH_URL_ENV).ok()?,
                token: std::env::var(UPSTASH_TOKEN_ENV).ok()?,
            })
        })
    }

    /// dandan app credentials from the file, else from
    /// `DANDAN_APP_ID` / `DANDAN_APP_SECRET`.
    pub fn dandan_credentials(&self) -> Option<DandanSecret> {
        self.dandan.clone().or_else(|| {
            Some(DandanSecret {
                app_id: std::env::var(DANDAN_APP_ID_ENV).ok()?,
                app_secret: std::env::var(DANDAN_APP_SECRET_ENV).ok()?,
            })
        })
    }
}
