//! dandanplay-compatible open API source.
//!
//! Search uses `/api/v2/search/episodes`, which returns titles together with
//! their episodes; comments come from `/api/v2/comment/{episodeId}`. Arbitrary
//! video urls can optionally be routed through `/api/v2/extcomment`.
//! See: <https://api.dandanplay.net/swagger/index.html>

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;

use super::traits::Source;
use crate::types::{RawComment, RawItem, SourceKind};
use crate::{HuginnError, Result};

/// Default base URL for the dandanplay open API.
const DEFAULT_BASE_URL: &str = "https://api.dandanplay.net";

/// Client for a dandanplay-compatible API.
#[derive(Clone)]
pub struct DandanSource {
    http: Client,
    base_url: String,
    credentials: Option<(String, String)>,
    external_urls: bool,
}

impl DandanSource {
    pub fn new() -> Result<Self> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Create a client with a custom base URL (self-hosted mirrors, wiremock).
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| HuginnError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials: None,
            external_urls: false,
        })
    }

    /// Send `X-AppId` / `X-AppSecret` with every request.
    pub fn with_credentials(mut self, app_id: impl Into<String>, app_secret: impl Into<String>) -> Self {
        self.credentials = Some((app_id.into(), app_secret.into()));
        self
    }

    /// Accept arbitrary `http(s)` video urls through the external comment
    /// endpoint.
    pub fn with_external_urls(mut self, enabled: bool) -> Self {
        self.external_urls = enabled;
        self
    }

    fn get(&self, path: &str) -> RequestBuilder {
        let request = self.http.get(format!("{}{}", self.base_url, path));
        match &self.credentials {
            Some((id, secret)) => request.header("X-AppId", id).header("X-AppSecret", secret),
            None => request,
        }
    }

    async fn send<T: for<'de> Deserialize<'de>>(&self, request: RequestBuilder) -> Result<T> {
        let response = request
            .send()
            .await
            .map_err(|e| HuginnError::Http(e.to_string()))?;
        Self::handle_response_errors(&response)?;
        response
            .json()
            .await
            .map_err(|e| HuginnError::MalformedPayload(format!("dandan response: {e}")))
    }

    fn handle_response_errors(response: &reqwest::Response) -> Result<()> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        match status.as_u16() {
            401 | 403 => Err(HuginnError::Configuration(
                "dandan API rejected the app credentials".to_string(),
            )),
            429 => {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .map(Duration::from_secs);
                Err(HuginnError::RateLimited { retry_after })
            }
            code => Err(HuginnError::Api {
                status: code,
                message: format!("dandan API error: {status}"),
            }),
        }
    }

    fn comments_from(response: CommentResponse) -> Vec<RawComment> {
        response
            .comments
            .into_iter()
            .map(|c| RawComment::Packed {
                cid: c.cid,
                p: c.p,
                m: c.m,
            })
            .collect()
    }
}

#[async_trait]
impl Source for DandanSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Dandan
    }

    async fn search(&self, title: &str) -> Result<Vec<RawItem>> {
        let request = self.get("/api/v2/search/episodes").query(&[("anime", title)]);
        let response: SearchResponse = self.send(request).await?;
        if !response.success {
            return Err(HuginnError::Api {
                status: 200,
                message: response
                    .error_message
                    .unwrap_or_else(|| format!("error code {}", response.error_code)),
            });
        }

        Ok(response
            .animes
            .into_iter()
            .map(|anime| {
                let url = format!("{}/api/v2/bangumi/{}", self.base_url, anime.anime_id);
                anime.episodes.into_iter().fold(
                    RawItem::new(anime.anime_id.to_string(), anime.anime_title, url),
                    |item, ep| item.episode(ep.episode_title, ep.episode_id.to_string()),
                )
            })
            .collect())
    }

    async fn fetch_comments(&self, target: &str) -> Result<Vec<RawComment>> {
        let request = if target.starts_with("http://") || target.starts_with("https://") {
            self.get("/api/v2/extcomment").query(&[("url", target)])
        } else {
            let id: i64 = target.parse().map_err(|_| {
                HuginnError::InvalidInput(format!("'{target}' is not a dandan episode id"))
            })?;
            self.get(&format!("/api/v2/comment/{id}"))
                .query(&[("withRelated", "true")])
        };
        let response: CommentResponse = self.send(request).await?;
        Ok(Self::comments_from(response))
    }

    fn handles_url(&self, url: &str) -> bool {
        self.external_urls && (url.starts_with("http://") || url.starts_with("https://"))
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    animes: Vec<SearchAnime>,
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    error_code: i64,
    #[serde(default)]
    error_message: Option<String>,
}

fn default_success() -> bool {
    true
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchAnime {
    anime_id: i64,
    anime_title: String,
    #[serde(default)]
    episodes: Vec<SearchEpisode>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchEpisode {
    episode_id: i64,
    episode_title: String,
}

#[derive(Deserialize)]
struct CommentResponse {
    #[serde(default)]
    comments: Vec<WireComment>,
}

#[derive(Deserialize)]
struct WireComment {
    #[serde(default)]
    cid: Option<i64>,
    p: String,
    m: String,
}
