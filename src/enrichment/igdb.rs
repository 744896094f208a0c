//! IGDB-backed metadata provider.
//!
//! Auth is Twitch client-credentials; the token lives in an owned expiring
//! cache behind a mutex that is held across refresh, so concurrent callers
//! trigger at most one token request in flight.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::enrichment::provider::{Candidate, MetadataProvider, ProviderDetail, ProviderError};
use crate::util::env::{env_opt, env_req};

const DEFAULT_TOKEN_URL: &str = "https://id.twitch.tv/oauth2/token";
const DEFAULT_API_BASE: &str = "https://api.igdb.com/v4";

#[derive(Debug, Clone)]
pub struct IgdbConfig {
    pub client_id: String,
    pub client_secret: String,
    pub token_url: String,
    pub api_base: String,
}

impl IgdbConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            client_id: env_req("TWITCH_CLIENT_ID")?,
            client_secret: env_req("TWITCH_CLIENT_SECRET")?,
            token_url: env_opt("TWITCH_TOKEN_URL").unwrap_or_else(|| DEFAULT_TOKEN_URL.into()),
            api_base: env_opt("IGDB_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.into()),
        })
    }
}

#[derive(Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct TwitchTokenResponse {
    access_token: String,
    expires_in: u64,
}

pub struct IgdbProvider {
    cfg: IgdbConfig,
    http: Client,
    token: Arc<Mutex<Option<CachedToken>>>,
}

impl IgdbProvider {
    pub fn new(cfg: IgdbConfig) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .user_agent("ludex-enrichment/0.1")
            .timeout(Duration::from_secs(20))
            .build()
            .map_err(|e| ProviderError::Http(e.to_string()))?;
        Ok(Self {
            cfg,
            http,
            token: Arc::new(Mutex::new(None)),
        })
    }

    pub fn new_from_env() -> anyhow::Result<Self> {
        let cfg = IgdbConfig::from_env()?;
        Self::new(cfg).map_err(|e| anyhow::anyhow!(e.to_string()))
    }

    /// Returns a valid token, refreshing under the lock so only one refresh
    /// is ever in flight.
    async fn ensure_token(&self) -> Result<String, ProviderError> {
        let mut guard = self.token.lock().await;
        if let Some(token) = guard.as_ref() {
            if token.expires_at > Instant::now() + Duration::from_secs(30) {
                return Ok(token.access_token.clone());
            }
        }
        let token = self.request_new_token().await?;
        let access = token.access_token.clone();
        *guard = Some(token);
        Ok(access)
    }

    async fn request_new_token(&self) -> Result<CachedToken, ProviderError> {
        let response = self
            .http
            .post(&self.cfg.token_url)
            .query(&[
                ("client_id", self.cfg.client_id.as_str()),
                ("client_secret", self.cfg.client_secret.as_str()),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await
            .map_err(|e| ProviderError::Auth(format!("token request: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Auth(format!(
                "token request failed (status={status}): {text}"
            )));
        }
        let token: TwitchTokenResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Auth(format!("token decode: {e}")))?;
        let ttl = token.expires_in.saturating_sub(30).max(30);
        Ok(CachedToken {
            access_token: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(ttl),
        })
    }

    async fn execute<T>(&self, endpoint: &str, body: String) -> Result<Vec<T>, ProviderError>
    where
        T: serde::de::DeserializeOwned,
    {
        let token = self.ensure_token().await?;
        let url = format!("{}/{}", self.cfg.api_base.trim_end_matches('/'), endpoint);
        let response = self
            .http
            .post(&url)
            .header("Client-ID", &self.cfg.client_id)
            .header("Content-Type", "text/plain")
            .header("Authorization", format!("Bearer {token}"))
            .body(body)
            .send()
            .await
            .map_err(|e| ProviderError::Http(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!(endpoint, "igdb rate limited");
            return Err(ProviderError::RateLimited);
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let mut guard = self.token.lock().await;
            *guard = None;
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Auth(format!(
                "igdb rejected credentials (status={status}): {text}"
            )));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http(format!(
                "igdb request failed (status={status}): {text}"
            )));
        }
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::Http(e.to_string()))?;
        serde_json::from_str::<Vec<T>>(&text)
            .map_err(|e| ProviderError::Decode(format!("{e}: {text}")))
    }
}

#[derive(Debug, Deserialize)]
struct IgdbSearchHit {
    id: i64,
    name: String,
    total_rating: Option<f64>,
    cover: Option<IgdbCover>,
    first_release_date: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct IgdbCover {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IgdbNamed {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IgdbVideo {
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IgdbInvolvedCompany {
    company: Option<IgdbNamed>,
    #[serde(default)]
    publisher: bool,
}

#[derive(Debug, Deserialize)]
struct IgdbGameDetail {
    summary: Option<String>,
    #[serde(default)]
    genres: Vec<IgdbNamed>,
    #[serde(default)]
    platforms: Vec<IgdbNamed>,
    #[serde(default)]
    game_modes: Vec<IgdbNamed>,
    total_rating: Option<f64>,
    cover: Option<IgdbCover>,
    first_release_date: Option<i64>,
    #[serde(default)]
    videos: Vec<IgdbVideo>,
    #[serde(default)]
    involved_companies: Vec<IgdbInvolvedCompany>,
    url: Option<String>,
}

fn names(list: &[IgdbNamed]) -> Vec<String> {
    list.iter().filter_map(|n| n.name.clone()).collect()
}

fn cover_url(cover: &Option<IgdbCover>) -> Option<String> {
    cover.as_ref().and_then(|c| c.url.as_ref()).map(|u| {
        if u.starts_with("//") {
            format!("https:{u}")
        } else {
            u.clone()
        }
    })
}

fn epoch_to_date(epoch: Option<i64>) -> Option<String> {
    epoch
        .and_then(|e| chrono::DateTime::from_timestamp(e, 0))
        .map(|dt| dt.date_naive().format("%Y-%m-%d").to_string())
}

#[async_trait]
impl MetadataProvider for IgdbProvider {
    async fn search_by_name(
        &self,
        name: &str,
        limit: usize,
    ) -> Result<Vec<Candidate>, ProviderError> {
        let escaped = name.replace('"', "\\\"");
        let body = format!(
            "search \"{escaped}\"; fields id,name,total_rating,cover.url,first_release_date; limit {limit};"
        );
        let hits: Vec<IgdbSearchHit> = self.execute("games", body).await?;
        debug!(name, hits = hits.len(), "igdb search");
        Ok(hits
            .into_iter()
            .map(|h| Candidate {
                id: h.id,
                name: h.name,
                rating: h.total_rating,
                cover_url: cover_url(&h.cover),
                first_release_epoch: h.first_release_date,
            })
            .collect())
    }

    async fn get_details(&self, id: i64) -> Result<ProviderDetail, ProviderError> {
        let body = format!(
            "fields summary,genres.name,platforms.name,game_modes.name,total_rating,cover.url,\
             first_release_date,videos.video_id,involved_companies.company.name,\
             involved_companies.publisher,url; where id = {id};"
        );
        let mut rows: Vec<IgdbGameDetail> = self.execute("games", body).await?;
        let detail = rows
            .drain(..)
            .next()
            .ok_or_else(|| ProviderError::Http(format!("igdb returned no detail for id {id}")))?;
        Ok(ProviderDetail {
            description: detail.summary.clone(),
            genres: names(&detail.genres),
            platforms: names(&detail.platforms),
            game_modes: names(&detail.game_modes),
            rating: detail.total_rating,
            artwork_url: cover_url(&detail.cover),
            release_date: epoch_to_date(detail.first_release_date),
            videos: detail
                .videos
                .iter()
                .filter_map(|v| v.video_id.as_ref())
                .map(|id| format!("https://www.youtube.com/watch?v={id}"))
                .collect(),
            publishers: detail
                .involved_companies
                .iter()
                .filter(|c| c.publisher)
                .filter_map(|c| c.company.as_ref().and_then(|n| n.name.clone()))
                .collect(),
            canonical_url: detail.url.clone(),
        })
    }
}
