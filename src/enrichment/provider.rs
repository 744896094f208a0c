use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One relevance-ranked hit from the provider's name search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub id: i64,
    pub name: String,
    pub rating: Option<f64>,
    pub cover_url: Option<String>,
    pub first_release_epoch: Option<i64>,
}

/// Full detail record for a matched catalog entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderDetail {
    pub description: Option<String>,
    pub genres: Vec<String>,
    pub platforms: Vec<String>,
    pub game_modes: Vec<String>,
    pub rating: Option<f64>,
    pub artwork_url: Option<String>,
    pub release_date: Option<String>,
    pub videos: Vec<String>,
    pub publishers: Vec<String>,
    pub canonical_url: Option<String>,
}

/// Failure classes the scheduler has to tell apart: a rate-limit pauses the
/// batch, an auth failure kills the run, anything else fails one Game.
#[derive(Debug)]
pub enum ProviderError {
    RateLimited,
    Auth(String),
    Http(String),
    Decode(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::RateLimited => write!(f, "provider rate limited"),
            ProviderError::Auth(msg) => write!(f, "provider auth failure: {msg}"),
            ProviderError::Http(msg) => write!(f, "provider request failed: {msg}"),
            ProviderError::Decode(msg) => write!(f, "provider payload decode failed: {msg}"),
        }
    }
}

impl std::error::Error for ProviderError {}

/// External metadata catalog collaborator. Implementations must surface
/// rate limiting as `ProviderError::RateLimited`, distinct from all other
/// failures.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    async fn search_by_name(
        &self,
        name: &str,
        limit: usize,
    ) -> Result<Vec<Candidate>, ProviderError>;

    async fn get_details(&self, id: i64) -> Result<ProviderDetail, ProviderError>;
}

#[async_trait]
impl MetadataProvider for Box<dyn MetadataProvider> {
    async fn search_by_name(
        &self,
        name: &str,
        limit: usize,
    ) -> Result<Vec<Candidate>, ProviderError> {
        (**self).search_by_name(name, limit).await
    }

    async fn get_details(&self, id: i64) -> Result<ProviderDetail, ProviderError> {
        (**self).get_details(id).await
    }
}
