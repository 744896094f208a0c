// API request/response models (DTOs)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::reconcile::ReportedGame;

/// Standard API response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            meta: Some(Meta::now()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            meta: Some(Meta::now()),
        }
    }
}

/// Metadata included in all API responses
#[derive(Debug, Serialize, Deserialize)]
pub struct Meta {
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
    pub version: String,
}

impl Meta {
    pub fn now() -> Self {
        Self {
            timestamp: Utc::now(),
            request_id: uuid::Uuid::new_v4().to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
    pub uptime_seconds: u64,
}

/// Query string for GET /api/v1/games. Set filters arrive comma-separated.
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub name: Option<String>,
    pub genres: Option<String>,
    pub platforms: Option<String>,
    pub game_modes: Option<String>,
    pub min_rating: Option<f64>,
    pub sort: Option<String>,
    pub dir: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// Body for POST /api/v1/library/sync
#[derive(Debug, Deserialize)]
pub struct LibrarySyncRequest {
    pub user_id: String,
    #[serde(default)]
    pub mode: Option<String>,
    pub games: Vec<ReportedGame>,
}

#[derive(Debug, Serialize)]
pub struct LibrarySyncResponse {
    pub added: u64,
    pub removed: u64,
    pub unchanged: u64,
}

/// Body for POST /api/v1/enrichment/run
#[derive(Debug, Default, Deserialize)]
pub struct EnrichmentRunRequest {
    pub batch_size: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct EnrichmentRunResponse {
    pub scanned: u64,
    pub enriched_count: u64,
    pub failed: u64,
    pub rate_limited: bool,
}

#[derive(Debug, Serialize)]
pub struct RestoreResponse {
    pub restored_count: u64,
}
