// HTTP request handlers for API endpoints

use actix_web::{web, HttpResponse, Result};
use std::time::SystemTime;

use crate::api::models::*;
use crate::catalog::db::Db;
use crate::catalog::reconcile::{self, SyncMode};
use crate::catalog::search::{self, SearchFilters, SortDir, SortKey};
use crate::catalog::{index, views};
use crate::enrichment::provider::ProviderError;
use crate::enrichment::scheduler::{self, DynScheduler};

fn bad_request(message: impl Into<String>) -> HttpResponse {
    HttpResponse::BadRequest().json(ApiResponse::<()>::error(message))
}

fn not_found(message: impl Into<String>) -> HttpResponse {
    HttpResponse::NotFound().json(ApiResponse::<()>::error(message))
}

fn internal_error(err: anyhow::Error) -> HttpResponse {
    tracing::error!(error = %err, "request failed");
    HttpResponse::InternalServerError().json(ApiResponse::<()>::error("internal error"))
}

fn split_csv(raw: &Option<String>) -> Vec<String> {
    raw.as_deref()
        .map(|s| {
            s.split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Health check endpoint
pub async fn health_check(db: web::Data<Db>) -> Result<HttpResponse> {
    let db_status = match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(&db.pool).await {
        Ok(_) => "connected",
        Err(_) => "disconnected",
    };

    let uptime = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    let response = ApiResponse::success(HealthResponse {
        status: "healthy".to_string(),
        database: db_status.to_string(),
        uptime_seconds: uptime,
    });

    Ok(HttpResponse::Ok().json(response))
}

/// Faceted catalog search. Invalid sort/direction values are a validation
/// error, never an internal one.
pub async fn search_games(
    query: web::Query<SearchQuery>,
    db: web::Data<Db>,
) -> Result<HttpResponse> {
    let sort = match query.sort.as_deref() {
        Some(raw) => match raw.parse::<SortKey>() {
            Ok(sort) => sort,
            Err(e) => return Ok(bad_request(e.to_string())),
        },
        None => SortKey::default(),
    };
    let dir = match query.dir.as_deref() {
        Some(raw) => match raw.parse::<SortDir>() {
            Ok(dir) => dir,
            Err(e) => return Ok(bad_request(e.to_string())),
        },
        None => SortDir::default(),
    };
    if let Some(min_rating) = query.min_rating {
        if !min_rating.is_finite() || min_rating < 0.0 {
            return Ok(bad_request("min_rating must be a non-negative number"));
        }
    }

    let filters = SearchFilters {
        name: query.name.clone(),
        genres: split_csv(&query.genres),
        platforms: split_csv(&query.platforms),
        game_modes: split_csv(&query.game_modes),
        min_rating: query.min_rating,
    };
    let page = query.page.unwrap_or(1);
    let limit = query.limit.unwrap_or(20);

    match search::search(&db, &filters, sort, dir, page, limit).await {
        Ok(result) => Ok(HttpResponse::Ok().json(ApiResponse::success(result))),
        Err(e) => Ok(internal_error(e)),
    }
}

/// Distinct facet values currently in the catalog.
pub async fn get_filter_options(db: web::Data<Db>) -> Result<HttpResponse> {
    match index::filter_options(&db).await {
        Ok(options) => Ok(HttpResponse::Ok().json(ApiResponse::success(options))),
        Err(e) => Ok(internal_error(e)),
    }
}

/// Detail view including owners. Unknown ids are 404, non-numeric ids 400.
pub async fn get_game_details(
    path: web::Path<String>,
    db: web::Data<Db>,
) -> Result<HttpResponse> {
    let game_id = match path.parse::<i64>() {
        Ok(id) if id > 0 => id,
        _ => return Ok(bad_request("game id must be a positive integer")),
    };
    match views::get_game_details(&db, game_id).await {
        Ok(Some(view)) => Ok(HttpResponse::Ok().json(ApiResponse::success(view))),
        Ok(None) => Ok(not_found(format!("game {game_id} not found"))),
        Err(e) => Ok(internal_error(e)),
    }
}

/// Reconcile a user's reported library into ownership edges.
pub async fn sync_library(
    payload: web::Json<LibrarySyncRequest>,
    db: web::Data<Db>,
) -> Result<HttpResponse> {
    if payload.user_id.trim().is_empty() {
        return Ok(bad_request("user_id is required"));
    }
    let mode = match payload.mode.as_deref() {
        Some(raw) => match raw.parse::<SyncMode>() {
            Ok(mode) => mode,
            Err(e) => return Ok(bad_request(e.to_string())),
        },
        None => SyncMode::Incremental,
    };

    match reconcile::reconcile_user_library(&db, payload.user_id.trim(), &payload.games, mode).await
    {
        Ok(summary) => Ok(HttpResponse::Ok().json(ApiResponse::success(LibrarySyncResponse {
            added: summary.added,
            removed: summary.removed,
            unchanged: summary.unchanged,
        }))),
        Err(e) => Ok(internal_error(e)),
    }
}

/// Run one enrichment batch. A provider auth failure is surfaced as an
/// upstream error, not swallowed per-Game.
pub async fn run_enrichment(
    payload: Option<web::Json<EnrichmentRunRequest>>,
    db: web::Data<Db>,
    sched: web::Data<DynScheduler>,
) -> Result<HttpResponse> {
    let batch_size = payload.and_then(|p| p.batch_size);
    if let Some(0) = batch_size {
        return Ok(bad_request("batch_size must be at least 1"));
    }

    match sched.run_batch(&db, batch_size).await {
        Ok(report) => Ok(HttpResponse::Ok().json(ApiResponse::success(EnrichmentRunResponse {
            scanned: report.scanned,
            enriched_count: report.enriched,
            failed: report.failed,
            rate_limited: report.rate_limited,
        }))),
        Err(e) => {
            if e.chain().any(|cause| {
                cause
                    .downcast_ref::<ProviderError>()
                    .is_some_and(|p| matches!(p, ProviderError::Auth(_)))
            }) {
                tracing::error!(error = %e, "enrichment run aborted: provider auth failure");
                return Ok(HttpResponse::BadGateway()
                    .json(ApiResponse::<()>::error("metadata provider authentication failed")));
            }
            Ok(internal_error(e))
        }
    }
}

/// Restore failed Games for retry on the next batch.
pub async fn restore_failed(db: web::Data<Db>) -> Result<HttpResponse> {
    match scheduler::restore_failed_games(&db).await {
        Ok(restored) => Ok(HttpResponse::Ok().json(ApiResponse::success(RestoreResponse {
            restored_count: restored,
        }))),
        Err(e) => Ok(internal_error(e)),
    }
}
