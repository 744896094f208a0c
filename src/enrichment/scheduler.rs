//! Drives Games from `unset` to `enriched` or `failed` under the provider's
//! rate cap.
//!
//! Within a batch, Games are enriched sequentially with a fixed
//! inter-request delay; the sleep is the throughput cap, not a bug. No DB
//! transaction is ever held across a provider call.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use crate::catalog::db::Db;
use crate::catalog::index;
use crate::catalog::models::GameMetadata;
use crate::enrichment::provider::{MetadataProvider, ProviderDetail, ProviderError};
use crate::normalization::name::FlexibleMatcher;
use crate::util::env::env_parse;

#[derive(Debug, Clone)]
pub struct EnrichConfig {
    pub batch_size: usize,
    pub request_delay_ms: u64,
    pub search_limit: usize,
    /// Checked before each external call; set to cancel between Games.
    /// Single-Game writes are atomic and are never interrupted.
    pub cancel: Arc<AtomicBool>,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            batch_size: 20,
            request_delay_ms: 300,
            search_limit: 5,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl EnrichConfig {
    pub fn from_env() -> Self {
        Self {
            batch_size: env_parse("ENRICH_BATCH_SIZE", 20usize).max(1),
            request_delay_ms: env_parse("ENRICH_DELAY_MS", 300u64),
            search_limit: env_parse("ENRICH_SEARCH_LIMIT", 5usize).clamp(1, 50),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct EnrichmentReport {
    pub scanned: u64,
    pub enriched: u64,
    pub failed: u64,
    pub rate_limited: bool,
    pub cancelled: bool,
}

pub struct EnrichmentScheduler<P: MetadataProvider> {
    provider: P,
    cfg: EnrichConfig,
}

/// Object-safe scheduler flavor used by the API server state.
pub type DynScheduler = EnrichmentScheduler<Box<dyn MetadataProvider>>;

enum GameOutcome {
    Enriched,
    Failed,
    /// Provider asked us to back off; the Game stays unset and the batch
    /// stops calling out.
    RateLimited,
}

impl<P: MetadataProvider> EnrichmentScheduler<P> {
    pub fn new(provider: P, cfg: EnrichConfig) -> Self {
        Self { provider, cfg }
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cfg.cancel.clone()
    }

    pub fn provider_ref(&self) -> &P {
        &self.provider
    }

    /// Run one batch over the oldest unset Games.
    ///
    /// Per-Game provider errors are recorded as `failed` state, never
    /// thrown. A rate-limit response aborts the remainder of the batch
    /// (remaining Games stay unset for the next scheduled run). An auth
    /// failure is fatal to the whole run and propagates.
    pub async fn run_batch(&self, db: &Db, batch_size: Option<usize>) -> Result<EnrichmentReport> {
        let limit = batch_size.unwrap_or(self.cfg.batch_size).max(1);
        let batch = index::pick_enrichment_batch(db, limit).await?;
        let mut report = EnrichmentReport::default();
        info!(batch = batch.len(), "enrichment batch starting");

        let mut first = true;
        for (game_id, canonical_name) in batch {
            if self.cfg.cancel.load(Ordering::Relaxed) {
                report.cancelled = true;
                break;
            }
            if !first && self.cfg.request_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.cfg.request_delay_ms)).await;
            }
            first = false;
            report.scanned += 1;

            match self.enrich_one(db, game_id, &canonical_name).await? {
                GameOutcome::Enriched => report.enriched += 1,
                GameOutcome::Failed => report.failed += 1,
                GameOutcome::RateLimited => {
                    report.rate_limited = true;
                    break;
                }
            }
        }

        info!(
            scanned = report.scanned,
            enriched = report.enriched,
            failed = report.failed,
            rate_limited = report.rate_limited,
            "enrichment batch finished"
        );
        Ok(report)
    }

    async fn enrich_one(
        &self,
        db: &Db,
        game_id: i64,
        canonical_name: &str,
    ) -> Result<GameOutcome> {
        let candidates = match self
            .provider
            .search_by_name(canonical_name, self.cfg.search_limit)
            .await
        {
            Ok(candidates) => candidates,
            Err(ProviderError::RateLimited) => return Ok(GameOutcome::RateLimited),
            Err(err @ ProviderError::Auth(_)) => {
                return Err(anyhow::Error::new(err)).context("provider authentication failed")
            }
            Err(err) => {
                warn!(game_id, name = canonical_name, error = %err, "candidate search failed");
                index::mark_enrichment_failed(db, game_id).await?;
                return Ok(GameOutcome::Failed);
            }
        };

        // Provider-side relevance ranking is trusted: take the first hit.
        let Some(candidate) = candidates.into_iter().next() else {
            info!(game_id, name = canonical_name, "no provider candidate");
            index::mark_enrichment_failed(db, game_id).await?;
            return Ok(GameOutcome::Failed);
        };
        if !FlexibleMatcher::new(canonical_name).is_candidate(&candidate.name) {
            warn!(
                game_id,
                name = canonical_name,
                candidate = %candidate.name,
                "provider candidate name diverges from catalog name"
            );
        }

        let detail = match self.provider.get_details(candidate.id).await {
            Ok(detail) => detail,
            Err(ProviderError::RateLimited) => return Ok(GameOutcome::RateLimited),
            Err(err @ ProviderError::Auth(_)) => {
                return Err(anyhow::Error::new(err)).context("provider authentication failed")
            }
            Err(err) => {
                warn!(game_id, provider_id = candidate.id, error = %err, "detail fetch failed");
                index::mark_enrichment_failed(db, game_id).await?;
                return Ok(GameOutcome::Failed);
            }
        };

        // The stored canonical_name stays the community's spelling;
        // apply_metadata never touches it.
        index::apply_metadata(db, game_id, candidate.id, &to_metadata(&detail)).await?;
        info!(game_id, provider_id = candidate.id, "game enriched");
        Ok(GameOutcome::Enriched)
    }
}

fn to_metadata(detail: &ProviderDetail) -> GameMetadata {
    GameMetadata {
        description: detail.description.clone(),
        genres: detail.genres.clone(),
        platforms: detail.platforms.clone(),
        game_modes: detail.game_modes.clone(),
        rating: detail.rating,
        artwork_url: detail.artwork_url.clone(),
        release_date: detail.release_date.clone(),
        videos: detail.videos.clone(),
        publishers: detail.publishers.clone(),
        canonical_url: detail.canonical_url.clone(),
    }
}

/// Admin restore: flips every failed Game back to unset so the next batch
/// retries it. Owners are untouched.
pub async fn restore_failed_games(db: &Db) -> Result<u64> {
    let restored = index::restore_failed(db).await?;
    info!(restored, "failed games restored for retry");
    Ok(restored)
}
