//! Shared test fixtures: an in-memory catalog and a scripted provider.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ludex::catalog::db::Db;
use ludex::catalog::models::GameMetadata;
use ludex::catalog::reconcile::ReportedGame;
use ludex::enrichment::provider::{Candidate, MetadataProvider, ProviderDetail, ProviderError};
use ludex::enrichment::scheduler::EnrichConfig;

pub async fn test_db() -> Db {
    Db::connect_memory().await.expect("in-memory db")
}

pub fn reported(name: &str, platform: &str) -> ReportedGame {
    ReportedGame {
        name: name.to_string(),
        platform: platform.to_string(),
        platform_external_id: None,
    }
}

/// Fast scheduler config for tests: no inter-request delay.
pub fn fast_config() -> EnrichConfig {
    EnrichConfig {
        request_delay_ms: 0,
        ..EnrichConfig::default()
    }
}

pub fn sample_detail(genre: &str) -> ProviderDetail {
    ProviderDetail {
        description: Some("A game.".to_string()),
        genres: vec![genre.to_string()],
        platforms: vec!["PC (Microsoft Windows)".to_string()],
        game_modes: vec!["Single player".to_string()],
        rating: Some(80.0),
        artwork_url: Some("https://images.example/cover.png".to_string()),
        release_date: Some("1985-09-13".to_string()),
        videos: vec![],
        publishers: vec!["Example Publishing".to_string()],
        canonical_url: Some("https://catalog.example/game".to_string()),
    }
}

#[derive(Default)]
struct MockState {
    pub search_calls: u32,
    pub detail_calls: u32,
    candidates: HashMap<String, Vec<Candidate>>,
    details: HashMap<i64, ProviderDetail>,
    search_errors: HashMap<String, &'static str>,
    detail_errors: HashSet<i64>,
    /// 1-based search-call index from which every further call is refused
    /// with a rate-limit signal.
    rate_limit_from: Option<u32>,
    auth_broken: bool,
    /// Raised once the given 1-based search call completes, to exercise
    /// mid-batch cancellation.
    cancel_after: Option<(u32, Arc<AtomicBool>)>,
}

/// Scripted metadata provider. All behavior is keyed off the exact
/// canonical name / provider id the engine asks for, and every external
/// call is counted so tests can assert the scheduler stopped calling out.
#[derive(Default)]
pub struct MockProvider {
    state: Mutex<MockState>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_game(self, name: &str, provider_id: i64, detail: ProviderDetail) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.candidates.insert(
                name.to_string(),
                vec![Candidate {
                    id: provider_id,
                    name: name.to_string(),
                    rating: detail.rating,
                    cover_url: detail.artwork_url.clone(),
                    first_release_epoch: None,
                }],
            );
            state.details.insert(provider_id, detail);
        }
        self
    }

    pub fn with_search_error(self, name: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .search_errors
            .insert(name.to_string(), "boom");
        self
    }

    pub fn with_detail_error(self, provider_id: i64) -> Self {
        self.state.lock().unwrap().detail_errors.insert(provider_id);
        self
    }

    pub fn rate_limited_from_call(self, call_index: u32) -> Self {
        self.state.lock().unwrap().rate_limit_from = Some(call_index);
        self
    }

    pub fn with_broken_auth(self) -> Self {
        self.state.lock().unwrap().auth_broken = true;
        self
    }

    pub fn with_cancel_after(self, call_index: u32, flag: Arc<AtomicBool>) -> Self {
        self.state.lock().unwrap().cancel_after = Some((call_index, flag));
        self
    }

    pub fn search_calls(&self) -> u32 {
        self.state.lock().unwrap().search_calls
    }

    pub fn detail_calls(&self) -> u32 {
        self.state.lock().unwrap().detail_calls
    }
}

#[async_trait]
impl MetadataProvider for MockProvider {
    async fn search_by_name(
        &self,
        name: &str,
        _limit: usize,
    ) -> Result<Vec<Candidate>, ProviderError> {
        let mut state = self.state.lock().unwrap();
        state.search_calls += 1;
        if let Some((from, flag)) = &state.cancel_after {
            if state.search_calls >= *from {
                flag.store(true, Ordering::Relaxed);
            }
        }
        if state.auth_broken {
            return Err(ProviderError::Auth("invalid client credentials".into()));
        }
        if let Some(from) = state.rate_limit_from {
            if state.search_calls >= from {
                return Err(ProviderError::RateLimited);
            }
        }
        if let Some(msg) = state.search_errors.get(name) {
            return Err(ProviderError::Http((*msg).to_string()));
        }
        Ok(state.candidates.get(name).cloned().unwrap_or_default())
    }

    async fn get_details(&self, id: i64) -> Result<ProviderDetail, ProviderError> {
        let mut state = self.state.lock().unwrap();
        state.detail_calls += 1;
        if state.detail_errors.contains(&id) {
            return Err(ProviderError::Http(format!("detail {id} unavailable")));
        }
        state
            .details
            .get(&id)
            .cloned()
            .ok_or_else(|| ProviderError::Http(format!("unknown id {id}")))
    }
}

/// Directly seed an enriched game, bypassing the provider, for read-path
/// tests.
pub async fn seed_enriched(
    db: &Db,
    name: &str,
    external_id: i64,
    metadata: GameMetadata,
) -> i64 {
    let key = ludex::normalization::name::exact_match_key(name);
    let id = ludex::catalog::index::ensure_game(db, name, &key)
        .await
        .expect("ensure game");
    ludex::catalog::index::apply_metadata(db, id, external_id, &metadata)
        .await
        .expect("apply metadata");
    id
}

pub fn metadata(
    genres: &[&str],
    platforms: &[&str],
    modes: &[&str],
    rating: Option<f64>,
) -> GameMetadata {
    GameMetadata {
        description: Some("seeded".to_string()),
        genres: genres.iter().map(|s| s.to_string()).collect(),
        platforms: platforms.iter().map(|s| s.to_string()).collect(),
        game_modes: modes.iter().map(|s| s.to_string()).collect(),
        rating,
        artwork_url: None,
        release_date: Some("2020-01-01".to_string()),
        videos: vec![],
        publishers: vec![],
        canonical_url: None,
    }
}
