//! Read-model transforms for the detail endpoint.

use anyhow::Result;
use serde::Serialize;

use crate::catalog::db::Db;
use crate::catalog::index;
use crate::catalog::models::EnrichmentState;

/// One owner as shown on the detail view: display name resolved (falling
/// back to the opaque id) and platforms merged per distinct user.
#[derive(Debug, Clone, Serialize)]
pub struct OwnerView {
    pub user_id: String,
    pub display_name: String,
    pub platforms: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GameDetailView {
    pub id: i64,
    pub name: String,
    pub state: EnrichmentState,
    pub external_id: Option<i64>,
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
    pub owners: Vec<OwnerView>,
    pub owner_count: i64,
    pub created_at: String,
    pub last_updated: String,
}

/// Detail lookup; `None` for an unknown id (distinct from validation
/// failures at the boundary).
pub async fn get_game_details(db: &Db, game_id: i64) -> Result<Option<GameDetailView>> {
    let Some(game) = index::find_by_id(db, game_id).await? else {
        return Ok(None);
    };

    // Edges are keyed (game, user) so duplicates should not exist; merge by
    // user id anyway so a historical merge bug can never leak duplicate
    // owners into the view.
    let merged = index::merge_edges_by_user(&game.owners);
    let owner_count = merged.len() as i64;
    let mut owners = Vec::with_capacity(merged.len());
    for edge in merged {
        let display_name = index::display_name_for(db, &edge.user_id)
            .await?
            .unwrap_or_else(|| edge.user_id.clone());
        owners.push(OwnerView {
            user_id: edge.user_id,
            display_name,
            platforms: edge.platforms.iter().map(|p| p.to_string()).collect(),
        });
    }

    let metadata = game.metadata.unwrap_or_default();
    Ok(Some(GameDetailView {
        id: game.id,
        name: game.canonical_name,
        state: game.state,
        external_id: game.external_id,
        description: metadata.description,
        genres: metadata.genres,
        platforms: metadata.platforms,
        game_modes: metadata.game_modes,
        rating: metadata.rating,
        artwork_url: metadata.artwork_url,
        release_date: metadata.release_date,
        videos: metadata.videos,
        publishers: metadata.publishers,
        canonical_url: metadata.canonical_url,
        owners,
        owner_count,
        created_at: game.created_at.to_rfc3339(),
        last_updated: game.last_updated.to_rfc3339(),
    }))
}
