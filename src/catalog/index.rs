//! Persistent store operations for canonical Game entities.
//!
//! Single-Game mutations are atomic: creation races on the unique
//! `normalized_name` resolve through `INSERT .. ON CONFLICT DO NOTHING`
//! at the storage layer, and edge/metadata writes run inside short
//! transactions that never span a network call.

use std::collections::BTreeSet;

use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use itertools::Itertools;
use serde::Serialize;
use sqlx::Row;
use tracing::debug;

use crate::catalog::db::Db;
use crate::catalog::models::{decode_platform_set, EnrichmentState, Game, GameMetadata, OwnershipEdge};
use crate::normalization::platform::{collapse_pc_family, PlatformTag};

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// `last_updated` is monotonically non-decreasing even if the wall clock
/// steps backwards: RFC3339 at fixed precision compares lexicographically.
const TOUCH_GAME: &str =
    "UPDATE games SET last_updated = CASE WHEN last_updated > ?1 THEN last_updated ELSE ?1 END \
     WHERE id = ?2";

/// Create-if-absent keyed by the unique normalized name, returning the id of
/// whichever row won. The first reporter's spelling of `canonical_name` is
/// authoritative and is never replaced by later reporters.
pub async fn ensure_game(db: &Db, canonical_name: &str, normalized_name: &str) -> Result<i64> {
    let now = now_rfc3339();
    sqlx::query(
        "INSERT INTO games (canonical_name, normalized_name, created_at, last_updated) \
         VALUES (?1, ?2, ?3, ?3) \
         ON CONFLICT(normalized_name) DO NOTHING",
    )
    .bind(canonical_name)
    .bind(normalized_name)
    .bind(&now)
    .execute(&db.pool)
    .await?;

    let id: i64 = sqlx::query_scalar("SELECT id FROM games WHERE normalized_name = ?1")
        .bind(normalized_name)
        .fetch_one(&db.pool)
        .await?;
    Ok(id)
}

pub async fn find_by_normalized_name(db: &Db, key: &str) -> Result<Option<Game>> {
    let row = sqlx::query("SELECT * FROM games WHERE normalized_name = ?1")
        .bind(key)
        .fetch_optional(&db.pool)
        .await?;
    match row {
        Some(row) => {
            let mut game = Game::from_row(&row)?;
            game.owners = load_owners(db, game.id).await?;
            Ok(Some(game))
        }
        None => Ok(None),
    }
}

pub async fn find_by_id(db: &Db, id: i64) -> Result<Option<Game>> {
    let row = sqlx::query("SELECT * FROM games WHERE id = ?1")
        .bind(id)
        .fetch_optional(&db.pool)
        .await?;
    match row {
        Some(row) => {
            let mut game = Game::from_row(&row)?;
            game.owners = load_owners(db, game.id).await?;
            Ok(Some(game))
        }
        None => Ok(None),
    }
}

pub async fn load_owners(db: &Db, game_id: i64) -> Result<Vec<OwnershipEdge>> {
    let rows = sqlx::query(
        "SELECT user_id, platforms FROM game_owners WHERE game_id = ?1 ORDER BY user_id",
    )
    .bind(game_id)
    .fetch_all(&db.pool)
    .await?;
    Ok(rows
        .iter()
        .map(|r| {
            let platforms: String = r.get("platforms");
            OwnershipEdge {
                user_id: r.get("user_id"),
                platforms: decode_platform_set(&platforms),
            }
        })
        .collect())
}

/// Single-statement edge upsert: inserts the edge, or unions the platform
/// into the existing JSON set. The no-op guard on the DO UPDATE makes
/// `rows_affected` report whether the set actually grew. Keeping this one
/// statement (no read before the write) is what lets concurrent
/// reconciliations serialize on the write lock instead of deadlocking a
/// read snapshot against it.
const UPSERT_OWNER: &str =
    "INSERT INTO game_owners (game_id, user_id, platforms) VALUES (?1, ?2, json_array(?3)) \
     ON CONFLICT(game_id, user_id) DO UPDATE SET platforms = \
        (SELECT json_group_array(value) FROM \
            (SELECT value FROM json_each(game_owners.platforms) UNION SELECT ?3)) \
     WHERE NOT EXISTS \
        (SELECT 1 FROM json_each(game_owners.platforms) WHERE json_each.value = ?3)";

/// Add `platform` to the user's ownership edge on a Game, creating the edge
/// when absent. Idempotent: returns true only when the edge set actually
/// grew, in which case `last_updated` is bumped.
pub async fn upsert_owner(
    db: &Db,
    game_id: i64,
    user_id: &str,
    platform: PlatformTag,
) -> Result<bool> {
    // The transaction opens with a write, so the busy handler covers lock
    // contention; a read here first would pin a snapshot that cannot be
    // upgraded once another writer commits.
    let mut tx = db.pool.begin().await?;
    let result = sqlx::query(UPSERT_OWNER)
        .bind(game_id)
        .bind(user_id)
        .bind(platform.as_str())
        .execute(&mut *tx)
        .await?;
    let added = result.rows_affected() > 0;
    if added {
        sqlx::query(TOUCH_GAME)
            .bind(now_rfc3339())
            .bind(game_id)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(added)
}

/// Drop the user's edge from a Game entirely. Used only by the full-resync
/// path; incremental sync never removes.
pub async fn remove_owner(db: &Db, game_id: i64, user_id: &str) -> Result<bool> {
    let mut tx = db.pool.begin().await?;
    let result = sqlx::query("DELETE FROM game_owners WHERE game_id = ?1 AND user_id = ?2")
        .bind(game_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    let removed = result.rows_affected() > 0;
    if removed {
        sqlx::query(TOUCH_GAME)
            .bind(now_rfc3339())
            .bind(game_id)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(removed)
}

/// All (game id, normalized name) pairs the user currently has an edge on.
pub async fn edges_for_user(db: &Db, user_id: &str) -> Result<Vec<(i64, String)>> {
    let rows = sqlx::query(
        "SELECT g.id, g.normalized_name FROM games g \
         JOIN game_owners o ON o.game_id = g.id \
         WHERE o.user_id = ?1",
    )
    .bind(user_id)
    .fetch_all(&db.pool)
    .await?;
    Ok(rows
        .iter()
        .map(|r| (r.get::<i64, _>("id"), r.get::<String, _>("normalized_name")))
        .collect())
}

const APPLY_METADATA: &str = "UPDATE games SET \
        enrichment_state = 'enriched', \
        external_id = ?1, \
        description = ?2, \
        genres = ?3, \
        platforms = ?4, \
        game_modes = ?5, \
        rating = ?6, \
        artwork_url = ?7, \
        release_date = ?8, \
        videos = ?9, \
        publishers = ?10, \
        canonical_url = ?11, \
        last_updated = CASE WHEN last_updated > ?12 THEN last_updated ELSE ?12 END \
     WHERE id = ?13";

async fn apply_metadata_on<'e, E>(
    executor: E,
    game_id: i64,
    external_id: i64,
    metadata: &GameMetadata,
    now: &str,
) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(APPLY_METADATA)
        .bind(external_id)
        .bind(&metadata.description)
        .bind(serde_json::to_string(&metadata.genres)?)
        .bind(serde_json::to_string(&metadata.platforms)?)
        .bind(serde_json::to_string(&metadata.game_modes)?)
        .bind(metadata.rating)
        .bind(&metadata.artwork_url)
        .bind(&metadata.release_date)
        .bind(serde_json::to_string(&metadata.videos)?)
        .bind(serde_json::to_string(&metadata.publishers)?)
        .bind(&metadata.canonical_url)
        .bind(now)
        .bind(game_id)
        .execute(executor)
        .await?;
    Ok(())
}

/// Atomically persist provider metadata and flip the Game to `enriched`.
/// `canonical_name` is deliberately untouched: the community's spelling
/// survives enrichment so ownership continuity is preserved.
pub async fn apply_metadata(
    db: &Db,
    game_id: i64,
    external_id: i64,
    metadata: &GameMetadata,
) -> Result<()> {
    apply_metadata_on(&db.pool, game_id, external_id, metadata, &now_rfc3339()).await
}

/// Bulk flavor for batch backfills: every `(game_id, external_id, metadata)`
/// triple lands in one transaction, so a crash mid-batch leaves no
/// half-enriched subset behind.
pub async fn apply_metadata_bulk(
    db: &Db,
    items: &[(i64, i64, GameMetadata)],
) -> Result<u64> {
    let now = now_rfc3339();
    let mut tx = db.pool.begin().await?;
    for (game_id, external_id, metadata) in items {
        apply_metadata_on(&mut *tx, *game_id, *external_id, metadata, &now).await?;
    }
    tx.commit().await?;
    Ok(items.len() as u64)
}

/// Record an enrichment failure. Metadata stays empty and the Game stays
/// invisible to search until an explicit restore.
pub async fn mark_enrichment_failed(db: &Db, game_id: i64) -> Result<()> {
    sqlx::query(
        "UPDATE games SET enrichment_state = 'failed', external_id = NULL, \
            last_updated = CASE WHEN last_updated > ?1 THEN last_updated ELSE ?1 END \
         WHERE id = ?2",
    )
    .bind(now_rfc3339())
    .bind(game_id)
    .execute(&db.pool)
    .await?;
    debug!(game_id, "marked enrichment failed");
    Ok(())
}

/// Admin restore: failed -> unset, eligible for the next batch. Ownership
/// edges are untouched.
pub async fn restore_failed(db: &Db) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE games SET enrichment_state = 'unset', \
            last_updated = CASE WHEN last_updated > ?1 THEN last_updated ELSE ?1 END \
         WHERE enrichment_state = 'failed'",
    )
    .bind(now_rfc3339())
    .execute(&db.pool)
    .await?;
    Ok(result.rows_affected())
}

/// Unenriched Games, oldest first, for the next scheduler batch.
pub async fn pick_enrichment_batch(db: &Db, limit: usize) -> Result<Vec<(i64, String)>> {
    let rows = sqlx::query(
        "SELECT id, canonical_name FROM games WHERE enrichment_state = 'unset' \
         ORDER BY created_at ASC, id ASC LIMIT ?1",
    )
    .bind(limit as i64)
    .fetch_all(&db.pool)
    .await?;
    Ok(rows
        .iter()
        .map(|r| (r.get::<i64, _>("id"), r.get::<String, _>("canonical_name")))
        .collect())
}

#[derive(Debug, Clone, Serialize)]
pub struct FilterOptions {
    pub genres: Vec<String>,
    pub platforms: Vec<String>,
    pub game_modes: Vec<String>,
}

async fn distinct_json_values(db: &Db, column: &str) -> Result<Vec<String>> {
    // `column` is a compile-time constant from the callers below, never
    // user input.
    let sql = format!(
        "SELECT DISTINCT je.value AS v FROM games g, json_each(g.{column}) je \
         WHERE g.enrichment_state = 'enriched' ORDER BY v",
    );
    let rows = sqlx::query(&sql).fetch_all(&db.pool).await?;
    Ok(rows.iter().map(|r| r.get::<String, _>("v")).collect())
}

/// Distinct facet values currently present among enriched Games, with the
/// PC-family grouping applied to platforms.
pub async fn filter_options(db: &Db) -> Result<FilterOptions> {
    let (genres, platforms, game_modes) = futures::try_join!(
        distinct_json_values(db, "genres"),
        distinct_json_values(db, "platforms"),
        distinct_json_values(db, "game_modes"),
    )?;
    Ok(FilterOptions {
        genres,
        platforms: collapse_pc_family(platforms),
        game_modes,
    })
}

pub async fn upsert_user_profile(db: &Db, user_id: &str, display_name: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO user_profiles (user_id, display_name) VALUES (?1, ?2) \
         ON CONFLICT(user_id) DO UPDATE SET display_name = excluded.display_name",
    )
    .bind(user_id)
    .bind(display_name)
    .execute(&db.pool)
    .await?;
    Ok(())
}

pub async fn display_name_for(db: &Db, user_id: &str) -> Result<Option<String>> {
    let name: Option<String> =
        sqlx::query_scalar("SELECT display_name FROM user_profiles WHERE user_id = ?1")
            .bind(user_id)
            .fetch_optional(&db.pool)
            .await?;
    Ok(name)
}

/// Bulk edge upsert for batch reconciliation: one `(game_id, platform)` pair
/// per reported tuple, already deduplicated by the caller.
pub async fn upsert_owner_bulk(
    db: &Db,
    user_id: &str,
    pairs: &[(i64, PlatformTag)],
) -> Result<u64> {
    let mut added = 0u64;
    for (game_id, platform) in pairs.iter().unique() {
        if upsert_owner(db, *game_id, user_id, *platform).await? {
            added += 1;
        }
    }
    Ok(added)
}

/// Row counts for operator tooling.
pub async fn table_counts(db: &Db) -> Result<Vec<(&'static str, i64)>> {
    let mut out = Vec::new();
    for table in ["games", "game_owners", "user_profiles"] {
        let sql = format!("SELECT COUNT(*) FROM {table}");
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&db.pool).await?;
        out.push((table, count));
    }
    let mut state_counts = Vec::new();
    for state in [
        EnrichmentState::Unset,
        EnrichmentState::Enriched,
        EnrichmentState::Failed,
    ] {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM games WHERE enrichment_state = ?1")
                .bind(state.as_str())
                .fetch_one(&db.pool)
                .await?;
        state_counts.push((state, count));
    }
    for (state, count) in state_counts {
        out.push((
            match state {
                EnrichmentState::Unset => "games:unset",
                EnrichmentState::Enriched => "games:enriched",
                EnrichmentState::Failed => "games:failed",
            },
            count,
        ));
    }
    Ok(out)
}

/// Merge edges by user id (defensive: duplicate user rows collapse into one
/// platform set) for display paths.
pub fn merge_edges_by_user(edges: &[OwnershipEdge]) -> Vec<OwnershipEdge> {
    let mut merged: Vec<OwnershipEdge> = Vec::new();
    for edge in edges {
        match merged.iter_mut().find(|e| e.user_id == edge.user_id) {
            Some(existing) => {
                existing.platforms.extend(edge.platforms.iter().copied());
            }
            None => merged.push(OwnershipEdge {
                user_id: edge.user_id.clone(),
                platforms: edge.platforms.iter().copied().collect::<BTreeSet<_>>(),
            }),
        }
    }
    merged
}
