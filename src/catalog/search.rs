//! Faceted search over the catalog read path.
//!
//! One rule applies unconditionally: only enriched Games are visible.
//! Unset and failed entries exist and keep accepting ownership, but never
//! surface here until enrichment succeeds.

use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::Row;

use crate::catalog::db::Db;
use crate::catalog::models::Game;
use crate::normalization::platform::expand_platform_filter;
use crate::util::env::env_parse;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchFilters {
    pub name: Option<String>,
    pub genres: Vec<String>,
    pub platforms: Vec<String>,
    pub game_modes: Vec<String>,
    pub min_rating: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    Name,
    Rating,
    ReleaseDate,
    CreatedAt,
    OwnerCount,
}

impl Default for SortKey {
    fn default() -> Self {
        SortKey::Name
    }
}

impl FromStr for SortKey {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "name" => Ok(SortKey::Name),
            "rating" => Ok(SortKey::Rating),
            "release_date" | "releasedate" => Ok(SortKey::ReleaseDate),
            "created_at" | "createdat" => Ok(SortKey::CreatedAt),
            "owner_count" | "ownercount" | "owners" => Ok(SortKey::OwnerCount),
            other => Err(anyhow::anyhow!("invalid sort key: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDir {
    Asc,
    Desc,
}

impl Default for SortDir {
    fn default() -> Self {
        SortDir::Asc
    }
}

impl FromStr for SortDir {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(SortDir::Asc),
            "desc" => Ok(SortDir::Desc),
            other => Err(anyhow::anyhow!("invalid sort direction: {other}")),
        }
    }
}

impl SortDir {
    fn sql(&self) -> &'static str {
        match self {
            SortDir::Asc => "ASC",
            SortDir::Desc => "DESC",
        }
    }
}

impl fmt::Display for SortDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SortDir::Asc => "asc",
            SortDir::Desc => "desc",
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: i64,
    pub total_pages: u32,
    pub has_next: bool,
    pub has_prev: bool,
}

/// List-mode projection: the raw owner edge list is intentionally omitted,
/// only the computed distinct-owner count is exposed.
#[derive(Debug, Clone, Serialize)]
pub struct GameListItem {
    pub id: i64,
    pub name: String,
    pub external_id: Option<i64>,
    pub description: Option<String>,
    pub genres: Vec<String>,
    pub platforms: Vec<String>,
    pub game_modes: Vec<String>,
    pub rating: Option<f64>,
    pub artwork_url: Option<String>,
    pub release_date: Option<String>,
    pub owner_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchPage {
    pub games: Vec<GameListItem>,
    pub pagination: Pagination,
}

pub fn max_limit() -> u32 {
    env_parse("SEARCH_MAX_LIMIT", 100u32).max(1)
}

struct QueryParts {
    where_sql: String,
    binds: Vec<Bind>,
}

enum Bind {
    Text(String),
    Real(f64),
}

fn json_membership_clause(column: &str, values: &[String], binds: &mut Vec<Bind>) -> String {
    let placeholders = values.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
    for v in values {
        binds.push(Bind::Text(v.clone()));
    }
    format!("EXISTS (SELECT 1 FROM json_each(g.{column}) WHERE json_each.value IN ({placeholders}))")
}

fn build_where(filters: &SearchFilters) -> QueryParts {
    let mut clauses = vec!["g.enrichment_state = 'enriched'".to_string()];
    let mut binds: Vec<Bind> = Vec::new();

    if let Some(name) = filters.name.as_deref() {
        let trimmed = name.trim();
        if !trimmed.is_empty() {
            // Literal `%`/`_` in titles stay literal in the pattern.
            let escaped = trimmed
                .to_lowercase()
                .replace('\\', "\\\\")
                .replace('%', "\\%")
                .replace('_', "\\_");
            clauses.push("LOWER(g.canonical_name) LIKE ? ESCAPE '\\'".to_string());
            binds.push(Bind::Text(format!("%{escaped}%")));
        }
    }
    if !filters.genres.is_empty() {
        clauses.push(json_membership_clause("genres", &filters.genres, &mut binds));
    }
    if !filters.platforms.is_empty() {
        // The synthetic "PC" value expands to the PC-family union before
        // matching; OR-semantics within the set are preserved.
        let expanded: Vec<String> = filters
            .platforms
            .iter()
            .flat_map(|p| expand_platform_filter(p))
            .collect();
        clauses.push(json_membership_clause("platforms", &expanded, &mut binds));
    }
    if !filters.game_modes.is_empty() {
        clauses.push(json_membership_clause("game_modes", &filters.game_modes, &mut binds));
    }
    if let Some(min_rating) = filters.min_rating {
        clauses.push("g.rating IS NOT NULL AND g.rating >= ?".to_string());
        binds.push(Bind::Real(min_rating));
    }

    QueryParts {
        where_sql: clauses.join(" AND "),
        binds,
    }
}

fn order_clause(sort: SortKey, dir: SortDir) -> String {
    let dir_sql = dir.sql();
    match sort {
        SortKey::Name => format!("LOWER(g.canonical_name) {dir_sql}, g.id ASC"),
        // NULL ratings/dates always sink to the end regardless of direction.
        SortKey::Rating => format!(
            "g.rating IS NULL, g.rating {dir_sql}, LOWER(g.canonical_name) ASC"
        ),
        SortKey::ReleaseDate => format!(
            "g.release_date IS NULL, g.release_date {dir_sql}, LOWER(g.canonical_name) ASC"
        ),
        SortKey::CreatedAt => format!("g.created_at {dir_sql}, g.id ASC"),
        // Ties break by ascending name for deterministic pagination.
        SortKey::OwnerCount => format!(
            "COALESCE(oc.owner_count, 0) {dir_sql}, LOWER(g.canonical_name) ASC"
        ),
    }
}

/// Filtered, sorted, paginated read over the catalog.
///
/// `page` is 1-indexed; `limit` is clamped to the configured maximum and
/// out-of-range pages clamp to the last valid page instead of erroring.
/// Results are a point-in-time snapshot, not linearizable with concurrent
/// writes.
pub async fn search(
    db: &Db,
    filters: &SearchFilters,
    sort: SortKey,
    dir: SortDir,
    page: u32,
    limit: u32,
) -> Result<SearchPage> {
    let limit = limit.clamp(1, max_limit());
    let parts = build_where(filters);

    let count_sql = format!("SELECT COUNT(*) FROM games g WHERE {}", parts.where_sql);
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    for bind in &parts.binds {
        count_query = match bind {
            Bind::Text(s) => count_query.bind(s.clone()),
            Bind::Real(r) => count_query.bind(*r),
        };
    }
    let total = count_query.fetch_one(&db.pool).await?;

    let total_pages = ((total as u64).div_ceil(limit as u64)) as u32;
    let page = page.max(1).min(total_pages.max(1));
    let offset = (page as i64 - 1) * limit as i64;

    let select_sql = format!(
        "SELECT g.*, COALESCE(oc.owner_count, 0) AS owner_count \
         FROM games g \
         LEFT JOIN (SELECT game_id, COUNT(DISTINCT user_id) AS owner_count \
                    FROM game_owners GROUP BY game_id) oc ON oc.game_id = g.id \
         WHERE {} ORDER BY {} LIMIT ? OFFSET ?",
        parts.where_sql,
        order_clause(sort, dir),
    );
    let mut select_query = sqlx::query(&select_sql);
    for bind in &parts.binds {
        select_query = match bind {
            Bind::Text(s) => select_query.bind(s.clone()),
            Bind::Real(r) => select_query.bind(*r),
        };
    }
    select_query = select_query.bind(limit as i64).bind(offset);

    let rows = select_query.fetch_all(&db.pool).await?;
    let mut games = Vec::with_capacity(rows.len());
    for row in &rows {
        let game = Game::from_row(row)?;
        let owner_count: i64 = row.try_get("owner_count")?;
        let metadata = game.metadata.unwrap_or_default();
        games.push(GameListItem {
            id: game.id,
            name: game.canonical_name,
            external_id: game.external_id,
            description: metadata.description,
            genres: metadata.genres,
            platforms: metadata.platforms,
            game_modes: metadata.game_modes,
            rating: metadata.rating,
            artwork_url: metadata.artwork_url,
            release_date: metadata.release_date,
            owner_count,
        });
    }

    Ok(SearchPage {
        games,
        pagination: Pagination {
            page,
            limit,
            total,
            total_pages,
            has_next: page < total_pages,
            has_prev: page > 1 && total_pages > 0,
        },
    })
}
