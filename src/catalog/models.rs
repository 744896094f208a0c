use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row};

use crate::normalization::platform::PlatformTag;

/// Tagged enrichment lifecycle of a canonical Game.
///
/// `Unset` entries have never been matched against the metadata provider,
/// `Failed` entries were attempted and need an explicit restore before they
/// are retried, `Enriched` entries carry provider metadata and are the only
/// ones visible to consumer search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrichmentState {
    Unset,
    Enriched,
    Failed,
}

impl EnrichmentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrichmentState::Unset => "unset",
            EnrichmentState::Enriched => "enriched",
            EnrichmentState::Failed => "failed",
        }
    }
}

impl fmt::Display for EnrichmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnrichmentState {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "unset" => Ok(EnrichmentState::Unset),
            "enriched" => Ok(EnrichmentState::Enriched),
            "failed" => Ok(EnrichmentState::Failed),
            other => Err(anyhow::anyhow!("invalid enrichment state: {other}")),
        }
    }
}

/// Provider-sourced metadata bundle; present exactly when the Game is
/// enriched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GameMetadata {
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

/// One user's ownership relation on a Game, carrying the set of platforms
/// through which that user owns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnershipEdge {
    pub user_id: String,
    pub platforms: BTreeSet<PlatformTag>,
}

/// Canonical catalog entity.
#[derive(Debug, Clone)]
pub struct Game {
    pub id: i64,
    pub canonical_name: String,
    pub normalized_name: String,
    pub state: EnrichmentState,
    pub external_id: Option<i64>,
    pub metadata: Option<GameMetadata>,
    pub owners: Vec<OwnershipEdge>,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

fn json_string_vec(raw: Option<String>) -> Vec<String> {
    raw.and_then(|s| serde_json::from_str::<Vec<String>>(&s).ok())
        .unwrap_or_default()
}

pub(crate) fn decode_platform_set(raw: &str) -> BTreeSet<PlatformTag> {
    serde_json::from_str::<Vec<String>>(raw)
        .unwrap_or_default()
        .iter()
        .filter_map(|s| s.parse::<PlatformTag>().ok())
        .collect()
}

pub(crate) fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

impl Game {
    /// Map a `games` row (without owners) into the domain entity.
    pub(crate) fn from_row(row: &SqliteRow) -> anyhow::Result<Self> {
        let state: String = row.try_get("enrichment_state")?;
        let state = state.parse::<EnrichmentState>()?;
        let metadata = if state == EnrichmentState::Enriched {
            Some(GameMetadata {
                description: row.try_get("description")?,
                genres: json_string_vec(row.try_get("genres")?),
                platforms: json_string_vec(row.try_get("platforms")?),
                game_modes: json_string_vec(row.try_get("game_modes")?),
                rating: row.try_get("rating")?,
                artwork_url: row.try_get("artwork_url")?,
                release_date: row.try_get("release_date")?,
                videos: json_string_vec(row.try_get("videos")?),
                publishers: json_string_vec(row.try_get("publishers")?),
                canonical_url: row.try_get("canonical_url")?,
            })
        } else {
            None
        };
        let created_at: String = row.try_get("created_at")?;
        let last_updated: String = row.try_get("last_updated")?;
        Ok(Game {
            id: row.try_get("id")?,
            canonical_name: row.try_get("canonical_name")?,
            normalized_name: row.try_get("normalized_name")?,
            state,
            external_id: row.try_get("external_id")?,
            metadata,
            owners: Vec::new(),
            created_at: parse_timestamp(&created_at),
            last_updated: parse_timestamp(&last_updated),
        })
    }
}
