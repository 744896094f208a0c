//! Merges a user's freshly reported game list into shared ownership edges.
//!
//! Matching at ownership time is exact-key only: flexible matching is
//! reserved for enrichment, where a curated provider name is available to
//! disambiguate. Two users spelling different titles similarly must never
//! be silently merged here.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::catalog::db::Db;
use crate::catalog::index;
use crate::normalization::name;
use crate::normalization::platform::PlatformTag;

/// One normalized tuple from a library source parser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportedGame {
    pub name: String,
    pub platform: String,
    #[serde(default)]
    pub platform_external_id: Option<String>,
}

/// Incremental sync only ever adds edges (the reporting source may be a
/// partial view). Full resync treats the report as authoritative and also
/// removes the user's edges from games no longer present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    Incremental,
    Full,
}

impl FromStr for SyncMode {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "incremental" => Ok(SyncMode::Incremental),
            "full" => Ok(SyncMode::Full),
            other => Err(anyhow::anyhow!("invalid sync mode: {other}")),
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SyncMode::Incremental => "incremental",
            SyncMode::Full => "full",
        })
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ReconcileSummary {
    pub added: u64,
    pub removed: u64,
    pub unchanged: u64,
}

/// Reconcile the reported list into ownership-edge mutations for `user_id`.
///
/// Per tuple: exact-match the normalized name against existing Games and
/// upsert the edge, else create the Game with the reporter's spelling as
/// `canonical_name`. Malformed tuples are dropped (caller contract
/// violation, not user-facing); duplicate tuples collapse to one mutation.
pub async fn reconcile_user_library(
    db: &Db,
    user_id: &str,
    reported: &[ReportedGame],
    mode: SyncMode,
) -> Result<ReconcileSummary> {
    let mut summary = ReconcileSummary::default();

    // Dedup and validate up front; key by (normalized name, platform).
    let mut target: HashMap<(String, PlatformTag), &str> = HashMap::new();
    for item in reported {
        let key = name::exact_match_key(&item.name);
        if key.is_empty() {
            debug!(user_id, raw_name = %item.name, "dropping tuple with empty normalized name");
            continue;
        }
        let platform = match item.platform.parse::<PlatformTag>() {
            Ok(p) => p,
            Err(err) => {
                debug!(user_id, raw_name = %item.name, error = %err, "dropping tuple with bad platform");
                continue;
            }
        };
        target.entry((key, platform)).or_insert(item.name.as_str());
    }

    // Additions: create-if-absent (atomic on normalized_name), then upsert
    // the user's edges in bulk.
    let mut target_keys: HashSet<String> = HashSet::with_capacity(target.len());
    let mut pairs: Vec<(i64, PlatformTag)> = Vec::with_capacity(target.len());
    for ((key, platform), raw_name) in &target {
        let game_id = index::ensure_game(db, raw_name, key).await?;
        pairs.push((game_id, *platform));
        target_keys.insert(key.clone());
    }
    summary.added = index::upsert_owner_bulk(db, user_id, &pairs).await?;
    summary.unchanged = pairs.len() as u64 - summary.added;

    // Removals: full resync only. Diff the user's current edges across the
    // whole catalog against the normalized target set.
    if mode == SyncMode::Full {
        for (game_id, normalized) in index::edges_for_user(db, user_id).await? {
            if !target_keys.contains(&normalized) && index::remove_owner(db, game_id, user_id).await? {
                summary.removed += 1;
            }
        }
    }

    info!(
        user_id,
        mode = %mode,
        added = summary.added,
        removed = summary.removed,
        unchanged = summary.unchanged,
        "library reconciled"
    );
    Ok(summary)
}
