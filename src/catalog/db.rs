use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    SqlitePool,
};
use tracing::{info, instrument};

/// Shared connection handle for the catalog store.
#[derive(Clone)]
pub struct Db {
    pub pool: SqlitePool,
}

/// Idempotent schema statements, applied in order on every connect.
/// Plain `IF NOT EXISTS` runner; the schema is small enough that a
/// versioned migration table would be overhead.
const SCHEMA: [&str; 5] = [
    "CREATE TABLE IF NOT EXISTS games (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        canonical_name   TEXT NOT NULL,
        normalized_name  TEXT NOT NULL UNIQUE,
        enrichment_state TEXT NOT NULL DEFAULT 'unset'
                         CHECK (enrichment_state IN ('unset','enriched','failed')),
        external_id      INTEGER,
        description      TEXT,
        genres           TEXT,
        platforms        TEXT,
        game_modes       TEXT,
        rating           REAL,
        artwork_url      TEXT,
        release_date     TEXT,
        videos           TEXT,
        publishers       TEXT,
        canonical_url    TEXT,
        created_at       TEXT NOT NULL,
        last_updated     TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS game_owners (
        game_id   INTEGER NOT NULL REFERENCES games(id) ON DELETE CASCADE,
        user_id   TEXT NOT NULL,
        platforms TEXT NOT NULL DEFAULT '[]',
        PRIMARY KEY (game_id, user_id)
    )",
    "CREATE TABLE IF NOT EXISTS user_profiles (
        user_id      TEXT PRIMARY KEY,
        display_name TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_games_state ON games(enrichment_state)",
    "CREATE INDEX IF NOT EXISTS idx_game_owners_user ON game_owners(user_id)",
];

impl Db {
    // SECURITY: never include raw DSNs in tracing spans (they may carry
    // credentials when pointed at remote engines).
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(10));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(connect_options)
            .await?;
        info!("connected to catalog db");

        Self::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// In-memory store for tests and throwaway tooling.
    pub async fn connect_memory() -> Result<Self> {
        let connect_options = SqliteConnectOptions::from_str("sqlite::memory:")?
            .foreign_keys(true);
        // A single connection keeps the :memory: database alive and shared.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(connect_options)
            .await?;
        Self::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    async fn run_migrations(pool: &SqlitePool) -> Result<()> {
        for stmt in SCHEMA {
            sqlx::query(stmt).execute(pool).await?;
        }
        Ok(())
    }
}
