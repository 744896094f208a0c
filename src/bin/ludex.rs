use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use ludex::catalog::db::Db;
use ludex::catalog::reconcile::{self, ReportedGame, SyncMode};
use ludex::catalog::search::{self, SearchFilters, SortDir, SortKey};
use ludex::catalog::index;
use ludex::enrichment::igdb::IgdbProvider;
use ludex::enrichment::scheduler::{self, EnrichConfig, EnrichmentScheduler};
use ludex::util::env as env_util;

#[derive(Parser, Debug)]
#[command(name = "ludex", version, about = "Ludex catalog admin CLI")]
struct Cli {
    /// Optional override for the database URL
    #[arg(long, global = true)]
    db_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Commands {
    /// Reconcile a user's library from a JSON tuple file ([{name, platform}, ..])
    Sync {
        #[arg(long)]
        user_id: String,
        /// Path to the normalized tuple list emitted by a library parser
        #[arg(long)]
        file: PathBuf,
        /// incremental (add-only) or full (authoritative resync)
        #[arg(long, default_value = "incremental")]
        mode: String,
    },
    /// Run one enrichment batch against the metadata provider
    Enrich {
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Reset failed games to unset so the next batch retries them
    RestoreFailed,
    /// Quick catalog search printout
    Search {
        query: String,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Print row counts for the catalog tables
    DbCounts,
}

async fn open_db(db_url: Option<String>) -> Result<Db> {
    let url = db_url.unwrap_or_else(env_util::db_url);
    let max_connections: u32 = env_util::env_parse("DB_MAX_CONNS", 5u32);
    Db::connect(&url, max_connections).await
}

#[tokio::main]
async fn main() -> Result<()> {
    ludex::tracing::init_tracing("info,sqlx=warn")?;
    env_util::init_env();

    let cli = Cli::parse();
    let db = open_db(cli.db_url).await?;

    match cli.command {
        Commands::Sync {
            user_id,
            file,
            mode,
        } => {
            let mode = mode.parse::<SyncMode>()?;
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let reported: Vec<ReportedGame> =
                serde_json::from_str(&raw).context("parsing tuple file")?;
            let summary =
                reconcile::reconcile_user_library(&db, user_id.trim(), &reported, mode).await?;
            println!(
                "sync complete: added={} removed={} unchanged={}",
                summary.added, summary.removed, summary.unchanged
            );
        }
        Commands::Enrich { batch_size } => {
            let provider = IgdbProvider::new_from_env()?;
            let sched = EnrichmentScheduler::new(provider, EnrichConfig::from_env());
            let report = sched.run_batch(&db, batch_size).await?;
            println!(
                "enrichment batch: scanned={} enriched={} failed={} rate_limited={}",
                report.scanned, report.enriched, report.failed, report.rate_limited
            );
        }
        Commands::RestoreFailed => {
            let restored = scheduler::restore_failed_games(&db).await?;
            println!("restored {restored} failed games");
        }
        Commands::Search { query, limit } => {
            let filters = SearchFilters {
                name: Some(query),
                ..Default::default()
            };
            let page =
                search::search(&db, &filters, SortKey::Name, SortDir::Asc, 1, limit).await?;
            for game in &page.games {
                println!(
                    "{:>6}  {:<48} owners={} rating={}",
                    game.id,
                    game.name,
                    game.owner_count,
                    game.rating
                        .map(|r| format!("{r:.1}"))
                        .unwrap_or_else(|| "-".into())
                );
            }
            println!(
                "page {}/{} ({} total)",
                page.pagination.page, page.pagination.total_pages, page.pagination.total
            );
        }
        Commands::DbCounts => {
            for (label, count) in index::table_counts(&db).await? {
                println!("{label:<20} {count}");
            }
        }
    }

    Ok(())
}
