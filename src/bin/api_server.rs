// HTTP API server binary for the ludex catalog engine.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use ludex::api::ApiServer;
use ludex::catalog::db::Db;
use ludex::enrichment::igdb::IgdbProvider;
use ludex::enrichment::provider::MetadataProvider;
use ludex::enrichment::scheduler::{DynScheduler, EnrichConfig, EnrichmentScheduler};
use ludex::util::env as env_util;

#[actix_web::main]
async fn main() -> Result<()> {
    ludex::tracing::init_tracing("info,sqlx=warn")?;

    env_util::init_env();
    let server = ApiServer::from_env()?;

    let database_url = env_util::db_url();
    let max_connections: u32 = env_util::env_parse("DB_MAX_CONNS", 10u32);
    let db = Db::connect(&database_url, max_connections).await?;

    let provider: Box<dyn MetadataProvider> = Box::new(IgdbProvider::new_from_env()?);
    let scheduler: Arc<DynScheduler> =
        Arc::new(EnrichmentScheduler::new(provider, EnrichConfig::from_env()));

    // Optional background enrichment loop; a batch interval of 0 disables it.
    let interval_secs: u64 = env_util::env_parse("ENRICH_INTERVAL_SECS", 0u64);
    if interval_secs > 0 {
        let loop_db = db.clone();
        let loop_sched = scheduler.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
            loop {
                ticker.tick().await;
                match loop_sched.run_batch(&loop_db, None).await {
                    Ok(report) => {
                        if report.rate_limited {
                            tracing::warn!(
                                scanned = report.scanned,
                                "scheduled enrichment paused by provider rate limit"
                            );
                        }
                    }
                    Err(e) => tracing::error!(error = %e, "scheduled enrichment run failed"),
                }
            }
        });
        tracing::info!(interval_secs, "background enrichment loop enabled");
    }

    server.run(db, scheduler).await?;
    Ok(())
}
