// API server implementation using actix-web

use std::env;
use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};

use crate::api::routes;
use crate::catalog::db::Db;
use crate::enrichment::scheduler::DynScheduler;

pub struct ApiServer {
    pub host: String,
    pub port: u16,
    pub allowed_origins: String,
}

impl ApiServer {
    /// Create server from environment variables
    pub fn from_env() -> Result<Self> {
        crate::util::env::init_env();

        let host = env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("API_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .context("Invalid API_PORT")?;
        let allowed_origins =
            env::var("ALLOWED_ORIGINS").unwrap_or_else(|_| "http://localhost:3000".to_string());

        Ok(Self {
            host,
            port,
            allowed_origins,
        })
    }

    pub async fn run(self, db: Db, scheduler: Arc<DynScheduler>) -> Result<()> {
        let bind_addr = format!("{}:{}", self.host, self.port);
        tracing::info!(addr = %bind_addr, "starting api server");

        let allowed_origins = self.allowed_origins.clone();
        let db_data = web::Data::new(db);
        let sched_data = web::Data::from(scheduler);

        HttpServer::new(move || {
            let mut cors = Cors::default()
                .allowed_methods(["GET", "POST"])
                .allow_any_header()
                .max_age(3600);
            for origin in allowed_origins.split(',').map(str::trim) {
                if origin == "*" {
                    cors = cors.allow_any_origin();
                } else if !origin.is_empty() {
                    cors = cors.allowed_origin(origin);
                }
            }

            App::new()
                .wrap(cors)
                .app_data(db_data.clone())
                .app_data(sched_data.clone())
                .configure(routes::configure_routes)
        })
        .bind(&bind_addr)
        .with_context(|| format!("failed to bind {bind_addr}"))?
        .run()
        .await?;

        Ok(())
    }
}
