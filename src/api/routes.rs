// API route configuration

use actix_web::web;

use crate::api::handlers;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg
        // Health check
        .route("/health", web::get().to(handlers::health_check))
        .route("/", web::get().to(handlers::health_check))
        .service(
            web::scope("/api/v1")
                // Catalog read path
                .route("/games", web::get().to(handlers::search_games))
                .route("/games/filters", web::get().to(handlers::get_filter_options))
                .route("/games/{id}", web::get().to(handlers::get_game_details))
                // Ownership reconciliation
                .route("/library/sync", web::post().to(handlers::sync_library))
                // Enrichment control
                .route("/enrichment/run", web::post().to(handlers::run_enrichment))
                .route(
                    "/enrichment/restore",
                    web::post().to(handlers::restore_failed),
                ),
        );
}
