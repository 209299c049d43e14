// API route configuration

use crate::api::handlers;
use actix_web::web;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg
        // Health check (no auth required)
        .route("/health", web::get().to(handlers::health_check))
        .route("/", web::get().to(handlers::health_check))
        // Token exchange accepts GET for parity with the serverless shims
        .route("/token", web::post().to(handlers::token))
        .route("/token", web::get().to(handlers::token))
        // Proxied upstream reads (bearer required)
        .route("/products", web::get().to(handlers::products))
        .route("/locations", web::get().to(handlers::locations))
        // Batched ingredient resolution
        .route("/batch-search", web::post().to(handlers::batch_search))
        // Debug-only masked diagnostics
        .route("/env-check", web::get().to(handlers::env_check));
}
