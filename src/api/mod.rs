// API module for the grocer-proxy HTTP server
// Exposes the token/products/locations/batch-search proxy routes

pub mod auth;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;

pub use server::ApiServer;
