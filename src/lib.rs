pub mod api;
pub mod config;
pub mod kroger;
pub mod normalization;
pub mod tracing;

pub mod util {
    pub mod env;
    pub mod retry;
}
