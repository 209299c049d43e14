//! Service configuration, sourced from environment variables.
//!
//! Everything tunable lives in one constructed value that gets injected into
//! the components; there is no module-level global state.

use crate::normalization::scope::{normalize_scope, DEFAULT_SCOPE};
use crate::util::env::{env_flag, env_opt, env_parse};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_AUTH_URL: &str = "https://api.kroger.com/v1/connect/oauth2/token";
pub const DEFAULT_API_BASE: &str = "https://api.kroger.com/v1";

/// Bounds on the batch worker pool. The upstream rate limits make anything
/// above 5 counterproductive.
pub const MIN_BATCH_CONCURRENCY: usize = 1;
pub const MAX_BATCH_CONCURRENCY: usize = 5;

#[derive(Debug, Clone)]
pub struct KrogerConfig {
    /// OAuth client credentials. Optional at startup so the process can boot
    /// and report a clean error per-request, but required for token exchange.
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Normalized default scope for server-side token acquisition.
    pub scope: String,
    pub auth_url: String,
    pub api_base: String,
    /// Per-upstream-request timeout inside the batch pool.
    pub request_timeout: Duration,
    /// Wall-clock deadline for a whole batch call.
    pub batch_deadline: Duration,
    /// Worker pool size, clamped to 1..=5.
    pub batch_concurrency: usize,
    pub cache_ttl: Duration,
    pub cache_max_entries: usize,
    /// JSON file the price cache persists to; None keeps it memory-only.
    pub cache_path: Option<PathBuf>,
    /// Enables the masked /env-check diagnostics route.
    pub debug_env_check: bool,
}

impl KrogerConfig {
    pub fn from_env() -> Self {
        crate::util::env::init_env();

        let client_id = env_opt("KROGER_CLIENT_ID").or_else(|| env_opt("VITE_KROGER_CLIENT_ID"));
        let client_secret =
            env_opt("KROGER_CLIENT_SECRET").or_else(|| env_opt("VITE_KROGER_CLIENT_SECRET"));

        let scope = normalize_scope(&env_opt("KROGER_SCOPE").unwrap_or_else(|| DEFAULT_SCOPE.into()));

        let concurrency: usize = env_parse("KROGER_BATCH_CONCURRENCY", 3usize)
            .clamp(MIN_BATCH_CONCURRENCY, MAX_BATCH_CONCURRENCY);

        Self {
            client_id,
            client_secret,
            scope,
            auth_url: env_opt("KROGER_AUTH_URL").unwrap_or_else(|| DEFAULT_AUTH_URL.into()),
            api_base: env_opt("KROGER_API_BASE")
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_API_BASE.into()),
            request_timeout: Duration::from_millis(env_parse("KROGER_REQ_TIMEOUT_MS", 2500u64)),
            batch_deadline: Duration::from_millis(env_parse("KROGER_BATCH_DEADLINE_MS", 6500u64)),
            batch_concurrency: concurrency,
            cache_ttl: Duration::from_secs(env_parse("PRICE_CACHE_TTL_SECS", 900u64)),
            cache_max_entries: env_parse("PRICE_CACHE_MAX_ENTRIES", 500usize),
            cache_path: env_opt("PRICE_CACHE_PATH").map(PathBuf::from),
            debug_env_check: env_flag("KROGER_DEBUG", false),
        }
    }

    pub fn has_credentials(&self) -> bool {
        self.client_id.is_some() && self.client_secret.is_some()
    }
}
