// API server implementation using actix-web

use crate::api::{middleware, routes};
use crate::config::KrogerConfig;
use crate::kroger::batch::{BatchAggregator, BatchConfig};
use crate::kroger::cache::PriceCache;
use crate::kroger::locations::StoreLocator;
use crate::kroger::resolver::ProductResolver;
use crate::kroger::token::{HttpTokenFetcher, TokenBroker};
use crate::util::retry::RetryPolicy;
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use std::env;
use std::sync::Arc;
use std::time::Duration;

/// Shared per-process state handed to every handler. The token and price
/// caches are best-effort; an empty cache on cold start is always legal.
pub struct AppState {
    pub config: KrogerConfig,
    /// None when no client credentials are configured; routes that need a
    /// server-side token then answer with a clean 500.
    pub broker: Option<TokenBroker>,
    pub resolver: Arc<ProductResolver>,
    pub aggregator: BatchAggregator,
    pub locator: StoreLocator,
    pub cache: Arc<PriceCache>,
    /// Client for the /token passthrough exchange.
    pub http: reqwest::Client,
}

pub struct ApiServer {
    pub host: String,
    pub port: u16,
    pub allowed_origins: String,
    pub config: KrogerConfig,
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

        let allowed_origins = env::var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173,http://localhost:3000".to_string());

        Ok(Self {
            host,
            port,
            allowed_origins,
            config: KrogerConfig::from_env(),
        })
    }

    fn build_state(config: KrogerConfig) -> Result<AppState> {
        let cache = Arc::new(PriceCache::new(
            config.cache_ttl,
            config.cache_max_entries,
            config.cache_path.clone(),
        ));

        let resolver = Arc::new(ProductResolver::new(
            &config.api_base,
            Duration::from_secs(15),
        )?);

        let aggregator = BatchAggregator::new(
            resolver.clone(),
            cache.clone(),
            BatchConfig {
                concurrency: config.batch_concurrency,
                per_request_timeout: config.request_timeout,
                deadline: config.batch_deadline,
            },
        );

        let broker = match (&config.client_id, &config.client_secret) {
            (Some(id), Some(secret)) => Some(TokenBroker::new(
                Arc::new(HttpTokenFetcher::new(
                    config.auth_url.clone(),
                    id.clone(),
                    secret.clone(),
                )?),
                RetryPolicy::default(),
            )),
            _ => {
                tracing::warn!(
                    "KROGER_CLIENT_ID / KROGER_CLIENT_SECRET not set; \
                     token-dependent routes will report the missing credentials"
                );
                None
            }
        };

        let locator = StoreLocator::new(&config.api_base, Duration::from_secs(15))?;

        let http = reqwest::Client::builder()
            .user_agent(concat!("grocer-proxy/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(15))
            .build()?;

        Ok(AppState {
            config,
            broker,
            resolver,
            aggregator,
            locator,
            cache,
            http,
        })
    }

    /// Start the HTTP server
    pub async fn run(self) -> Result<()> {
        let bind_addr = format!("{}:{}", self.host, self.port);

        crate::util::env::preflight_check(
            "api_server",
            &[],
            &[
                "KROGER_CLIENT_ID",
                "KROGER_CLIENT_SECRET",
                "KROGER_SCOPE",
                "KROGER_API_BASE",
                "KROGER_BATCH_CONCURRENCY",
                "PRICE_CACHE_PATH",
            ],
        )?;

        tracing::info!(
            host = %self.host,
            port = %self.port,
            concurrency = self.config.batch_concurrency,
            "Starting grocer-proxy API server"
        );

        let state = web::Data::new(Self::build_state(self.config)?);
        let allowed_origins = self.allowed_origins.clone();

        HttpServer::new(move || {
            let (logger, compress) = middleware::setup_middleware();
            let cors = middleware::setup_cors(&allowed_origins);

            App::new()
                .app_data(state.clone())
                .wrap(logger)
                .wrap(compress)
                .wrap(cors)
                .configure(routes::configure_routes)
        })
        .bind(&bind_addr)
        .with_context(|| format!("Failed to bind to {}", bind_addr))?
        .run()
        .await
        .context("HTTP server error")?;

        Ok(())
    }
}
