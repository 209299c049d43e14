// HTTP API server binary for grocer-proxy
// Exposes the Kroger token/products/locations/batch-search proxy

use anyhow::Result;
use grocer_proxy::api::ApiServer;
use grocer_proxy::util::env as env_util;

#[actix_web::main]
async fn main() -> Result<()> {
    grocer_proxy::tracing::init_tracing("info")?;

    // Load dotenv/env once (safe to call multiple times)
    env_util::init_env();

    let server = ApiServer::from_env()?;
    server.run().await?;

    Ok(())
}
