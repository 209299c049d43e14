// HTTP request handlers for the proxy endpoints

use crate::api::auth::bearer_token;
use crate::api::models::*;
use crate::api::server::AppState;
use crate::kroger::locations::upstream_location_params;
use crate::kroger::resolver::ProductSource;
use crate::kroger::token::exchange_passthrough;
use crate::kroger::UpstreamResponse;
use crate::util::env::{env_opt, mask_preview};
use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse, Result};
use serde_json::json;
use std::collections::BTreeMap;

fn passthrough(upstream: UpstreamResponse) -> HttpResponse {
    let status = StatusCode::from_u16(upstream.status).unwrap_or(StatusCode::BAD_GATEWAY);
    HttpResponse::build(status).json(upstream.body)
}

fn missing_bearer() -> HttpResponse {
    HttpResponse::Unauthorized().json(json!({
        "error": "Missing Authorization: Bearer <token>"
    }))
}

/// Health check endpoint (no auth)
pub async fn health_check(state: web::Data<AppState>) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        cache_entries: state.cache.len(),
        token_scopes: state.broker.as_ref().map(|b| b.cached_scopes()).unwrap_or(0),
    }))
}

/// POST|GET /token — direct upstream token exchange, status passthrough.
/// The only place besides the broker that touches the client secret.
pub async fn token(state: web::Data<AppState>) -> Result<HttpResponse> {
    let (Some(id), Some(secret)) = (
        state.config.client_id.as_deref(),
        state.config.client_secret.as_deref(),
    ) else {
        return Ok(HttpResponse::InternalServerError().json(json!({
            "error": "Missing KROGER_CLIENT_ID / KROGER_CLIENT_SECRET on server"
        })));
    };

    match exchange_passthrough(
        &state.http,
        &state.config.auth_url,
        id,
        secret,
        &state.config.scope,
    )
    .await
    {
        Ok(upstream) => Ok(passthrough(upstream)),
        Err(e) => {
            tracing::error!(error = %e, "token exchange transport failure");
            Ok(HttpResponse::InternalServerError().json(json!({ "error": e.to_string() })))
        }
    }
}

/// GET /products — authenticated product search, status passthrough.
pub async fn products(
    req: HttpRequest,
    query: web::Query<ProductQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let Some(bearer) = bearer_token(&req, query.token.as_deref()) else {
        return Ok(missing_bearer());
    };
    let term = query.term.as_deref().unwrap_or("");
    let limit = query.limit.unwrap_or(10);

    match state
        .resolver
        .search(term, query.location_id.as_deref(), limit, &bearer)
        .await
    {
        Ok(upstream) => Ok(passthrough(upstream)),
        Err(e) => {
            tracing::warn!(error = %e, "product search transport failure");
            Ok(HttpResponse::BadGateway().json(json!({ "error": e.to_string() })))
        }
    }
}

/// GET /locations — authenticated store lookup, status passthrough.
pub async fn locations(
    req: HttpRequest,
    query: web::Query<BTreeMap<String, String>>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let Some(bearer) = bearer_token(&req, query.get("token").map(String::as_str)) else {
        return Ok(missing_bearer());
    };
    let params = upstream_location_params(&query);

    match state.locator.query(&params, &bearer).await {
        Ok(upstream) => Ok(passthrough(upstream)),
        Err(e) => {
            tracing::warn!(error = %e, "locations transport failure");
            Ok(HttpResponse::BadGateway().json(json!({ "error": e.to_string() })))
        }
    }
}

/// POST /batch-search — resolve many ingredient terms to priced products.
///
/// Uses the caller's bearer when one is presented, otherwise acquires a
/// server-side token through the broker. A missing `locationId` is allowed;
/// the batch proceeds without a location filter.
pub async fn batch_search(
    req: HttpRequest,
    payload: web::Json<BatchSearchRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let Some(terms) = payload.term_list() else {
        return Ok(HttpResponse::BadRequest().json(json!({ "error": "Invalid ingredients array" })));
    };

    let bearer = match bearer_token(&req, None) {
        Some(b) => b,
        None => {
            let Some(broker) = &state.broker else {
                return Ok(HttpResponse::InternalServerError().json(json!({
                    "error": "Missing KROGER_CLIENT_ID / KROGER_CLIENT_SECRET on server"
                })));
            };
            match broker.get_token(&state.config.scope).await {
                Ok(token) => token.value,
                // Token acquisition is a precondition for every term; its
                // failure fails the whole batch.
                Err(e) => {
                    let status = StatusCode::from_u16(e.status.unwrap_or(502))
                        .unwrap_or(StatusCode::BAD_GATEWAY);
                    return Ok(HttpResponse::build(status)
                        .json(json!({ "error": "token_acquisition_failed", "detail": e.to_string() })));
                }
            }
        }
    };

    tracing::info!(
        terms = terms.len(),
        location = payload.location_id.as_deref().unwrap_or("none"),
        "batch search requested"
    );

    let results = state
        .aggregator
        .resolve_many(terms, payload.location_id.as_deref(), &bearer)
        .await;

    Ok(HttpResponse::Ok().json(results))
}

/// GET /env-check — masked credential diagnostics, gated by KROGER_DEBUG.
pub async fn env_check(state: web::Data<AppState>) -> Result<HttpResponse> {
    if !state.config.debug_env_check {
        return Ok(HttpResponse::NotFound().json(json!({ "error": "Not found" })));
    }
    let scope_raw = env_opt("KROGER_SCOPE").unwrap_or_else(|| state.config.scope.clone());
    Ok(HttpResponse::Ok().json(EnvCheckResponse {
        has_id: state.config.client_id.is_some(),
        has_secret: state.config.client_secret.is_some(),
        id_preview: state
            .config
            .client_id
            .as_deref()
            .and_then(mask_preview),
        secret_preview: state
            .config
            .client_secret
            .as_deref()
            .and_then(mask_preview),
        scope_effective: state.config.scope.clone(),
        scope_raw,
        using_vite_vars: env_opt("VITE_KROGER_CLIENT_ID").is_some()
            || env_opt("VITE_KROGER_CLIENT_SECRET").is_some(),
    }))
}
