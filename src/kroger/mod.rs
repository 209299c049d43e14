//! Kroger upstream integration: token lifecycle, product search, batch
//! aggregation, price cache, and store lookup.

pub mod batch;
pub mod cache;
pub mod locations;
pub mod resolver;
pub mod token;

use serde_json::{json, Value};

/// A raw upstream reply: HTTP status plus the parsed body. Non-JSON bodies
/// are wrapped as structured data instead of failing, so callers can always
/// pass something useful through.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    pub body: Value,
}

impl UpstreamResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Read a reqwest response into an `UpstreamResponse`, wrapping non-JSON
/// bodies as `{"error":"non_json_response","raw":<text>}`.
pub(crate) async fn read_upstream(resp: reqwest::Response) -> UpstreamResponse {
    let status = resp.status().as_u16();
    let raw = resp.text().await.unwrap_or_default();
    let body = if raw.is_empty() {
        json!({})
    } else {
        serde_json::from_str(&raw).unwrap_or_else(|_| json!({ "error": "non_json_response", "raw": raw }))
    };
    UpstreamResponse { status, body }
}
