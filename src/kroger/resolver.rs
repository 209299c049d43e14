//! Product search against the upstream catalog and shaping of the top hit.

use super::{read_upstream, UpstreamResponse};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// One priced product, shaped from the first (most relevant) search result.
/// The system does not rank or offer alternatives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PricedProduct {
    pub product_id: String,
    pub description: String,
    pub brand: String,
    /// Promo price when one exists, regular price otherwise.
    pub price: f64,
    pub regular_price: f64,
    pub on_sale: bool,
    pub size: String,
    pub image_url: Option<String>,
    pub upc: String,
    /// Human-readable shelf location, e.g. "Aisle 4 • Dairy • Bay 2".
    pub aisle: Option<String>,
    pub categories: Vec<String>,
}

/// Seam over the upstream product search so the batch layer is testable
/// without a network.
#[async_trait]
pub trait ProductSource: Send + Sync {
    async fn search(
        &self,
        term: &str,
        location_id: Option<&str>,
        limit: u32,
        bearer: &str,
    ) -> Result<UpstreamResponse>;
}

/// Real search client for `GET {api_base}/products`.
pub struct ProductResolver {
    http: reqwest::Client,
    api_base: String,
}

impl ProductResolver {
    pub fn new(api_base: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("grocer-proxy/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            api_base: api_base.into(),
        })
    }
}

#[async_trait]
impl ProductSource for ProductResolver {
    /// HTTP errors from upstream are not a failure here: the status and body
    /// are carried upward unchanged. Only transport errors return `Err`.
    async fn search(
        &self,
        term: &str,
        location_id: Option<&str>,
        limit: u32,
        bearer: &str,
    ) -> Result<UpstreamResponse> {
        let url = format!("{}/products", self.api_base);
        let limit = limit.to_string();
        let mut req = self
            .http
            .get(&url)
            .bearer_auth(bearer)
            .header("Accept", "application/json")
            .query(&[("filter.term", term), ("filter.limit", limit.as_str())]);
        if let Some(loc) = location_id {
            req = req.query(&[("filter.locationId", loc)]);
        }
        let resp = req.send().await?;
        Ok(read_upstream(resp).await)
    }
}

fn str_or_empty(v: &Value, key: &str) -> String {
    v.get(key).and_then(Value::as_str).unwrap_or("").to_string()
}

/// Shape the first element of a product-search body into a `PricedProduct`.
/// Returns None when the result array is empty or absent. Every nested field
/// is optional upstream, so extraction defaults instead of failing.
pub fn shape_top_result(body: &Value) -> Option<PricedProduct> {
    let product = body.get("data")?.as_array()?.first()?;

    let first_item = product
        .get("items")
        .and_then(Value::as_array)
        .and_then(|a| a.first())
        .cloned()
        .unwrap_or(Value::Null);

    let regular = first_item
        .get("price")
        .and_then(|p| p.get("regular"))
        .and_then(Value::as_f64)
        .unwrap_or(0.0);
    let promo = first_item
        .get("price")
        .and_then(|p| p.get("promo"))
        .and_then(Value::as_f64)
        .filter(|p| *p > 0.0);

    let aisle_loc = product
        .get("items")
        .and_then(Value::as_array)
        .and_then(|a| a.first())
        .and_then(|i| i.get("aisleLocations"))
        .and_then(Value::as_array)
        .and_then(|a| a.first());
    let aisle = aisle_loc.and_then(aisle_text);

    let image_url = product
        .get("images")
        .and_then(Value::as_array)
        .and_then(|a| a.first())
        .and_then(|img| img.get("sizes"))
        .and_then(Value::as_array)
        .and_then(|a| a.first())
        .and_then(|s| s.get("url"))
        .and_then(Value::as_str)
        .map(|s| s.to_string());

    let categories = product
        .get("categories")
        .and_then(Value::as_array)
        .map(|a| {
            a.iter()
                .filter_map(Value::as_str)
                .map(|s| s.to_string())
                .collect()
        })
        .unwrap_or_default();

    Some(PricedProduct {
        product_id: str_or_empty(product, "productId"),
        description: str_or_empty(product, "description"),
        brand: str_or_empty(product, "brand"),
        price: promo.unwrap_or(regular),
        regular_price: regular,
        on_sale: promo.is_some(),
        size: first_item
            .get("size")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
        image_url,
        upc: str_or_empty(product, "upc"),
        aisle,
        categories,
    })
}

/// Join the optional aisle sub-fields into one display string, or None when
/// no part is present.
fn aisle_text(loc: &Value) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();
    if let Some(number) = loc.get("number").and_then(Value::as_str) {
        if !number.is_empty() {
            parts.push(format!("Aisle {number}"));
        }
    }
    if let Some(desc) = loc.get("description").and_then(Value::as_str) {
        if !desc.is_empty() {
            parts.push(desc.to_string());
        }
    }
    if let Some(bay) = loc.get("bayNumber").and_then(Value::as_str) {
        if !bay.is_empty() {
            parts.push(format!("Bay {bay}"));
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" \u{2022} "))
    }
}
