// API request/response models (DTOs)

use serde::{Deserialize, Serialize};

/// Body of `POST /batch-search`. The legacy client sent `ingredients`;
/// newer callers send `terms`. Either is accepted.
#[derive(Debug, Deserialize)]
pub struct BatchSearchRequest {
    #[serde(default)]
    pub terms: Option<Vec<String>>,
    #[serde(default)]
    pub ingredients: Option<Vec<String>>,
    #[serde(default, rename = "locationId")]
    pub location_id: Option<String>,
}

impl BatchSearchRequest {
    /// The effective term list, `terms` winning over `ingredients`.
    pub fn term_list(&self) -> Option<&[String]> {
        self.terms
            .as_deref()
            .or(self.ingredients.as_deref())
    }
}

/// Query for `GET /products`. Friendly names and the upstream `filter.*`
/// spellings are both accepted.
#[derive(Debug, Deserialize)]
pub struct ProductQuery {
    #[serde(default, alias = "filter.term")]
    pub term: Option<String>,
    #[serde(default, rename = "locationId", alias = "filter.locationId")]
    pub location_id: Option<String>,
    #[serde(default, alias = "filter.limit")]
    pub limit: Option<u32>,
    /// Dev convenience: bearer via query instead of header.
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub cache_entries: usize,
    pub token_scopes: usize,
}

/// Masked credential-presence diagnostics for `/env-check`. Previews show at
/// most the first and last 4 characters; raw secrets never appear.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvCheckResponse {
    pub has_id: bool,
    pub has_secret: bool,
    pub id_preview: Option<String>,
    pub secret_preview: Option<String>,
    pub scope_raw: String,
    pub scope_effective: String,
    pub using_vite_vars: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_request_accepts_both_spellings() {
        let legacy: BatchSearchRequest =
            serde_json::from_str(r#"{"ingredients": ["milk"], "locationId": "S1"}"#).unwrap();
        assert_eq!(legacy.term_list(), Some(&["milk".to_string()][..]));
        assert_eq!(legacy.location_id.as_deref(), Some("S1"));

        let current: BatchSearchRequest =
            serde_json::from_str(r#"{"terms": ["eggs"]}"#).unwrap();
        assert_eq!(current.term_list(), Some(&["eggs".to_string()][..]));

        let neither: BatchSearchRequest = serde_json::from_str("{}").unwrap();
        assert!(neither.term_list().is_none());
    }

    #[test]
    fn product_query_accepts_filter_aliases() {
        let q: ProductQuery = serde_json::from_str(
            r#"{"filter.term": "milk", "filter.locationId": "S1", "filter.limit": 5}"#,
        )
        .unwrap();
        assert_eq!(q.term.as_deref(), Some("milk"));
        assert_eq!(q.location_id.as_deref(), Some("S1"));
        assert_eq!(q.limit, Some(5));
    }
}
