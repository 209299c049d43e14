//! Store lookup: maps friendly query names onto the upstream locations API
//! and passes the reply through unchanged.

use super::{read_upstream, UpstreamResponse};
use anyhow::Result;
use std::collections::BTreeMap;
use std::time::Duration;

pub struct StoreLocator {
    http: reqwest::Client,
    api_base: String,
}

impl StoreLocator {
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

    pub async fn query(
        &self,
        params: &[(String, String)],
        bearer: &str,
    ) -> Result<UpstreamResponse> {
        let url = format!("{}/locations", self.api_base);
        let resp = self
            .http
            .get(&url)
            .bearer_auth(bearer)
            .header("Accept", "application/json")
            .query(params)
            .send()
            .await?;
        Ok(read_upstream(resp).await)
    }
}

/// Translate caller-facing query parameters into the upstream `filter.*`
/// vocabulary. Friendly names win; any raw `filter.*` pair is passed through
/// as-is, letting callers reach upstream filters this mapping does not know.
pub fn upstream_location_params(query: &BTreeMap<String, String>) -> Vec<(String, String)> {
    let get = |keys: &[&str]| -> Option<String> {
        keys.iter()
            .find_map(|k| query.get(*k).filter(|v| !v.is_empty()).cloned())
    };

    let mut params: Vec<(String, String)> = Vec::new();

    let lat = get(&["lat", "latitude"]);
    let lon = get(&["lon", "longitude"]);
    if let (Some(lat), Some(lon)) = (lat, lon) {
        params.push(("filter.latLong.near".into(), format!("{lat},{lon}")));
    }
    if let Some(zip) = get(&["zip", "postal", "filter.zipCode.near"]) {
        params.push(("filter.zipCode.near".into(), zip));
    }
    if let Some(radius) = get(&["radius", "filter.radiusInMiles"]) {
        params.push(("filter.radiusInMiles".into(), radius));
    }
    if let Some(limit) = get(&["limit", "filter.limit"]) {
        params.push(("filter.limit".into(), limit));
    }
    if let Some(chain) = get(&["chain", "filter.chain"]) {
        params.push(("filter.chain".into(), chain));
    }

    for (k, v) in query {
        if k.starts_with("filter.") && !params.iter().any(|(pk, _)| pk == k) {
            params.push((k.clone(), v.clone()));
        }
    }

    params
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn lat_lon_become_latlong_near() {
        let params = upstream_location_params(&query(&[
            ("lat", "39.30"),
            ("lon", "-84.43"),
            ("radius", "15"),
            ("limit", "50"),
        ]));
        assert!(params.contains(&("filter.latLong.near".into(), "39.30,-84.43".into())));
        assert!(params.contains(&("filter.radiusInMiles".into(), "15".into())));
        assert!(params.contains(&("filter.limit".into(), "50".into())));
    }

    #[test]
    fn zip_maps_to_zipcode_near() {
        let params = upstream_location_params(&query(&[("zip", "45202"), ("chain", "Kroger")]));
        assert!(params.contains(&("filter.zipCode.near".into(), "45202".into())));
        assert!(params.contains(&("filter.chain".into(), "Kroger".into())));
    }

    #[test]
    fn raw_filter_params_pass_through_without_duplication() {
        let params = upstream_location_params(&query(&[
            ("filter.zipCode.near", "45202"),
            ("filter.department", "09"),
        ]));
        assert_eq!(
            params
                .iter()
                .filter(|(k, _)| k == "filter.zipCode.near")
                .count(),
            1
        );
        assert!(params.contains(&("filter.department".into(), "09".into())));
    }

    #[test]
    fn lat_without_lon_is_ignored() {
        let params = upstream_location_params(&query(&[("lat", "39.30")]));
        assert!(params.is_empty());
    }
}
