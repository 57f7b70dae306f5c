//! FRED API proxy helpers.

use std::collections::BTreeMap;

use url::Url;

use crate::error::{MacroError, Result};

/// FRED REST API base.
pub const FRED_API_BASE: &str = "https://api.stlouisfed.org/fred";

/// Query parameter naming the FRED path to proxy.
pub const ENDPOINT_PARAM: &str = "_endpoint";

/// Parameters the proxy always sets itself.
const RESERVED_PARAMS: [&str; 2] = ["api_key", "file_type"];

/// API key for FRED. Redacted in `Debug`.
#[derive(Clone)]
pub struct FredApiKey(String);

impl FredApiKey {
    pub fn new(key: impl Into<String>) -> Option<Self> {
        let key = key.into();
        (!key.is_empty()).then_some(Self(key))
    }
}

impl std::fmt::Debug for FredApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FredApiKey([REDACTED])")
    }
}

/// Accept only plain relative paths such as `series/observations`.
pub fn validate_endpoint(endpoint: &str) -> Result<&str> {
    let valid = !endpoint.is_empty()
        && !endpoint.starts_with('/')
        && endpoint
            .split('/')
            .all(|seg| !seg.is_empty() && seg != "." && seg != "..")
        && endpoint
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '_' | '-'));
    if valid {
        Ok(endpoint)
    } else {
        Err(MacroError::Config(format!("invalid FRED endpoint: {endpoint:?}")))
    }
}

/// Caller parameters minus the ones the proxy controls.
pub fn forwarded_params(params: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    params
        .iter()
        .filter(|(k, _)| k.as_str() != ENDPOINT_PARAM && !RESERVED_PARAMS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Stable cache key: endpoint plus parameters in sorted order.
pub fn cache_key(endpoint: &str, params: &BTreeMap<String, String>) -> String {
    let query = params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    format!("fred_{endpoint}?{query}")
}

/// Full upstream URL including the API key.
pub fn request_url(
    base: &str,
    endpoint: &str,
    params: &BTreeMap<String, String>,
    api_key: &FredApiKey,
) -> Result<Url> {
    let mut url = Url::parse(&format!("{}/{}", base.trim_end_matches('/'), endpoint))
        .map_err(|e| MacroError::Config(format!("invalid FRED URL: {e}")))?;
    url.query_pairs_mut()
        .extend_pairs(params.iter())
        .append_pair("api_key", &api_key.0)
        .append_pair("file_type", "json");
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_validate_endpoint() {
        assert!(validate_endpoint("series/observations").is_ok());
        assert!(validate_endpoint("series").is_ok());
        assert!(validate_endpoint("").is_err());
        assert!(validate_endpoint("/series").is_err());
        assert!(validate_endpoint("series/../../etc").is_err());
        assert!(validate_endpoint("https://evil.example").is_err());
        assert!(validate_endpoint("series//x").is_err());
    }

    #[test]
    fn test_cache_key_sorted_and_reserved_dropped() {
        let raw = params(&[
            ("series_id", "UNRATE"),
            ("_endpoint", "series/observations"),
            ("api_key", "stolen"),
            ("limit", "12"),
        ]);
        let forwarded = forwarded_params(&raw);
        assert_eq!(
            cache_key("series/observations", &forwarded),
            "fred_series/observations?limit=12&series_id=UNRATE"
        );
    }

    #[test]
    fn test_request_url_adds_key_and_format() {
        let key = FredApiKey::new("k123").unwrap();
        let url = request_url(
            "https://fred.example/fred/",
            "series/observations",
            &params(&[("series_id", "CPIAUCSL")]),
            &key,
        )
        .unwrap();
        assert_eq!(url.path(), "/fred/series/observations");
        assert_eq!(
            url.query(),
            Some("series_id=CPIAUCSL&api_key=k123&file_type=json")
        );
    }

    #[test]
    fn test_key_redacted_and_empty_rejected() {
        assert!(FredApiKey::new("").is_none());
        let key = FredApiKey::new("secret").unwrap();
        assert!(!format!("{key:?}").contains("secret"));
    }
}
