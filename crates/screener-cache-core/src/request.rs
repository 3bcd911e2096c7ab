//! Request and response model shared by the stores, the network layer and
//! the controller.

use bytes::Bytes;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{CacheError, Result};

/// Why a request was issued, as far as the controller cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestMode {
    /// Loading a full page. Eligible for the offline root-page fallback.
    Navigate,
    SameOrigin,
    NoCors,
    Cors,
}

impl RequestMode {
    /// Parse a `Sec-Fetch-Mode` header value.
    pub fn from_fetch_mode(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "navigate" => Some(RequestMode::Navigate),
            "same-origin" => Some(RequestMode::SameOrigin),
            "no-cors" => Some(RequestMode::NoCors),
            "cors" => Some(RequestMode::Cors),
            _ => None,
        }
    }
}

impl Default for RequestMode {
    fn default() -> Self {
        RequestMode::NoCors
    }
}

/// An outgoing request as seen by the controller.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    pub url: Url,
    pub mode: RequestMode,
    /// Headers forwarded upstream, in arrival order.
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl FetchRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            mode: RequestMode::default(),
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// A plain GET sub-resource request.
    pub fn get(url: &str) -> Result<Self> {
        Ok(Self::new(Method::GET, parse_url(url)?))
    }

    /// A GET page navigation.
    pub fn navigate(url: &str) -> Result<Self> {
        Ok(Self::get(url)?.with_mode(RequestMode::Navigate))
    }

    pub fn with_mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn is_get(&self) -> bool {
        self.method == Method::GET
    }

    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }

    /// Normalized cache key: method plus URL without its fragment.
    pub fn cache_key(&self) -> String {
        cache_key(&self.method, &self.url)
    }
}

/// Build the key a response is stored under.
pub fn cache_key(method: &Method, url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    format!("{} {}", method.as_str(), url)
}

fn parse_url(url: &str) -> Result<Url> {
    Url::parse(url).map_err(|e| CacheError::InvalidUrl {
        url: url.to_string(),
        message: e.to_string(),
    })
}

/// A response captured from the network or read back from a namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedResponse {
    pub status: u16,
    /// Response headers, in the order they were received.
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl CapturedResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// HTTP-OK: any 2xx status. Only these are ever persisted.
    pub fn ok(&self) -> bool {
        (200..=299).contains(&self.status)
    }

    /// First header value matching `name`, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_drops_fragment() {
        let request = FetchRequest::get("https://screener.example.com/results.json#top").unwrap();
        assert_eq!(
            request.cache_key(),
            "GET https://screener.example.com/results.json"
        );
    }

    #[test]
    fn test_cache_key_keeps_query() {
        let request = FetchRequest::get("https://screener.example.com/charts/AAPL.json?t=1").unwrap();
        assert_eq!(
            request.cache_key(),
            "GET https://screener.example.com/charts/AAPL.json?t=1"
        );
    }

    #[test]
    fn test_navigate_sets_mode() {
        let request = FetchRequest::navigate("https://screener.example.com/").unwrap();
        assert!(request.is_navigation());
        assert!(request.is_get());
    }

    #[test]
    fn test_fetch_mode_parsing() {
        assert_eq!(RequestMode::from_fetch_mode("navigate"), Some(RequestMode::Navigate));
        assert_eq!(RequestMode::from_fetch_mode("NO-CORS"), Some(RequestMode::NoCors));
        assert_eq!(RequestMode::from_fetch_mode("websocket"), None);
    }

    #[test]
    fn test_response_ok_range() {
        assert!(CapturedResponse::new(200, "x").ok());
        assert!(CapturedResponse::new(204, "").ok());
        assert!(!CapturedResponse::new(304, "").ok());
        assert!(!CapturedResponse::new(404, "").ok());
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let response = CapturedResponse::new(200, "{}").with_header("Content-Type", "application/json");
        assert_eq!(response.header("content-type"), Some("application/json"));
        assert_eq!(response.header("etag"), None);
    }

    #[test]
    fn test_invalid_url_rejected() {
        assert!(matches!(
            FetchRequest::get("not a url"),
            Err(CacheError::InvalidUrl { .. })
        ));
    }
}
