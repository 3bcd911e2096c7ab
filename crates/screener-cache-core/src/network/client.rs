//! reqwest-backed fetcher.
//!
//! Forwards intercepted requests upstream and captures the full response.
//! Non-OK statuses are returned as responses; only transport failures
//! (DNS, refused connection, timeout) become errors.

use super::Fetcher;
use crate::config::NetworkConfig;
use crate::error::{CacheError, Result};
use crate::request::{CapturedResponse, FetchRequest};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Headers that describe a single connection and must not be forwarded.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

/// Whether a header belongs to one hop only.
pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| h.eq_ignore_ascii_case(name))
}

/// HTTP fetcher over a shared reqwest client.
pub struct HttpFetcher {
    client: Client,
    /// Default timeout for requests.
    timeout: Duration,
}

impl HttpFetcher {
    /// Create a fetcher with the default request timeout.
    pub fn new() -> Result<Self> {
        Self::with_timeout(NetworkConfig::REQUEST_TIMEOUT)
    }

    /// Create a fetcher with a custom request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(NetworkConfig::CONNECT_TIMEOUT)
            .user_agent(NetworkConfig::USER_AGENT)
            .build()
            .map_err(|e| CacheError::Network {
                message: format!("Failed to create HTTP client: {}", e),
                cause: Some(e.to_string()),
            })?;

        Ok(Self { client, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<CapturedResponse> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone());
        for (name, value) in &request.headers {
            if !is_hop_by_hop(name) {
                builder = builder.header(name.as_str(), value.as_str());
            }
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                CacheError::Timeout(self.timeout)
            } else {
                CacheError::Network {
                    message: format!("{} {} failed: {}", request.method, request.url, e),
                    cause: Some(e.to_string()),
                }
            }
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter(|(name, _)| !is_hop_by_hop(name.as_str()))
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();

        // A body cut off mid-transfer is a network failure, not a response.
        let body = response.bytes().await.map_err(|e| CacheError::Network {
            message: format!("Reading body of {} failed: {}", request.url, e),
            cause: Some(e.to_string()),
        })?;

        debug!("{} {} -> {}", request.method, request.url, status);

        Ok(CapturedResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hop_by_hop_headers() {
        assert!(is_hop_by_hop("Connection"));
        assert!(is_hop_by_hop("transfer-encoding"));
        assert!(is_hop_by_hop("Host"));
        assert!(!is_hop_by_hop("content-type"));
        assert!(!is_hop_by_hop("etag"));
    }

    #[tokio::test]
    async fn test_fetcher_with_timeout() {
        let fetcher = HttpFetcher::with_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(fetcher.timeout(), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_failure() {
        let fetcher = HttpFetcher::with_timeout(Duration::from_secs(2)).unwrap();
        // Port 9 on loopback (discard) is closed on test machines.
        let request = FetchRequest::get("http://127.0.0.1:9/results.json").unwrap();

        let err = fetcher.fetch(&request).await.unwrap_err();
        assert!(err.is_network_failure());
    }
}
