//! Request classification and strategy selection.

use crate::config::ControllerConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use url::{Origin, Url};

/// Which kind of resource a GET request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestClass {
    /// Path ends in `.json`: screener results, chart and market data.
    Data,
    /// Listed in the manifest, or served from another origin.
    StaticAsset,
    /// Navigations and unlisted same-origin files.
    Other,
}

/// How a request class is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    CacheFirst,
    NetworkFirst,
}

impl RequestClass {
    pub fn strategy(&self) -> Strategy {
        match self {
            RequestClass::StaticAsset => Strategy::CacheFirst,
            RequestClass::Data | RequestClass::Other => Strategy::NetworkFirst,
        }
    }

    /// Whether responses of this class go to the data namespace.
    pub fn uses_data_namespace(&self) -> bool {
        matches!(self, RequestClass::Data)
    }
}

/// Classifies URLs against the page origin and the static manifest.
#[derive(Debug, Clone)]
pub struct RequestRouter {
    origin: Origin,
    static_paths: HashSet<String>,
}

impl RequestRouter {
    pub fn new<'a>(origin: &Url, static_paths: impl IntoIterator<Item = &'a String>) -> Self {
        Self {
            origin: origin.origin(),
            static_paths: static_paths.into_iter().cloned().collect(),
        }
    }

    pub fn is_same_origin(&self, url: &Url) -> bool {
        url.origin() == self.origin
    }

    /// Classify a URL. The `.json` check runs first, so data is always
    /// network-first even when served from another origin.
    pub fn classify(&self, url: &Url) -> RequestClass {
        if url.path().ends_with(ControllerConfig::DATA_SUFFIX) {
            RequestClass::Data
        } else if !self.is_same_origin(url) || self.static_paths.contains(url.path()) {
            RequestClass::StaticAsset
        } else {
            RequestClass::Other
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> RequestRouter {
        let origin = Url::parse("https://screener.example.com").unwrap();
        let paths = vec![
            "/".to_string(),
            "/index.html".to_string(),
            "/app.js".to_string(),
        ];
        RequestRouter::new(&origin, &paths)
    }

    fn classify(url: &str) -> RequestClass {
        router().classify(&Url::parse(url).unwrap())
    }

    #[test]
    fn test_json_is_data() {
        assert_eq!(classify("https://screener.example.com/results.json"), RequestClass::Data);
        assert_eq!(
            classify("https://screener.example.com/charts/MSFT.json?v=2"),
            RequestClass::Data
        );
    }

    #[test]
    fn test_manifest_paths_are_static() {
        assert_eq!(classify("https://screener.example.com/app.js"), RequestClass::StaticAsset);
        assert_eq!(classify("https://screener.example.com/"), RequestClass::StaticAsset);
        assert_eq!(
            classify("https://screener.example.com/index.html?tab=2"),
            RequestClass::StaticAsset
        );
    }

    #[test]
    fn test_cross_origin_is_static() {
        assert_eq!(
            classify("https://cdn.jsdelivr.net/npm/chart.js"),
            RequestClass::StaticAsset
        );
        // Same host, different scheme is another origin.
        assert_eq!(classify("http://screener.example.com/other.js"), RequestClass::StaticAsset);
    }

    #[test]
    fn test_unlisted_same_origin_is_other() {
        assert_eq!(classify("https://screener.example.com/report.html"), RequestClass::Other);
        assert_eq!(classify("https://screener.example.com/favicon.ico"), RequestClass::Other);
    }

    #[test]
    fn test_cross_origin_json_is_data() {
        assert_eq!(
            classify("https://api.example.net/vix_data.json"),
            RequestClass::Data
        );
    }

    #[test]
    fn test_strategies() {
        assert_eq!(RequestClass::StaticAsset.strategy(), Strategy::CacheFirst);
        assert_eq!(RequestClass::Data.strategy(), Strategy::NetworkFirst);
        assert_eq!(RequestClass::Other.strategy(), Strategy::NetworkFirst);
        assert!(RequestClass::Data.uses_data_namespace());
        assert!(!RequestClass::Other.uses_data_namespace());
    }
}
