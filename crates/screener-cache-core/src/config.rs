//! Centralized configuration for the offline cache controller.
//!
//! Constant tables follow the associated-const style; the per-deployment
//! settings (origin, version token, asset manifest) live in [`CacheSettings`],
//! which can be loaded from a JSON file.

use crate::error::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Controller-level configuration.
pub struct ControllerConfig;

impl ControllerConfig {
    pub const DEFAULT_NAMESPACE_PREFIX: &'static str = "stock-screener";
    pub const DEFAULT_VERSION: &'static str = "v1";
    pub const DEFAULT_ORIGIN: &'static str = "http://127.0.0.1:8000";
    pub const CLEAR_CACHE_REPLY: &'static str = "Cache cleared";
    /// Suffix that marks a request as a data request.
    pub const DATA_SUFFIX: &'static str = ".json";
}

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
    pub const USER_AGENT: &'static str = "screener-cache/0.3";
}

/// Proxy front-end configuration.
pub struct ProxyConfig;

impl ProxyConfig {
    pub const CONTROL_PREFIX: &'static str = "/__offline-cache";
    pub const MAX_REQUEST_BODY_BYTES: usize = 10_485_760; // 10MB
    pub const DATABASE_FILE_NAME: &'static str = "offline-cache.sqlite";
    pub const CACHE_DIR_NAME: &'static str = "screener-cache";
    /// Response header naming where a proxied response came from.
    pub const SOURCE_HEADER: &'static str = "x-offline-cache";
}

/// Per-deployment settings: origin, version token and asset manifest.
///
/// Bumping `version` is the only way to invalidate previously cached content;
/// the next activation deletes every namespace of the older version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Origin the dashboard pages are served from.
    pub origin: String,
    /// Version token embedded in both namespace names.
    pub version: String,
    /// Leading part of both namespace names.
    pub namespace_prefix: String,
    /// Same-origin paths cached on install, in order.
    pub static_assets: Vec<String>,
    /// Absolute third-party script URLs cached on install, in order.
    pub cdn_assets: Vec<String>,
    /// Pages served to navigations when both network and cache miss.
    /// The first one present in the static namespace wins.
    pub offline_fallback: Vec<String>,
    /// Replace the active version as soon as install completes. When off, a
    /// new version waits for a `SKIP_WAITING` message (or for no version to
    /// be active).
    pub skip_waiting: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            origin: ControllerConfig::DEFAULT_ORIGIN.to_string(),
            version: ControllerConfig::DEFAULT_VERSION.to_string(),
            namespace_prefix: ControllerConfig::DEFAULT_NAMESPACE_PREFIX.to_string(),
            static_assets: [
                "/",
                "/index.html",
                "/stock.html",
                "/market.html",
                "/sectors.html",
                "/compare.html",
                "/favorites.html",
                "/styles.css",
                "/app.js",
                "/stock.js",
                "/market.js",
                "/sectors.js",
                "/compare.js",
                "/favorites.js",
                "/notifications.js",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            cdn_assets: [
                "https://cdn.jsdelivr.net/npm/chart.js",
                "https://cdn.jsdelivr.net/npm/chartjs-adapter-date-fns/dist/chartjs-adapter-date-fns.bundle.min.js",
                "https://cdn.jsdelivr.net/npm/chartjs-plugin-annotation",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            offline_fallback: vec!["/index.html".to_string(), "/".to_string()],
            skip_waiting: true,
        }
    }
}

impl CacheSettings {
    /// Load settings from a JSON file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| CacheError::io_with_path(e, path))?;
        let settings: CacheSettings = serde_json::from_str(&raw)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parse the configured origin.
    pub fn origin_url(&self) -> Result<Url> {
        let url = Url::parse(&self.origin).map_err(|e| CacheError::InvalidUrl {
            url: self.origin.clone(),
            message: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(CacheError::Config {
                message: format!("origin must be an absolute http(s) URL: {}", self.origin),
            });
        }
        Ok(url)
    }

    /// Check the settings for values the controller cannot work with.
    pub fn validate(&self) -> Result<()> {
        self.origin_url()?;

        if self.version.trim().is_empty() {
            return Err(CacheError::Config {
                message: "version token must not be empty".to_string(),
            });
        }
        if self.namespace_prefix.trim().is_empty() {
            return Err(CacheError::Config {
                message: "namespace prefix must not be empty".to_string(),
            });
        }

        for path in self.static_assets.iter().chain(&self.offline_fallback) {
            if !path.starts_with('/') {
                return Err(CacheError::Config {
                    message: format!("same-origin asset path must start with '/': {}", path),
                });
            }
        }

        for url in &self.cdn_assets {
            Url::parse(url).map_err(|e| CacheError::InvalidUrl {
                url: url.clone(),
                message: e.to_string(),
            })?;
        }

        Ok(())
    }

    /// Namespace names derived from the prefix and version token.
    pub fn cache_names(&self) -> CacheNames {
        CacheNames {
            static_name: format!("{}-static-{}", self.namespace_prefix, self.version),
            data_name: format!("{}-data-{}", self.namespace_prefix, self.version),
        }
    }
}

/// The two namespace names owned by one controller version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheNames {
    pub static_name: String,
    pub data_name: String,
}

impl CacheNames {
    /// Whether `name` belongs to this version.
    pub fn is_current(&self, name: &str) -> bool {
        name == self.static_name || name == self.data_name
    }
}
