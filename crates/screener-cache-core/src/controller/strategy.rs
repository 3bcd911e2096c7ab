//! Cache-first and network-first serving.

use super::metrics::ControllerMetrics;
use super::routing::RequestClass;
use super::CacheController;
use crate::error::Result;
use crate::request::{cache_key, CapturedResponse, FetchRequest};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResponseSource {
    /// Cache-first hit; the network was not touched.
    Cache,
    /// Fresh from the network.
    Network,
    /// Network failed; served the previously cached copy.
    StaleCache,
    /// Navigation with nothing else available; served the cached root page.
    OfflineFallback,
    /// Not intercepted; forwarded to the network unmodified.
    Passthrough,
}

impl ResponseSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseSource::Cache => "cache",
            ResponseSource::Network => "network",
            ResponseSource::StaleCache => "stale-cache",
            ResponseSource::OfflineFallback => "offline-fallback",
            ResponseSource::Passthrough => "passthrough",
        }
    }
}

/// A response together with its provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServedResponse {
    pub response: CapturedResponse,
    pub source: ResponseSource,
}

/// Result of intercepting a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Let the request go to the network untouched.
    Fallthrough,
    Served(ServedResponse),
}

impl FetchOutcome {
    pub fn served(self) -> Option<ServedResponse> {
        match self {
            FetchOutcome::Served(served) => Some(served),
            FetchOutcome::Fallthrough => None,
        }
    }
}

impl CacheController {
    fn namespace_for(&self, class: RequestClass) -> &str {
        if class.uses_data_namespace() {
            &self.names.data_name
        } else {
            &self.names.static_name
        }
    }

    /// Read from a namespace. A failing store reads as a miss.
    fn lookup(&self, namespace: &str, key: &str) -> Option<CapturedResponse> {
        match self.store.get(namespace, key) {
            Ok(hit) => hit,
            Err(e) => {
                warn!("Cache read of {} in {} failed: {}", key, namespace, e);
                None
            }
        }
    }

    /// Persist a copy of an OK response. Failures are logged and counted,
    /// the caller still gets its response.
    fn store_copy(&self, namespace: &str, key: &str, response: &CapturedResponse) {
        if !response.ok() {
            return;
        }
        if let Err(e) = self.store.put(namespace, key, response) {
            ControllerMetrics::incr(&self.metrics.cache_write_failures);
            warn!("Failed to cache {} in {}: {}", key, namespace, e);
        }
    }

    /// The first configured fallback page present in the static namespace.
    fn offline_page(&self) -> Option<CapturedResponse> {
        self.settings.offline_fallback.iter().find_map(|path| {
            let url = self.origin.join(path).ok()?;
            self.lookup(&self.names.static_name, &cache_key(&Method::GET, &url))
        })
    }

    fn served(&self, response: CapturedResponse, source: ResponseSource) -> ServedResponse {
        let counter = match source {
            ResponseSource::Cache => &self.metrics.cache_hits,
            ResponseSource::Network | ResponseSource::Passthrough => &self.metrics.network_responses,
            ResponseSource::StaleCache => &self.metrics.stale_responses,
            ResponseSource::OfflineFallback => &self.metrics.offline_fallbacks,
        };
        ControllerMetrics::incr(counter);
        ServedResponse { response, source }
    }

    /// Serve from the static namespace, filling misses from the network.
    pub(crate) async fn cache_first(&self, request: &FetchRequest) -> Result<ServedResponse> {
        let namespace = self.names.static_name.as_str();
        let key = request.cache_key();

        if let Some(hit) = self.lookup(namespace, &key) {
            debug!("Cache hit for {}", key);
            return Ok(self.served(hit, ResponseSource::Cache));
        }
        ControllerMetrics::incr(&self.metrics.cache_misses);

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                self.store_copy(namespace, &key, &response);
                Ok(self.served(response, ResponseSource::Network))
            }
            Err(e) if e.is_network_failure() => {
                ControllerMetrics::incr(&self.metrics.network_failures);
                if request.is_navigation() {
                    if let Some(page) = self.offline_page() {
                        debug!("Offline, serving root page for {}", key);
                        return Ok(self.served(page, ResponseSource::OfflineFallback));
                    }
                }
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Prefer the network; fall back to the cached copy, then to the root
    /// page for navigations.
    pub(crate) async fn network_first(
        &self,
        request: &FetchRequest,
        class: RequestClass,
    ) -> Result<ServedResponse> {
        let namespace = self.namespace_for(class);
        let key = request.cache_key();

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                self.store_copy(namespace, &key, &response);
                Ok(self.served(response, ResponseSource::Network))
            }
            Err(e) if e.is_network_failure() => {
                ControllerMetrics::incr(&self.metrics.network_failures);
                if let Some(stale) = self.lookup(namespace, &key) {
                    debug!("Network failed, serving cached {}", key);
                    return Ok(self.served(stale, ResponseSource::StaleCache));
                }
                ControllerMetrics::incr(&self.metrics.cache_misses);
                if request.is_navigation() {
                    if let Some(page) = self.offline_page() {
                        debug!("Offline, serving root page for {}", key);
                        return Ok(self.served(page, ResponseSource::OfflineFallback));
                    }
                }
                Err(e)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MemoryStore, NamespaceStore};
    use crate::config::CacheSettings;
    use crate::error::CacheError;
    use crate::network::ScriptedFetcher;
    use crate::request::CapturedResponse;
    use std::sync::Arc;

    /// A store whose writes always fail, as with an exhausted quota.
    struct FullStore(MemoryStore);

    impl NamespaceStore for FullStore {
        fn open(&self, namespace: &str) -> Result<()> {
            self.0.open(namespace)
        }
        fn has(&self, namespace: &str) -> Result<bool> {
            self.0.has(namespace)
        }
        fn namespaces(&self) -> Result<Vec<String>> {
            self.0.namespaces()
        }
        fn delete(&self, namespace: &str) -> Result<bool> {
            self.0.delete(namespace)
        }
        fn get_entry(
            &self,
            namespace: &str,
            key: &str,
        ) -> Result<Option<crate::cache::StoredEntry>> {
            self.0.get_entry(namespace, key)
        }
        fn put(&self, _: &str, _: &str, _: &CapturedResponse) -> Result<()> {
            Err(CacheError::Database {
                message: "database or disk is full".into(),
                source: None,
            })
        }
        fn remove(&self, namespace: &str, key: &str) -> Result<bool> {
            self.0.remove(namespace, key)
        }
        fn keys(&self, namespace: &str) -> Result<Vec<String>> {
            self.0.keys(namespace)
        }
        fn get_namespace_meta(
            &self,
            namespace: &str,
        ) -> Result<Option<crate::cache::NamespaceMeta>> {
            self.0.get_namespace_meta(namespace)
        }
        fn get_stats(&self) -> Result<crate::cache::CacheStats> {
            self.0.get_stats()
        }
    }

    fn active(store: Arc<dyn NamespaceStore>, fetcher: Arc<ScriptedFetcher>) -> CacheController {
        let settings = CacheSettings {
            origin: "https://screener.example.com".into(),
            version: "v1".into(),
            namespace_prefix: "screener".into(),
            static_assets: vec!["/app.js".into()],
            cdn_assets: Vec::new(),
            offline_fallback: vec!["/index.html".into()],
            skip_waiting: true,
        };
        let ctrl = CacheController::new(settings, store, fetcher).unwrap();
        ctrl.state.swap(super::super::ControllerState::Activated);
        ctrl
    }

    #[tokio::test]
    async fn test_write_failure_still_serves_response() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.respond_json("https://screener.example.com/results.json", "[]");
        let ctrl = active(Arc::new(FullStore(MemoryStore::new())), fetcher);

        let request = FetchRequest::get("https://screener.example.com/results.json").unwrap();
        let served = ctrl.network_first(&request, RequestClass::Data).await.unwrap();

        assert_eq!(served.source, ResponseSource::Network);
        assert_eq!(served.response.body, "[]");
        assert_eq!(ctrl.metrics().cache_write_failures, 1);
    }

    #[tokio::test]
    async fn test_non_ok_network_response_not_cached() {
        let store = Arc::new(MemoryStore::new());
        let fetcher = Arc::new(ScriptedFetcher::new());
        let ctrl = active(store.clone(), fetcher);

        let request = FetchRequest::get("https://screener.example.com/missing.json").unwrap();
        let served = ctrl.network_first(&request, RequestClass::Data).await.unwrap();

        assert_eq!(served.response.status, 404);
        assert!(store.keys("screener-data-v1").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cache_first_miss_offline_sub_resource_errors() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.set_offline(true);
        let ctrl = active(Arc::new(MemoryStore::new()), fetcher);

        let request = FetchRequest::get("https://screener.example.com/app.js").unwrap();
        let err = ctrl.cache_first(&request).await.unwrap_err();
        assert!(err.is_network_failure());
    }

    #[tokio::test]
    async fn test_navigation_without_cached_root_errors() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.set_offline(true);
        let ctrl = active(Arc::new(MemoryStore::new()), fetcher);

        let request = FetchRequest::navigate("https://screener.example.com/report.html").unwrap();
        assert!(ctrl
            .network_first(&request, RequestClass::Other)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_other_class_uses_static_namespace() {
        let store = Arc::new(MemoryStore::new());
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.respond_html("https://screener.example.com/report.html", "<p>report</p>");
        let ctrl = active(store.clone(), fetcher);

        let request = FetchRequest::get("https://screener.example.com/report.html").unwrap();
        ctrl.network_first(&request, RequestClass::Other).await.unwrap();

        assert_eq!(
            store.keys("screener-static-v1").unwrap(),
            vec!["GET https://screener.example.com/report.html"]
        );
        assert!(!store.has("screener-data-v1").unwrap());
    }
}
