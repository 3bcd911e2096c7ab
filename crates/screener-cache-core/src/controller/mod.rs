//! Offline cache controller.
//!
//! One [`CacheController`] is one version of the caching layer. Its
//! lifecycle is `install` → `activate` → intercept:
//! - install creates the static and data namespaces and fills the static one
//!   from the manifest, tolerating individual asset failures
//! - activate deletes every namespace that does not belong to this version
//! - each intercepted GET is classified and served cache-first (static
//!   assets) or network-first (data and everything else)
//!
//! Non-GET requests are never intercepted.

mod messages;
mod metrics;
mod routing;
mod state;
mod strategy;

pub use messages::{ControllerMessage, ControllerStatus, MessageReply};
pub use metrics::{ControllerMetrics, MetricsSnapshot};
pub use routing::{RequestClass, RequestRouter, Strategy};
pub use state::ControllerState;
pub use strategy::{FetchOutcome, ResponseSource, ServedResponse};

use crate::cache::NamespaceStore;
use crate::config::{CacheNames, CacheSettings};
use crate::error::{CacheError, Result};
use crate::network::Fetcher;
use crate::request::FetchRequest;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use state::AtomicControllerState;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use url::Url;

/// Outcome of an install.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallReport {
    /// URLs stored in the static namespace.
    pub cached: Vec<String>,
    /// URLs that could not be cached, with the reason.
    pub failed: Vec<InstallFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallFailure {
    pub url: String,
    pub reason: String,
}

/// Outcome of an activation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationReport {
    /// Namespaces of older versions that were deleted.
    pub deleted: Vec<String>,
}

/// One version of the offline caching layer.
pub struct CacheController {
    settings: CacheSettings,
    origin: Url,
    names: CacheNames,
    router: RequestRouter,
    store: Arc<dyn NamespaceStore>,
    fetcher: Arc<dyn Fetcher>,
    state: AtomicControllerState,
    skip_waiting: AtomicBool,
    metrics: ControllerMetrics,
}

impl CacheController {
    /// Create a controller for the given settings.
    ///
    /// The controller starts in [`ControllerState::Parsed`] and touches
    /// neither the store nor the network until [`install`](Self::install).
    pub fn new(
        settings: CacheSettings,
        store: Arc<dyn NamespaceStore>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self> {
        settings.validate()?;
        let origin = settings.origin_url()?;
        let names = settings.cache_names();
        let router = RequestRouter::new(&origin, &settings.static_assets);

        Ok(Self {
            settings,
            origin,
            names,
            router,
            store,
            fetcher,
            state: AtomicControllerState::new(ControllerState::Parsed),
            skip_waiting: AtomicBool::new(false),
            metrics: ControllerMetrics::default(),
        })
    }

    pub fn version(&self) -> &str {
        &self.settings.version
    }

    pub fn names(&self) -> &CacheNames {
        &self.names
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    pub fn state(&self) -> ControllerState {
        self.state.load()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn store(&self) -> &Arc<dyn NamespaceStore> {
        &self.store
    }

    /// Classify a URL against this version's manifest.
    pub fn classify(&self, url: &Url) -> RequestClass {
        self.router.classify(url)
    }

    /// Whether this version asked to replace the active one without waiting.
    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_redundant(&self) {
        let previous = self.state.swap(ControllerState::Redundant);
        if !previous.is_terminal() {
            info!("Cache version {} is now redundant (was {})", self.version(), previous);
        }
    }

    fn expect_transition(&self, from: ControllerState, to: ControllerState) -> Result<()> {
        self.state
            .transition(from, to)
            .map_err(|actual| CacheError::InvalidState {
                expected: from.to_string(),
                actual,
            })
    }

    /// Every URL the install step caches: manifest paths, then CDN scripts.
    pub fn install_targets(&self) -> Result<Vec<Url>> {
        let mut targets = Vec::with_capacity(
            self.settings.static_assets.len() + self.settings.cdn_assets.len(),
        );
        for path in &self.settings.static_assets {
            targets.push(self.origin.join(path)?);
        }
        for url in &self.settings.cdn_assets {
            targets.push(Url::parse(url).map_err(|e| CacheError::InvalidUrl {
                url: url.clone(),
                message: e.to_string(),
            })?);
        }
        Ok(targets)
    }

    /// Create the namespaces and populate the static one from the manifest.
    ///
    /// Individual asset failures are logged and reported, never fatal. Only
    /// a store that cannot create the namespaces, or a newer version marking
    /// this one redundant mid-install, fails the install.
    pub async fn install(&self) -> Result<InstallReport> {
        self.expect_transition(ControllerState::Parsed, ControllerState::Installing)?;
        info!("Installing cache version {}", self.version());

        let targets = match self.open_namespaces().and_then(|_| self.install_targets()) {
            Ok(targets) => targets,
            Err(e) => {
                warn!("Install of cache version {} failed: {}", self.version(), e);
                self.mark_redundant();
                return Err(e);
            }
        };

        let results = join_all(targets.iter().map(|url| self.precache(url))).await;

        let mut report = InstallReport::default();
        for (url, result) in targets.iter().zip(results) {
            match result {
                Ok(()) => report.cached.push(url.to_string()),
                Err(e) => {
                    warn!("Failed to cache {} during install: {}", url, e);
                    ControllerMetrics::incr(&self.metrics.install_failures);
                    report.failed.push(InstallFailure {
                        url: url.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        // A newer version may have superseded this one while precaching.
        if let Err(e) =
            self.expect_transition(ControllerState::Installing, ControllerState::Installed)
        {
            warn!("Cache version {} was superseded during install", self.version());
            return Err(e);
        }
        if self.settings.skip_waiting {
            self.skip_waiting.store(true, Ordering::SeqCst);
        }
        info!(
            "Installed cache version {} ({} cached, {} failed)",
            self.version(),
            report.cached.len(),
            report.failed.len()
        );

        Ok(report)
    }

    fn open_namespaces(&self) -> Result<()> {
        self.store.open(&self.names.static_name)?;
        self.store.open(&self.names.data_name)?;
        Ok(())
    }

    async fn precache(&self, url: &Url) -> Result<()> {
        let request = FetchRequest::new(reqwest::Method::GET, url.clone());
        let response = self.fetcher.fetch(&request).await?;
        if !response.ok() {
            return Err(CacheError::Other(format!("HTTP {}", response.status)));
        }
        let state = self.state();
        if state != ControllerState::Installing {
            return Err(CacheError::InvalidState {
                expected: ControllerState::Installing.to_string(),
                actual: state,
            });
        }
        self.store
            .put(&self.names.static_name, &request.cache_key(), &response)
    }

    /// Delete every namespace not owned by this version.
    ///
    /// Runs after install; the caller claims clients once this returns.
    pub fn activate(&self) -> Result<ActivationReport> {
        self.expect_transition(ControllerState::Installed, ControllerState::Activating)?;
        info!("Activating cache version {}", self.version());

        let mut report = ActivationReport::default();
        let pruned = self.store.namespaces().and_then(|names| {
            for name in names {
                if self.names.is_current(&name) {
                    continue;
                }
                self.store.delete(&name)?;
                info!("Deleted old cache namespace {}", name);
                report.deleted.push(name);
            }
            Ok(())
        });

        if let Err(e) = pruned {
            warn!("Activation of cache version {} failed: {}", self.version(), e);
            self.mark_redundant();
            return Err(e);
        }

        self.expect_transition(ControllerState::Activating, ControllerState::Activated)?;
        Ok(report)
    }

    /// Intercept one request.
    ///
    /// Returns [`FetchOutcome::Fallthrough`] for requests this controller
    /// does not handle: non-GET methods, or any request before activation.
    pub async fn handle_fetch(&self, request: &FetchRequest) -> Result<FetchOutcome> {
        if !request.is_get() {
            return Ok(FetchOutcome::Fallthrough);
        }
        if !self.state().can_intercept_fetch() {
            debug!(
                "Cache version {} is {}, not intercepting {}",
                self.version(),
                self.state(),
                request.url
            );
            return Ok(FetchOutcome::Fallthrough);
        }

        let class = self.classify(&request.url);
        debug!("{} classified as {:?}", request.url, class);

        let served = match class.strategy() {
            Strategy::CacheFirst => self.cache_first(request).await?,
            Strategy::NetworkFirst => self.network_first(request, class).await?,
        };
        Ok(FetchOutcome::Served(served))
    }

    /// Handle a page message. Replies, if any, go to `reply`.
    pub fn handle_message(
        &self,
        message: ControllerMessage,
        reply: Option<oneshot::Sender<MessageReply>>,
    ) -> Result<()> {
        let answer = match message {
            ControllerMessage::SkipWaiting => {
                info!("Skip waiting requested for cache version {}", self.version());
                self.skip_waiting.store(true, Ordering::SeqCst);
                None
            }
            ControllerMessage::ClearCache => {
                let deleted = self.store.clear_all()?;
                info!("Cleared {} cache namespaces", deleted);
                Some(MessageReply::cache_cleared())
            }
            ControllerMessage::GetStatus => Some(MessageReply::Status(Box::new(self.status()?))),
        };

        if let (Some(answer), Some(reply)) = (answer, reply) {
            if reply.send(answer).is_err() {
                debug!("Reply channel for {:?} closed before reply", message);
            }
        }
        Ok(())
    }

    /// Current status of this version.
    pub fn status(&self) -> Result<ControllerStatus> {
        Ok(ControllerStatus {
            version: self.version().to_string(),
            state: self.state(),
            names: self.names.clone(),
            metrics: self.metrics(),
            cache: self.store.get_stats()?,
        })
    }
}

impl std::fmt::Debug for CacheController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheController")
            .field("version", &self.settings.version)
            .field("origin", &self.origin.as_str())
            .field("state", &self.state())
            .finish()
    }
}
