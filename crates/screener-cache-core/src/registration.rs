//! Version handover between controller versions.
//!
//! A [`Registration`] holds at most one installing, one waiting and one
//! active controller, plus the pages (clients) it controls. A new version
//! is installed next to the active one and replaces it as soon as it asks
//! to skip waiting; the replaced version becomes redundant.

use crate::controller::{
    CacheController, ControllerMessage, ControllerState, FetchOutcome, MessageReply,
    ResponseSource, ServedResponse,
};
use crate::error::{CacheError, Result};
use crate::network::Fetcher;
use crate::request::FetchRequest;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{oneshot, RwLock};
use tracing::{debug, info};

#[derive(Default)]
struct Slots {
    installing: Option<Arc<CacheController>>,
    waiting: Option<Arc<CacheController>>,
    active: Option<Arc<CacheController>>,
}

/// Owner of the controller versions for one origin.
pub struct Registration {
    slots: RwLock<Slots>,
    /// Client id -> version controlling it (`None` = uncontrolled).
    clients: RwLock<HashMap<String, Option<String>>>,
    /// Used for requests no controller intercepts.
    network: Arc<dyn Fetcher>,
}

impl Registration {
    pub fn new(network: Arc<dyn Fetcher>) -> Self {
        Self {
            slots: RwLock::new(Slots::default()),
            clients: RwLock::new(HashMap::new()),
            network,
        }
    }

    pub async fn active(&self) -> Option<Arc<CacheController>> {
        self.slots.read().await.active.clone()
    }

    pub async fn waiting(&self) -> Option<Arc<CacheController>> {
        self.slots.read().await.waiting.clone()
    }

    pub async fn installing(&self) -> Option<Arc<CacheController>> {
        self.slots.read().await.installing.clone()
    }

    /// Install a new version and, once it asks to skip waiting, activate it.
    ///
    /// If install fails the new version is discarded as redundant and the
    /// previously active version keeps serving.
    pub async fn register(&self, controller: Arc<CacheController>) -> Result<()> {
        {
            let mut slots = self.slots.write().await;
            if let Some(previous) = slots.installing.replace(controller.clone()) {
                previous.mark_redundant();
            }
        }

        let installed = controller.install().await;

        {
            let mut slots = self.slots.write().await;
            // A later `register` may have replaced this version meanwhile.
            let current = slots
                .installing
                .as_ref()
                .is_some_and(|c| Arc::ptr_eq(c, &controller));
            if current {
                slots.installing = None;
            }
            match &installed {
                Ok(_) if current => {
                    if let Some(previous) = slots.waiting.replace(controller.clone()) {
                        previous.mark_redundant();
                    }
                }
                Ok(_) => {
                    controller.mark_redundant();
                    info!(
                        "Cache version {} was superseded before it finished installing",
                        controller.version()
                    );
                    return Err(CacheError::InvalidState {
                        expected: ControllerState::Installed.to_string(),
                        actual: controller.state(),
                    });
                }
                Err(e) => {
                    info!(
                        "Cache version {} failed to install, keeping active version: {}",
                        controller.version(),
                        e
                    );
                }
            }
        }

        installed?;
        self.try_activate_waiting().await?;
        Ok(())
    }

    /// Promote the waiting version if it asked to skip waiting or nothing
    /// is active. Returns whether a promotion happened.
    pub async fn try_activate_waiting(&self) -> Result<bool> {
        let promoted = {
            let mut slots = self.slots.write().await;
            let ready = match &slots.waiting {
                Some(waiting) => waiting.skip_waiting_requested() || slots.active.is_none(),
                None => false,
            };
            if !ready {
                return Ok(false);
            }
            let Some(next) = slots.waiting.take() else {
                return Ok(false);
            };

            // Pruning happens-before the version starts controlling pages.
            next.activate()?;
            if let Some(previous) = slots.active.replace(next.clone()) {
                previous.mark_redundant();
            }
            next
        };

        info!("Cache version {} is now active", promoted.version());
        self.claim_clients(promoted.version()).await;
        Ok(true)
    }

    /// Put every known client under the control of `version`.
    async fn claim_clients(&self, version: &str) {
        let mut clients = self.clients.write().await;
        for controller in clients.values_mut() {
            *controller = Some(version.to_string());
        }
        debug!("Version {} claimed {} clients", version, clients.len());
    }

    /// Register a page. It is controlled by the active version, if any.
    pub async fn attach_client(&self, id: impl Into<String>) -> Option<String> {
        let version = self.active().await.map(|c| c.version().to_string());
        self.clients.write().await.insert(id.into(), version.clone());
        version
    }

    pub async fn detach_client(&self, id: &str) -> bool {
        self.clients.write().await.remove(id).is_some()
    }

    /// Version controlling a page, if the page is known and controlled.
    pub async fn controller_for(&self, id: &str) -> Option<String> {
        self.clients.read().await.get(id).cloned().flatten()
    }

    /// Deliver a page message.
    ///
    /// `SKIP_WAITING` goes to the waiting version (promoting it) or else the
    /// active one; everything else goes to the active version. Returns the
    /// reply for messages that have one.
    pub async fn post_message(&self, message: ControllerMessage) -> Result<Option<MessageReply>> {
        if message == ControllerMessage::SkipWaiting {
            let target = {
                let slots = self.slots.read().await;
                slots.waiting.clone().or_else(|| slots.active.clone())
            };
            if let Some(target) = target {
                target.handle_message(message, None)?;
            }
            self.try_activate_waiting().await?;
            return Ok(None);
        }

        let active = self.active().await.ok_or_else(|| CacheError::InvalidState {
            expected: ControllerState::Activated.to_string(),
            actual: ControllerState::Parsed,
        })?;

        let (tx, rx) = oneshot::channel();
        active.handle_message(message, Some(tx))?;
        let reply = rx
            .await
            .map_err(|_| CacheError::Other(format!("No reply to {:?}", message)))?;
        Ok(Some(reply))
    }

    /// Serve a request through the active version, or straight from the
    /// network when nothing intercepts it.
    pub async fn fetch(&self, request: &FetchRequest) -> Result<ServedResponse> {
        if let Some(active) = self.active().await {
            if let FetchOutcome::Served(served) = active.handle_fetch(request).await? {
                return Ok(served);
            }
        }

        let response = self.network.fetch(request).await?;
        Ok(ServedResponse {
            response,
            source: ResponseSource::Passthrough,
        })
    }
}
