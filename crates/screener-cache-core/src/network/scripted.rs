//! Scripted upstream for driving the controller without a network.

use super::Fetcher;
use crate::error::{CacheError, Result};
use crate::request::{CapturedResponse, FetchRequest};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// A fetcher that answers from a table of canned responses.
///
/// Unknown URLs answer `404`. While offline, or for URLs marked unreachable,
/// every fetch fails with a network error. Every call is recorded.
#[derive(Default)]
pub struct ScriptedFetcher {
    routes: Mutex<HashMap<String, CapturedResponse>>,
    unreachable: Mutex<HashSet<String>>,
    offline: AtomicBool,
    calls: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `response` for `url`.
    pub fn respond(&self, url: &str, response: CapturedResponse) -> &Self {
        self.routes
            .lock()
            .expect("routes lock")
            .insert(url.to_string(), response);
        self
    }

    pub fn respond_json(&self, url: &str, body: &str) -> &Self {
        self.respond(
            url,
            CapturedResponse::new(200, body.to_string())
                .with_header("content-type", "application/json"),
        )
    }

    pub fn respond_html(&self, url: &str, body: &str) -> &Self {
        self.respond(
            url,
            CapturedResponse::new(200, body.to_string())
                .with_header("content-type", "text/html; charset=utf-8"),
        )
    }

    /// Make every fetch fail as if the machine were offline.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Make fetches of one URL fail.
    pub fn mark_unreachable(&self, url: &str) -> &Self {
        self.unreachable
            .lock()
            .expect("unreachable lock")
            .insert(url.to_string());
        self
    }

    /// URLs fetched so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn call_count(&self, url: &str) -> usize {
        self.calls
            .lock()
            .expect("calls lock")
            .iter()
            .filter(|called| called.as_str() == url)
            .count()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<CapturedResponse> {
        let url = request.url.as_str().to_string();
        self.calls.lock().expect("calls lock").push(url.clone());

        if self.offline.load(Ordering::SeqCst) {
            return Err(CacheError::network(format!("offline: {}", url)));
        }
        if self.unreachable.lock().expect("unreachable lock").contains(&url) {
            return Err(CacheError::network(format!("unreachable: {}", url)));
        }

        Ok(self
            .routes
            .lock()
            .expect("routes lock")
            .get(&url)
            .cloned()
            .unwrap_or_else(|| CapturedResponse::new(404, "Not Found")))
    }
}
