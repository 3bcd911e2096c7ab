//! Upstream fetching.
//!
//! The controller talks to the network only through [`Fetcher`], so the
//! strategies can be exercised against a scripted upstream.

mod client;
#[cfg(any(test, feature = "test-util"))]
mod scripted;

pub use client::{is_hop_by_hop, HttpFetcher};
#[cfg(any(test, feature = "test-util"))]
pub use scripted::ScriptedFetcher;

use crate::error::Result;
use crate::request::{CapturedResponse, FetchRequest};
use async_trait::async_trait;

/// Something that can perform a request against the network.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Perform the request.
    ///
    /// Returns `Err` only when no response was obtained; an HTTP error status
    /// is still `Ok`.
    async fn fetch(&self, request: &FetchRequest) -> Result<CapturedResponse>;
}
