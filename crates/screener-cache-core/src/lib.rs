//! Screener Cache Core - offline caching layer for the stock-screener dashboard.
//!
//! This crate decides, for every request the dashboard makes, whether to
//! answer from a versioned local cache or from the network, so the dashboard
//! keeps working when the backend is unreachable. It has no HTTP server of
//! its own; see the `screener-cache-proxy` crate for that.
//!
//! # Example
//!
//! ```rust,ignore
//! use screener_cache_core::{
//!     CacheController, CacheSettings, FetchRequest, HttpFetcher, MemoryStore, Registration,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> screener_cache_core::Result<()> {
//!     let fetcher = Arc::new(HttpFetcher::new()?);
//!     let store = Arc::new(MemoryStore::new());
//!
//!     let controller = CacheController::new(CacheSettings::default(), store, fetcher.clone())?;
//!     let registration = Registration::new(fetcher);
//!     registration.register(Arc::new(controller)).await?;
//!
//!     let request = FetchRequest::get("http://127.0.0.1:8000/stock-list.json")?;
//!     let served = registration.fetch(&request).await?;
//!     println!("{} from {}", served.response.status, served.source.as_str());
//!
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod controller;
pub mod error;
pub mod network;
pub mod registration;
pub mod request;

// Re-export commonly used types
pub use cache::{CacheStats, MemoryStore, NamespaceStore, SqliteStore};
pub use config::{CacheNames, CacheSettings, ControllerConfig, NetworkConfig, ProxyConfig};
pub use controller::{
    ActivationReport, CacheController, ControllerMessage, ControllerState, ControllerStatus,
    FetchOutcome, InstallReport, MessageReply, RequestClass, ResponseSource, ServedResponse,
};
pub use error::{CacheError, Result};
pub use network::{Fetcher, HttpFetcher};
pub use registration::Registration;
pub use request::{CapturedResponse, FetchRequest, RequestMode};

#[cfg(any(test, feature = "test-util"))]
pub use network::ScriptedFetcher;
