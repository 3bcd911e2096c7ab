//! Namespace store trait and types.

use crate::error::Result;
use crate::request::CapturedResponse;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored response with its metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    pub response: CapturedResponse,
    /// When the response was written.
    pub stored_at: DateTime<Utc>,
}

impl StoredEntry {
    /// Bytes the entry occupies (body only).
    pub fn size_bytes(&self) -> u64 {
        self.response.body.len() as u64
    }
}

/// Metadata about a cache namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceMeta {
    /// Namespace name.
    pub name: String,
    /// Number of entries in this namespace.
    pub entry_count: usize,
    /// Total body size of all entries in bytes.
    pub total_size_bytes: u64,
    /// When the namespace was created.
    pub created_at: DateTime<Utc>,
}

/// Statistics across all namespaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Total number of entries across all namespaces.
    pub total_entries: usize,
    /// Total body size of all cached data in bytes.
    pub total_size_bytes: u64,
    /// Number of namespaces.
    pub namespace_count: usize,
    /// Per-namespace statistics, oldest namespace first.
    pub namespaces: Vec<NamespaceMeta>,
}

impl CacheStats {
    /// Fold per-namespace metadata into totals.
    pub fn from_namespaces(namespaces: Vec<NamespaceMeta>) -> Self {
        Self {
            total_entries: namespaces.iter().map(|m| m.entry_count).sum(),
            total_size_bytes: namespaces.iter().map(|m| m.total_size_bytes).sum(),
            namespace_count: namespaces.len(),
            namespaces,
        }
    }
}

/// Named key-value partitions holding captured responses.
///
/// Keys are normalized request keys (see [`crate::request::cache_key`]).
/// Implementations must make `put` atomic per key: a concurrent or later
/// reader sees either the previous entry or the complete new one.
/// All operations are synchronous to match rusqlite's API.
pub trait NamespaceStore: Send + Sync {
    /// Create the namespace if it does not exist yet.
    fn open(&self, namespace: &str) -> Result<()>;

    /// Whether a namespace with this name exists.
    fn has(&self, namespace: &str) -> Result<bool>;

    /// Names of all existing namespaces, oldest first.
    fn namespaces(&self) -> Result<Vec<String>>;

    /// Delete a namespace and all of its entries.
    ///
    /// Returns `false` if it did not exist.
    fn delete(&self, namespace: &str) -> Result<bool>;

    /// Look up an entry with its metadata.
    ///
    /// A missing namespace is a miss, not an error.
    fn get_entry(&self, namespace: &str, key: &str) -> Result<Option<StoredEntry>>;

    /// Look up a stored response.
    fn get(&self, namespace: &str, key: &str) -> Result<Option<CapturedResponse>> {
        Ok(self.get_entry(namespace, key)?.map(|entry| entry.response))
    }

    /// Store a response, replacing any entry under the same key.
    ///
    /// Creates the namespace if needed.
    fn put(&self, namespace: &str, key: &str, response: &CapturedResponse) -> Result<()>;

    /// Remove a single entry.
    fn remove(&self, namespace: &str, key: &str) -> Result<bool>;

    /// Keys stored in a namespace, in insertion order.
    fn keys(&self, namespace: &str) -> Result<Vec<String>>;

    /// Metadata for one namespace.
    fn get_namespace_meta(&self, namespace: &str) -> Result<Option<NamespaceMeta>>;

    /// Statistics across all namespaces.
    fn get_stats(&self) -> Result<CacheStats>;

    /// Delete every namespace. Returns how many were deleted.
    fn clear_all(&self) -> Result<usize> {
        let mut deleted = 0;
        for name in self.namespaces()? {
            if self.delete(&name)? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}
