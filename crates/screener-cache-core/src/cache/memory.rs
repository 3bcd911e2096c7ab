//! In-memory namespace store.

use super::traits::{CacheStats, NamespaceMeta, NamespaceStore, StoredEntry};
use crate::error::{CacheError, Result};
use crate::request::CapturedResponse;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;

struct Namespace {
    created_at: DateTime<Utc>,
    /// Creation sequence, orders namespaces created within the same instant.
    seq: u64,
    entries: HashMap<String, StoredEntry>,
    /// Keys in first-insertion order.
    order: Vec<String>,
}

impl Namespace {
    fn meta(&self, name: &str) -> NamespaceMeta {
        NamespaceMeta {
            name: name.to_string(),
            entry_count: self.entries.len(),
            total_size_bytes: self.entries.values().map(StoredEntry::size_bytes).sum(),
            created_at: self.created_at,
        }
    }
}

#[derive(Default)]
struct Inner {
    namespaces: HashMap<String, Namespace>,
    next_seq: u64,
}

impl Inner {
    fn open(&mut self, name: &str) -> &mut Namespace {
        let seq = self.next_seq;
        let namespace = self.namespaces.entry(name.to_string()).or_insert_with(|| Namespace {
            created_at: Utc::now(),
            seq,
            entries: HashMap::new(),
            order: Vec::new(),
        });
        if namespace.seq == seq {
            self.next_seq += 1;
        }
        namespace
    }

    fn sorted_names(&self) -> Vec<String> {
        let mut names: Vec<(&String, u64)> = self
            .namespaces
            .iter()
            .map(|(name, ns)| (name, ns.seq))
            .collect();
        names.sort_by_key(|(_, seq)| *seq);
        names.into_iter().map(|(name, _)| name.clone()).collect()
    }
}

/// Process-local store. Contents are lost when the process exits.
///
/// A single `RwLock` guards all namespaces, so every put is atomic.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|e| CacheError::Other(format!("Memory store lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|e| CacheError::Other(format!("Memory store lock poisoned: {}", e)))
    }
}

impl NamespaceStore for MemoryStore {
    fn open(&self, namespace: &str) -> Result<()> {
        self.write()?.open(namespace);
        Ok(())
    }

    fn has(&self, namespace: &str) -> Result<bool> {
        Ok(self.read()?.namespaces.contains_key(namespace))
    }

    fn namespaces(&self) -> Result<Vec<String>> {
        Ok(self.read()?.sorted_names())
    }

    fn delete(&self, namespace: &str) -> Result<bool> {
        Ok(self.write()?.namespaces.remove(namespace).is_some())
    }

    fn get_entry(&self, namespace: &str, key: &str) -> Result<Option<StoredEntry>> {
        let inner = self.read()?;
        Ok(inner
            .namespaces
            .get(namespace)
            .and_then(|ns| ns.entries.get(key))
            .cloned())
    }

    fn put(&self, namespace: &str, key: &str, response: &CapturedResponse) -> Result<()> {
        let mut inner = self.write()?;
        let ns = inner.open(namespace);
        let entry = StoredEntry {
            response: response.clone(),
            stored_at: Utc::now(),
        };
        if ns.entries.insert(key.to_string(), entry).is_none() {
            ns.order.push(key.to_string());
        }
        Ok(())
    }

    fn remove(&self, namespace: &str, key: &str) -> Result<bool> {
        let mut inner = self.write()?;
        let Some(ns) = inner.namespaces.get_mut(namespace) else {
            return Ok(false);
        };
        let removed = ns.entries.remove(key).is_some();
        if removed {
            ns.order.retain(|k| k != key);
        }
        Ok(removed)
    }

    fn keys(&self, namespace: &str) -> Result<Vec<String>> {
        let inner = self.read()?;
        Ok(inner
            .namespaces
            .get(namespace)
            .map(|ns| ns.order.clone())
            .unwrap_or_default())
    }

    fn get_namespace_meta(&self, namespace: &str) -> Result<Option<NamespaceMeta>> {
        let inner = self.read()?;
        Ok(inner.namespaces.get(namespace).map(|ns| ns.meta(namespace)))
    }

    fn get_stats(&self) -> Result<CacheStats> {
        let inner = self.read()?;
        let namespaces = inner
            .sorted_names()
            .iter()
            .filter_map(|name| inner.namespaces.get(name).map(|ns| ns.meta(name)))
            .collect();
        Ok(CacheStats::from_namespaces(namespaces))
    }

    fn clear_all(&self) -> Result<usize> {
        let mut inner = self.write()?;
        let count = inner.namespaces.len();
        inner.namespaces.clear();
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(body: &'static str) -> CapturedResponse {
        CapturedResponse::new(200, body).with_header("content-type", "text/plain")
    }

    #[test]
    fn test_put_and_get() {
        let store = MemoryStore::new();
        store.put("ns", "GET /a", &response("alpha")).unwrap();

        let value = store.get("ns", "GET /a").unwrap().unwrap();
        assert_eq!(value, response("alpha"));
    }

    #[test]
    fn test_missing_namespace_is_a_miss() {
        let store = MemoryStore::new();
        assert!(store.get("absent", "GET /a").unwrap().is_none());
        assert!(!store.has("absent").unwrap());
    }

    #[test]
    fn test_namespaces_listed_in_creation_order() {
        let store = MemoryStore::new();
        store.open("b").unwrap();
        store.open("a").unwrap();
        store.put("c", "k", &response("x")).unwrap();
        store.open("b").unwrap();

        assert_eq!(store.namespaces().unwrap(), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_put_replaces_and_keeps_key_order() {
        let store = MemoryStore::new();
        store.put("ns", "k1", &response("one")).unwrap();
        store.put("ns", "k2", &response("two")).unwrap();
        store.put("ns", "k1", &response("uno")).unwrap();

        assert_eq!(store.keys("ns").unwrap(), vec!["k1", "k2"]);
        assert_eq!(store.get("ns", "k1").unwrap().unwrap().body, "uno");
    }

    #[test]
    fn test_delete_and_clear() {
        let store = MemoryStore::new();
        store.put("ns1", "k", &response("x")).unwrap();
        store.put("ns2", "k", &response("y")).unwrap();

        assert!(store.delete("ns1").unwrap());
        assert!(!store.delete("ns1").unwrap());
        assert_eq!(store.clear_all().unwrap(), 1);
        assert!(store.namespaces().unwrap().is_empty());
    }

    #[test]
    fn test_stats() {
        let store = MemoryStore::new();
        store.put("ns1", "k1", &response("12345")).unwrap();
        store.put("ns1", "k2", &response("67890")).unwrap();
        store.put("ns2", "k1", &response("abcde")).unwrap();
        store.open("empty").unwrap();

        let stats = store.get_stats().unwrap();
        assert_eq!(stats.total_entries, 3);
        assert_eq!(stats.total_size_bytes, 15);
        assert_eq!(stats.namespace_count, 3);
        assert_eq!(stats.namespaces[2].entry_count, 0);
    }

    #[test]
    fn test_remove_entry() {
        let store = MemoryStore::new();
        store.put("ns", "k1", &response("a")).unwrap();
        assert!(store.remove("ns", "k1").unwrap());
        assert!(!store.remove("ns", "k1").unwrap());
        assert!(store.keys("ns").unwrap().is_empty());
        assert!(store.has("ns").unwrap());
    }
}
