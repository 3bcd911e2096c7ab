//! Cache namespaces.
//!
//! A namespace is a named, independent partition mapping normalized request
//! keys to captured responses. Two backends implement [`NamespaceStore`]:
//! - [`MemoryStore`] for a process-local cache
//! - [`SqliteStore`] for a cache that survives restarts

mod memory;
mod sqlite;
mod traits;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{CacheStats, NamespaceMeta, NamespaceStore, StoredEntry};
