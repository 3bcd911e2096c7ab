//! SQLite-backed namespace store.

use super::traits::{CacheStats, NamespaceMeta, NamespaceStore, StoredEntry};
use crate::error::{CacheError, Result};
use crate::request::CapturedResponse;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// SQLite-based namespace store.
///
/// All namespaces share one database file, so cached pages survive a restart
/// of the proxy. Thread-safe via internal mutex on the connection.
pub struct SqliteStore {
    /// Database connection (wrapped for thread safety).
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) a store at the specified database path.
    ///
    /// Creates the parent directory and tables if they don't exist.
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CacheError::Io {
                message: format!("Failed to create cache directory: {}", e),
                path: Some(parent.to_path_buf()),
                source: Some(e),
            })?;
        }

        let conn = Connection::open(db_path).map_err(|e| CacheError::Database {
            message: format!("Failed to open cache database: {}", e),
            source: Some(e),
        })?;

        // Enable WAL mode for better concurrent access
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| CacheError::Database {
                message: format!("Failed to set pragmas: {}", e),
                source: Some(e),
            })?;

        Self::with_connection(conn)
    }

    /// Open a store backed by a private in-memory database.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| CacheError::Database {
            message: format!("Failed to open in-memory database: {}", e),
            source: Some(e),
        })?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| CacheError::Database {
            message: format!("Failed to lock database: {}", e),
            source: None,
        })
    }

    /// Initialize database schema.
    fn init_schema(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS cache_namespaces (
                name TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                seq INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS cache_entries (
                namespace TEXT NOT NULL
                    REFERENCES cache_namespaces(name) ON DELETE CASCADE,
                key TEXT NOT NULL,
                status INTEGER NOT NULL,
                headers TEXT NOT NULL,
                body BLOB NOT NULL,
                size_bytes INTEGER NOT NULL,
                stored_at TEXT NOT NULL,
                seq INTEGER NOT NULL,
                PRIMARY KEY (namespace, key)
            );

            CREATE INDEX IF NOT EXISTS idx_cache_entries_seq
                ON cache_entries(namespace, seq);
            "#,
        )
        .map_err(|e| CacheError::Database {
            message: format!("Failed to initialize cache schema: {}", e),
            source: Some(e),
        })?;

        Ok(())
    }

    fn ensure_namespace(conn: &Connection, namespace: &str) -> Result<()> {
        conn.execute(
            r#"
            INSERT OR IGNORE INTO cache_namespaces (name, created_at, seq)
            VALUES (?1, ?2, (SELECT COALESCE(MAX(seq), 0) + 1 FROM cache_namespaces))
            "#,
            params![namespace, Utc::now().to_rfc3339()],
        )
        .map_err(|e| CacheError::Database {
            message: format!("Failed to create namespace {}: {}", namespace, e),
            source: Some(e),
        })?;
        Ok(())
    }

    fn namespace_meta(conn: &Connection, namespace: &str) -> Result<Option<NamespaceMeta>> {
        let row: Option<(String, i64, i64)> = conn
            .query_row(
                r#"
                SELECT n.created_at, COUNT(e.key), COALESCE(SUM(e.size_bytes), 0)
                FROM cache_namespaces n
                LEFT JOIN cache_entries e ON e.namespace = n.name
                WHERE n.name = ?1
                GROUP BY n.name
                "#,
                params![namespace],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .map_err(|e| CacheError::Database {
                message: format!("Failed to get namespace metadata: {}", e),
                source: Some(e),
            })?;

        Ok(row.map(|(created_at, count, size)| NamespaceMeta {
            name: namespace.to_string(),
            entry_count: count as usize,
            total_size_bytes: size as u64,
            created_at: parse_timestamp(&created_at),
        }))
    }
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

impl NamespaceStore for SqliteStore {
    fn open(&self, namespace: &str) -> Result<()> {
        let conn = self.lock()?;
        Self::ensure_namespace(&conn, namespace)
    }

    fn has(&self, namespace: &str) -> Result<bool> {
        let conn = self.lock()?;
        let exists = conn
            .query_row(
                "SELECT 1 FROM cache_namespaces WHERE name = ?1",
                params![namespace],
                |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);
        Ok(exists)
    }

    fn namespaces(&self) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT name FROM cache_namespaces ORDER BY seq")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(names)
    }

    fn delete(&self, namespace: &str) -> Result<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let entries = tx.execute(
            "DELETE FROM cache_entries WHERE namespace = ?1",
            params![namespace],
        )?;
        let deleted = tx.execute(
            "DELETE FROM cache_namespaces WHERE name = ?1",
            params![namespace],
        )?;
        tx.commit()?;

        if deleted > 0 {
            debug!("Deleted namespace '{}' ({} entries)", namespace, entries);
        }
        Ok(deleted > 0)
    }

    fn get_entry(&self, namespace: &str, key: &str) -> Result<Option<StoredEntry>> {
        let conn = self.lock()?;

        let row: Option<(i64, String, Vec<u8>, String)> = conn
            .query_row(
                r#"
                SELECT status, headers, body, stored_at
                FROM cache_entries
                WHERE namespace = ?1 AND key = ?2
                "#,
                params![namespace, key],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()
            .map_err(|e| CacheError::Database {
                message: format!("Failed to query cache entry: {}", e),
                source: Some(e),
            })?;

        let Some((status, headers, body, stored_at)) = row else {
            return Ok(None);
        };

        let headers: Vec<(String, String)> = serde_json::from_str(&headers)?;
        Ok(Some(StoredEntry {
            response: CapturedResponse {
                status: status as u16,
                headers,
                body: body.into(),
            },
            stored_at: parse_timestamp(&stored_at),
        }))
    }

    fn put(&self, namespace: &str, key: &str, response: &CapturedResponse) -> Result<()> {
        let headers = serde_json::to_string(&response.headers)?;
        let mut conn = self.lock()?;

        // Namespace creation and the entry write commit together.
        let tx = conn.transaction()?;
        Self::ensure_namespace(&tx, namespace)?;
        tx.execute(
            r#"
            INSERT INTO cache_entries
            (namespace, key, status, headers, body, size_bytes, stored_at, seq)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7,
                (SELECT COALESCE(MAX(seq), 0) + 1 FROM cache_entries WHERE namespace = ?1))
            ON CONFLICT(namespace, key) DO UPDATE SET
                status = excluded.status,
                headers = excluded.headers,
                body = excluded.body,
                size_bytes = excluded.size_bytes,
                stored_at = excluded.stored_at
            "#,
            params![
                namespace,
                key,
                response.status as i64,
                headers,
                response.body.as_ref(),
                response.body.len() as i64,
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(|e| CacheError::Database {
            message: format!("Failed to set cache entry: {}", e),
            source: Some(e),
        })?;
        tx.commit()?;

        Ok(())
    }

    fn remove(&self, namespace: &str, key: &str) -> Result<bool> {
        let conn = self.lock()?;
        let deleted = conn.execute(
            "DELETE FROM cache_entries WHERE namespace = ?1 AND key = ?2",
            params![namespace, key],
        )?;
        Ok(deleted > 0)
    }

    fn keys(&self, namespace: &str) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT key FROM cache_entries WHERE namespace = ?1 ORDER BY seq")?;
        let keys = stmt
            .query_map(params![namespace], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(keys)
    }

    fn get_namespace_meta(&self, namespace: &str) -> Result<Option<NamespaceMeta>> {
        let conn = self.lock()?;
        Self::namespace_meta(&conn, namespace)
    }

    fn get_stats(&self) -> Result<CacheStats> {
        let names = self.namespaces()?;
        let conn = self.lock()?;
        let mut namespaces = Vec::with_capacity(names.len());
        for name in names {
            if let Some(meta) = Self::namespace_meta(&conn, &name)? {
                namespaces.push(meta);
            }
        }
        Ok(CacheStats::from_namespaces(namespaces))
    }

    fn clear_all(&self) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM cache_entries", [])?;
        let deleted = tx.execute("DELETE FROM cache_namespaces", [])?;
        tx.commit()?;

        debug!("Cleared all cache namespaces ({})", deleted);
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (TempDir, SqliteStore) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test_cache.sqlite");
        let store = SqliteStore::new(&db_path).unwrap();
        (temp_dir, store)
    }

    fn json_response(body: &'static str) -> CapturedResponse {
        CapturedResponse::new(200, body)
            .with_header("Content-Type", "application/json")
            .with_header("Cache-Control", "no-cache")
    }

    #[test]
    fn test_round_trip_is_byte_identical() {
        let (_temp, store) = create_test_store();
        let response = CapturedResponse::new(203, vec![0u8, 159, 146, 150, 255])
            .with_header("X-B", "2")
            .with_header("x-a", "1")
            .with_header("X-B", "3");

        store.put("ns", "GET http://h/blob", &response).unwrap();
        let back = store.get("ns", "GET http://h/blob").unwrap().unwrap();

        assert_eq!(back, response);
    }

    #[test]
    fn test_namespace_isolation() {
        let (_temp, store) = create_test_store();

        store.put("ns1", "shared_key", &json_response("[1]")).unwrap();
        store.put("ns2", "shared_key", &json_response("[2]")).unwrap();

        assert_eq!(store.get("ns1", "shared_key").unwrap().unwrap().body, "[1]");
        assert_eq!(store.get("ns2", "shared_key").unwrap().unwrap().body, "[2]");
    }

    #[test]
    fn test_open_is_idempotent() {
        let (_temp, store) = create_test_store();
        store.open("screener-static-v1").unwrap();
        store.open("screener-data-v1").unwrap();
        store.open("screener-static-v1").unwrap();

        assert_eq!(
            store.namespaces().unwrap(),
            vec!["screener-static-v1", "screener-data-v1"]
        );
    }

    #[test]
    fn test_delete_removes_entries() {
        let (_temp, store) = create_test_store();
        store.put("old", "k1", &json_response("{}")).unwrap();
        store.put("old", "k2", &json_response("{}")).unwrap();
        store.put("new", "k1", &json_response("{}")).unwrap();

        assert!(store.delete("old").unwrap());
        assert!(!store.has("old").unwrap());
        assert!(store.get("old", "k1").unwrap().is_none());
        assert!(store.keys("old").unwrap().is_empty());
        assert!(store.get("new", "k1").unwrap().is_some());

        // Re-creating the namespace starts empty.
        store.open("old").unwrap();
        assert_eq!(store.get_namespace_meta("old").unwrap().unwrap().entry_count, 0);
    }

    #[test]
    fn test_replace_keeps_key_position() {
        let (_temp, store) = create_test_store();
        store.put("ns", "a", &json_response("1")).unwrap();
        store.put("ns", "b", &json_response("2")).unwrap();
        store.put("ns", "a", &json_response("3")).unwrap();

        assert_eq!(store.keys("ns").unwrap(), vec!["a", "b"]);
        assert_eq!(store.get("ns", "a").unwrap().unwrap().body, "3");
    }

    #[test]
    fn test_stats() {
        let (_temp, store) = create_test_store();
        store.put("ns1", "key1", &json_response("12345")).unwrap();
        store.put("ns1", "key2", &json_response("67890")).unwrap();
        store.put("ns2", "key1", &json_response("abcde")).unwrap();

        let stats = store.get_stats().unwrap();
        assert_eq!(stats.total_entries, 3);
        assert_eq!(stats.total_size_bytes, 15);
        assert_eq!(stats.namespace_count, 2);
        assert_eq!(stats.namespaces[0].name, "ns1");
    }

    #[test]
    fn test_clear_all() {
        let (_temp, store) = create_test_store();
        store.put("ns1", "k", &json_response("{}")).unwrap();
        store.open("ns2").unwrap();

        assert_eq!(store.clear_all().unwrap(), 2);
        assert!(store.namespaces().unwrap().is_empty());
    }

    #[test]
    fn test_persists_across_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("cache.sqlite");

        {
            let store = SqliteStore::new(&db_path).unwrap();
            store.put("ns", "GET /", &json_response("home")).unwrap();
        }

        let store = SqliteStore::new(&db_path).unwrap();
        assert_eq!(store.get("ns", "GET /").unwrap().unwrap().body, "home");
    }
}
