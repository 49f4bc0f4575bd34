//! Device-local key-value persistence.
//!
//! Tables:
//! - `kv`: key, value, updated_at
//!
//! Holds small string values that must survive app restarts, such as the
//! external API token. Values are read, overwritten or deleted; never appended.

use parking_lot::Mutex;
use rusqlite::OptionalExtension;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Failure of the device-local store.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("failed to prepare storage directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// String-valued key-value store with single-entry semantics per key.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Insert or overwrite.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Delete the entry. Returns whether anything was removed.
    fn remove(&self, key: &str) -> Result<bool, StorageError>;
}

/// SQLite-backed key-value store.
pub struct SqliteKvStore {
    conn: Mutex<rusqlite::Connection>,
}

impl SqliteKvStore {
    /// Open (or create) the store at the given path, creating parent directories.
    pub fn open(db_path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StorageError::Directory {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = rusqlite::Connection::open(db_path)?;

        // WAL mode for concurrent reads + crash safety
        let _mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::init_tables(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (for tests).
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = rusqlite::Connection::open_in_memory()?;
        Self::init_tables(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_tables(conn: &rusqlite::Connection) -> Result<(), StorageError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );",
        )?;
        Ok(())
    }
}

impl KeyValueStore for SqliteKvStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let conn = self.conn.lock();
        let value = conn
            .query_row(
                "SELECT value FROM kv WHERE key = ?1",
                rusqlite::params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let now = epoch_secs() as i64;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at",
            rusqlite::params![key, value, now],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, StorageError> {
        let conn = self.conn.lock();
        let deleted = conn.execute("DELETE FROM kv WHERE key = ?1", rusqlite::params![key])?;
        Ok(deleted > 0)
    }
}

/// In-memory key-value store.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.entries.lock().remove(key).is_some())
    }
}

/// Store whose every operation fails.
#[cfg(test)]
pub(crate) struct BrokenKvStore;

#[cfg(test)]
impl KeyValueStore for BrokenKvStore {
    fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Err(StorageError::Unavailable("disk detached".into()))
    }

    fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
        Err(StorageError::Unavailable("disk detached".into()))
    }

    fn remove(&self, _key: &str) -> Result<bool, StorageError> {
        Err(StorageError::Unavailable("disk detached".into()))
    }
}

/// Current Unix epoch in seconds.
fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store() -> (TempDir, SqliteKvStore) {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("jitcall.db");
        let store = SqliteKvStore::open(&db_path).unwrap();
        (tmp, store)
    }

    #[test]
    fn set_and_get() {
        let (_tmp, store) = test_store();
        assert_eq!(store.get("token").unwrap(), None);

        store.set("token", "T1").unwrap();
        assert_eq!(store.get("token").unwrap().as_deref(), Some("T1"));
    }

    #[test]
    fn set_overwrites_single_entry() {
        let (_tmp, store) = test_store();
        store.set("token", "T1").unwrap();
        store.set("token", "T2").unwrap();
        assert_eq!(store.get("token").unwrap().as_deref(), Some("T2"));

        let conn = store.conn.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM kv", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn remove_is_idempotent() {
        let (_tmp, store) = test_store();
        store.set("token", "T1").unwrap();
        assert!(store.remove("token").unwrap());
        assert!(!store.remove("token").unwrap());
        assert_eq!(store.get("token").unwrap(), None);
    }

    #[test]
    fn value_survives_reopen() {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("nested").join("jitcall.db");
        {
            let store = SqliteKvStore::open(&db_path).unwrap();
            store.set("token", "T1").unwrap();
        }
        let reopened = SqliteKvStore::open(&db_path).unwrap();
        assert_eq!(reopened.get("token").unwrap().as_deref(), Some("T1"));
    }

    #[test]
    fn in_memory_sqlite_store() {
        let store = SqliteKvStore::in_memory().unwrap();
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
        assert!(store.remove("k").unwrap());
    }

    #[test]
    fn memory_store_roundtrip() {
        let store = MemoryKvStore::new();
        store.set("k", "v1").unwrap();
        store.set("k", "v2").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v2"));
        assert!(store.remove("k").unwrap());
        assert!(!store.remove("k").unwrap());
    }

    #[test]
    fn broken_store_reports_errors() {
        let store = BrokenKvStore;
        assert!(store.get("k").is_err());
        assert!(store.set("k", "v").is_err());
        assert!(store.remove("k").is_err());
    }
}
