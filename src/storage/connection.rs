//! Database connection management for the progress store
//!
//! The store file is shipped whole by the transport, so the default
//! cloud-safe mode keeps it self-contained (DELETE journal). Local mode uses
//! WAL and must be checkpointed before the file leaves the device.

use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::sync::Arc;

use super::migrations::run_migrations;
use crate::error::Result;
use crate::types::{StorageMode, SyncConfig};

/// Storage engine wrapping the local SQLite store
pub struct Storage {
    db_path: String,
    storage_mode: StorageMode,
    conn: Arc<Mutex<Connection>>,
}

impl Storage {
    /// Open or create the store described by `config`
    pub fn open(config: &SyncConfig) -> Result<Self> {
        Self::open_path(&config.store_path, config.storage_mode)
    }

    /// Open or create the store at `db_path`
    pub fn open_path(db_path: &str, storage_mode: StorageMode) -> Result<Self> {
        let conn = Self::create_connection(db_path, storage_mode)?;

        run_migrations(&conn)?;

        Ok(Self {
            db_path: db_path.to_string(),
            storage_mode,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory store (for testing)
    pub fn open_in_memory() -> Result<Self> {
        Self::open_path(":memory:", StorageMode::CloudSafe)
    }

    /// Create a new connection with appropriate pragmas
    fn create_connection(db_path: &str, mode: StorageMode) -> Result<Connection> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = if db_path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            // Ensure parent directory exists
            if let Some(parent) = Path::new(db_path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            Connection::open_with_flags(db_path, flags)?
        };

        Self::configure_pragmas(&conn, mode)?;

        Ok(conn)
    }

    /// Configure SQLite pragmas based on storage mode
    fn configure_pragmas(conn: &Connection, mode: StorageMode) -> Result<()> {
        match mode {
            StorageMode::Local => {
                conn.execute_batch(
                    r#"
                    PRAGMA journal_mode=WAL;
                    PRAGMA synchronous=NORMAL;
                    PRAGMA busy_timeout=30000;
                    PRAGMA temp_store=MEMORY;
                    "#,
                )?;
            }
            StorageMode::CloudSafe => {
                // Single-file mode: the transport copies the file as-is
                conn.execute_batch(
                    r#"
                    PRAGMA journal_mode=DELETE;
                    PRAGMA synchronous=FULL;
                    PRAGMA busy_timeout=30000;
                    PRAGMA temp_store=MEMORY;
                    "#,
                )?;
            }
        }
        Ok(())
    }

    /// Execute a function with the connection
    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }

    /// Execute a function with a transaction
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    /// Get current storage mode
    pub fn storage_mode(&self) -> StorageMode {
        self.storage_mode
    }

    /// Get database path
    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    /// Whether the store lives in memory and cannot be handed to a transport
    pub fn is_in_memory(&self) -> bool {
        self.db_path == ":memory:"
    }

    /// Fold the WAL into the main file (local mode only)
    pub fn checkpoint(&self) -> Result<()> {
        if self.storage_mode == StorageMode::Local && !self.is_in_memory() {
            let conn = self.conn.lock();
            conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        }
        Ok(())
    }
}

impl Clone for Storage {
    fn clone(&self) -> Self {
        Self {
            db_path: self.db_path.clone(),
            storage_mode: self.storage_mode,
            conn: self.conn.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory() {
        let storage = Storage::open_in_memory().unwrap();
        assert_eq!(storage.db_path(), ":memory:");
        assert!(storage.is_in_memory());
    }

    #[test]
    fn test_storage_modes() {
        let dir = tempfile::tempdir().unwrap();

        let path = dir.path().join("wal.sqlite3");
        let storage = Storage::open_path(path.to_str().unwrap(), StorageMode::Local).unwrap();
        assert_eq!(storage.storage_mode(), StorageMode::Local);
        let journal: String = storage
            .with_connection(|conn| Ok(conn.query_row("PRAGMA journal_mode", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(journal, "wal");
        storage.checkpoint().unwrap();

        let path = dir.path().join("single.sqlite3");
        let storage = Storage::open_path(path.to_str().unwrap(), StorageMode::CloudSafe).unwrap();
        let journal: String = storage
            .with_connection(|conn| Ok(conn.query_row("PRAGMA journal_mode", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(journal, "delete");
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("progress.sqlite3");
        let config = SyncConfig::new(path.to_str().unwrap());

        Storage::open(&config).unwrap();
        assert!(path.exists());
    }
}
