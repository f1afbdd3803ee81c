//! Embedded SQLite state: client records and tenant-scoped config KV.
//!
//! One database file holds both tables. Access goes through a shared
//! connection guarded by a mutex; statements are short and the busy timeout
//! covers writer contention.

use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use vectorgate_core::{GateError, GateResult};

const BUSY_TIMEOUT_MS: u64 = 5_000;

/// Shared handle to the embedded relational store.
#[derive(Clone)]
pub struct StateDb {
    conn: Arc<Mutex<Connection>>,
}

impl StateDb {
    /// Open (or create) the database at `path` and initialize the schema.
    pub fn open(path: &Path) -> GateResult<Self> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir).map_err(|e| {
                    GateError::Configuration(format!(
                        "cannot create state directory {}: {e}",
                        dir.display()
                    ))
                })?;
            }
        }
        let conn = Connection::open(path).map_err(|e| {
            GateError::Configuration(format!("cannot open state db {}: {e}", path.display()))
        })?;
        conn.busy_timeout(std::time::Duration::from_millis(BUSY_TIMEOUT_MS))
            .map_err(|e| GateError::Configuration(format!("cannot set busy timeout: {e}")))?;
        conn.pragma_update(None, "journal_mode", "wal")
            .map_err(|e| GateError::Configuration(format!("cannot enable WAL: {e}")))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.init_schema()?;
        Ok(db)
    }

    /// Open an in-memory database (tests).
    pub fn open_in_memory() -> GateResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| GateError::Configuration(format!("cannot open in-memory db: {e}")))?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> GateResult<()> {
        self.with(|conn| {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS clients (
                     username TEXT PRIMARY KEY,
                     hashed_secret TEXT NOT NULL,
                     encrypted_secret TEXT NOT NULL,
                     fingerprint TEXT NOT NULL,
                     tenant_code TEXT NOT NULL DEFAULT '',
                     actions TEXT NOT NULL DEFAULT '[]',
                     created_at TEXT NOT NULL DEFAULT (datetime('now')),
                     last_used_at TEXT
                 );
                 CREATE INDEX IF NOT EXISTS idx_clients_tenant ON clients(tenant_code);
                 CREATE TABLE IF NOT EXISTS config_kv (
                     key TEXT NOT NULL,
                     tenant_code TEXT NOT NULL DEFAULT '',
                     value TEXT NOT NULL,
                     encrypted INTEGER NOT NULL DEFAULT 0,
                     PRIMARY KEY(key, tenant_code)
                 );",
            )
        })
    }

    /// Run `f` against the connection, mapping sqlite errors to the taxonomy.
    pub fn with<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> GateResult<T> {
        let conn = self.conn.lock();
        f(&conn).map_err(map_sqlite_error)
    }
}

fn map_sqlite_error(e: rusqlite::Error) -> GateError {
    match e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            GateError::AlreadyExists("record already exists".to_string())
        }
        rusqlite::Error::QueryReturnedNoRows => GateError::NotFound("record not found".to_string()),
        other => GateError::Internal(format!("state db error: {other}")),
    }
}
