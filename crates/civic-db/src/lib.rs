pub mod citizens;
pub mod counter;
pub mod error;
pub mod migrations;
pub mod models;
pub mod queries;

use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tracing::info;

pub use counter::IdAllocator;
pub use error::{Result, StoreError};

#[derive(Debug, Clone, Copy)]
pub struct DbOptions {
    /// How long SQLite waits on a locked database before returning BUSY.
    pub busy_timeout: Duration,
    /// Total attempts for an ID allocation that keeps hitting BUSY.
    pub alloc_attempts: u32,
}

impl Default for DbOptions {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_secs(30),
            alloc_attempts: 3,
        }
    }
}

/// Handle on the identity store. Several handles may point at the same file;
/// cross-handle consistency comes from SQLite's own locking.
pub struct Database {
    conn: Mutex<Connection>,
    alloc_attempts: u32,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with(path, DbOptions::default())
    }

    pub fn open_with(path: &Path, options: DbOptions) -> Result<Self> {
        let mut conn = Connection::open(path)?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::configure(&mut conn, options)?;

        info!("Database opened at {}", path.display());
        Ok(Self::from_conn(conn, options))
    }

    pub fn open_in_memory() -> Result<Self> {
        let options = DbOptions::default();
        let mut conn = Connection::open_in_memory()?;
        Self::configure(&mut conn, options)?;
        Ok(Self::from_conn(conn, options))
    }

    fn configure(conn: &mut Connection, options: DbOptions) -> Result<()> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(options.busy_timeout)?;
        migrations::run(conn)
    }

    fn from_conn(conn: Connection, options: DbOptions) -> Self {
        Self {
            conn: Mutex::new(conn),
            alloc_attempts: options.alloc_attempts.max(1),
        }
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        f(&conn)
    }

    /// Mutable access, needed to open a `rusqlite::Transaction`.
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        f(&mut conn)
    }
}
