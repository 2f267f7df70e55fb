//! Pooled SQLite connections.
//!
//! Every connection gets WAL journaling, foreign keys, and a busy timeout on
//! open. In-memory pools use a uniquely named shared-cache database so all
//! pooled connections see the same data.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::OpenFlags;

use crate::errors::Result;

/// Pool of SQLite connections.
pub type ConnectionPool = r2d2::Pool<SqliteConnectionManager>;
/// A connection checked out of the pool.
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Pool sizing and timeout configuration.
#[derive(Clone, Copy, Debug)]
pub struct ConnectionConfig {
    /// Maximum pooled connections.
    pub max_size: u32,
    /// SQLite busy timeout per connection, in milliseconds.
    pub busy_timeout_ms: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_size: 8,
            busy_timeout_ms: 5000,
        }
    }
}

fn with_pragmas(
    manager: SqliteConnectionManager,
    busy_timeout_ms: u32,
) -> SqliteConnectionManager {
    manager.with_init(move |conn| {
        conn.execute_batch(&format!(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = {busy_timeout_ms};"
        ))
    })
}

/// Open a pool over a database file, creating it if absent.
pub fn new_file(path: impl AsRef<Path>, config: &ConnectionConfig) -> Result<ConnectionPool> {
    let manager = with_pragmas(
        SqliteConnectionManager::file(path.as_ref()),
        config.busy_timeout_ms,
    );
    Ok(r2d2::Pool::builder()
        .max_size(config.max_size)
        .build(manager)?)
}

/// Distinguishes concurrently open in-memory databases within one process.
static MEMORY_DB_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Open a pool over a fresh in-memory database (shared across the pool).
pub fn new_in_memory(config: &ConnectionConfig) -> Result<ConnectionPool> {
    let name = format!(
        "file:plank_mem_{}?mode=memory&cache=shared",
        MEMORY_DB_COUNTER.fetch_add(1, Ordering::Relaxed)
    );
    let flags = OpenFlags::default() | OpenFlags::SQLITE_OPEN_URI;
    let manager = with_pragmas(
        SqliteConnectionManager::file(&name).with_flags(flags),
        config.busy_timeout_ms,
    );
    Ok(r2d2::Pool::builder()
        .max_size(config.max_size)
        .build(manager)?)
}
