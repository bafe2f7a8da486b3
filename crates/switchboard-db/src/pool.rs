//! SQLite connection pooling.
//!
//! Every pipeline component shares one pool over the agent database. WAL
//! keeps concurrent call workers from serializing reads behind cache
//! writes; the busy timeout covers the brief write locks the hit counters
//! take.

use std::path::Path;
use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::OpenFlags;
use thiserror::Error;

/// The shared SQLite connection pool.
pub type DbPool = Pool<SqliteConnectionManager>;

/// Pool sizing and lock-contention tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    /// How long a connection waits on a locked database before failing,
    /// in milliseconds.
    pub busy_timeout_ms: u64,

    /// Upper bound on pooled connections. One per concurrent call worker
    /// is plenty; synthesis, not the database, is the bottleneck.
    pub max_connections: u32,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 3_000,
            max_connections: 16,
        }
    }
}

/// Errors raised while opening the agent database.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The pool could not be built or a first connection could not open.
    #[error("failed to open agent database: {0}")]
    Open(#[from] r2d2::Error),
}

/// Opens the agent database and returns a pool over it.
///
/// Every connection comes up in WAL mode with foreign keys enforced and
/// the configured busy timeout. Use `:memory:` only for single-connection
/// tests; each pooled in-memory connection sees its own database.
///
/// # Errors
///
/// Returns [`PoolError::Open`] if the database cannot be opened or a
/// connection pragma is rejected.
pub fn create_pool(db_path: impl AsRef<Path>, settings: PoolSettings) -> Result<DbPool, PoolError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;

    let busy_timeout = Duration::from_millis(settings.busy_timeout_ms);
    let manager = SqliteConnectionManager::file(db_path.as_ref())
        .with_flags(flags)
        .with_init(move |conn| {
            // In-memory databases report "memory" and cannot enter WAL.
            let mode: String =
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
            if mode != "wal" && mode != "memory" {
                return Err(rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
                    Some(format!("journal_mode pragma rejected WAL, got: {mode}")),
                ));
            }
            conn.pragma_update(None, "foreign_keys", true)?;
            conn.busy_timeout(busy_timeout)
        });

    let pool = Pool::builder()
        .max_size(settings.max_connections)
        .build(manager)?;

    Ok(pool)
}
