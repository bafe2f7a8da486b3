//! Schema migrations for the agent database.
//!
//! The schema is created and upgraded from SQL files embedded at compile
//! time, each applied inside its own transaction and recorded in
//! `_switchboard_migrations` so it runs once per database.

use std::collections::HashSet;

use rusqlite::Connection;
use thiserror::Error;

/// Ordered schema history. Append-only.
const MIGRATIONS: &[(&str, &str)] = &[
    ("000_intents", include_str!("migrations/000_intents.sql")),
    ("001_segments", include_str!("migrations/001_segments.sql")),
    ("002_cache_entries", include_str!("migrations/002_cache_entries.sql")),
    ("003_agent_usage", include_str!("migrations/003_agent_usage.sql")),
];

/// Errors raised while migrating the schema.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// The tracking table could not be created or read.
    #[error("failed to read migration history: {0}")]
    History(#[from] rusqlite::Error),

    /// One migration failed; its changes were rolled back.
    #[error("migration '{name}' failed: {source}")]
    Apply {
        /// The migration that failed.
        name: &'static str,
        /// The underlying SQLite error.
        source: rusqlite::Error,
    },
}

/// Brings the connected database up to the current schema.
///
/// Returns the names of the migrations applied by this call, in order;
/// an up-to-date database yields an empty list.
///
/// # Errors
///
/// Returns [`MigrationError::Apply`] if a migration fails (its partial
/// changes are rolled back) or [`MigrationError::History`] if the tracking
/// table cannot be read.
pub fn run_migrations(conn: &Connection) -> Result<Vec<&'static str>, MigrationError> {
    apply_pending(conn, MIGRATIONS)
}

fn apply_pending(
    conn: &Connection,
    migrations: &[(&'static str, &'static str)],
) -> Result<Vec<&'static str>, MigrationError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _switchboard_migrations (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let history: HashSet<String> = conn
        .prepare("SELECT name FROM _switchboard_migrations")?
        .query_map([], |row| row.get(0))?
        .collect::<Result<_, _>>()?;

    let mut applied = Vec::new();
    for &(name, sql) in migrations {
        if history.contains(name) {
            continue;
        }
        tracing::info!(migration = name, "applying migration");
        apply_one(conn, name, sql).map_err(|source| MigrationError::Apply { name, source })?;
        applied.push(name);
    }

    Ok(applied)
}

fn apply_one(conn: &Connection, name: &str, sql: &str) -> rusqlite::Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(sql)?;
    tx.execute(
        "INSERT INTO _switchboard_migrations (name) VALUES (?1)",
        [name],
    )?;
    tx.commit()
}
