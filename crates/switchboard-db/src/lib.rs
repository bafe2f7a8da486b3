//! Database layer for the Switchboard IVR platform.
//!
//! Provides SQLite connection pooling (via `r2d2`), WAL-mode
//! initialization, embedded SQL migrations, and the row-level repository
//! for intents, templates, segments, cache entries, and per-agent usage
//! counters. Every table is created through versioned migrations managed
//! by this crate.
//!
//! # Design decisions
//!
//! - **SQLite with WAL mode**: concurrent readers with a single writer,
//!   which matches the access pattern of many call contexts reading the
//!   cache while at most one synthesis lands a new row per key.
//! - **`r2d2` connection pool**: bounded connection reuse without manual
//!   lifetime management.
//! - **Embedded migrations**: SQL files are compiled into the binary via
//!   `include_str!`, so the schema ships with the code that depends on it.
//! - **Atomic counters**: `hit_count`, `total_cost_saved`, and friends are
//!   only ever updated with single-statement `SET x = x + ?` forms, never
//!   read-modify-write in application memory, because multiple call
//!   workers touch the same rows.

mod migrations;
mod pool;
pub mod repo;

pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool, DbPool, PoolError, PoolSettings};
pub use repo::{CacheEntryRow, DbError, EvictionCandidate};
