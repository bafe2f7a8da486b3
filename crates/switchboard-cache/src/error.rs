use thiserror::Error;

/// Errors surfaced by the cache layer.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Repository failure underneath a cache operation.
    #[error("cache repository error: {0}")]
    Db(#[from] switchboard_db::DbError),

    /// Could not obtain a pooled connection.
    #[error("cache connection error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Audio blob read/write failure. A corrupt blob found during a lookup
    /// is not reported here: the entry is evicted and the lookup is a miss.
    #[error("cache audio I/O error: {0}")]
    Io(#[from] std::io::Error),
}
