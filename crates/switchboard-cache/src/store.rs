//! The cache facade: rows in SQLite, audio blobs on disk.
//!
//! One [`CacheStore`] serves both namespaces; the namespace is baked into
//! the key by the [`crate::key`] module. Reads are unrestricted and
//! concurrent. Writes are idempotent (content-addressed keys), so the
//! at-most-one-writer discipline lives with the synthesis invoker, not
//! here.

use std::fs;
use std::path::{Path, PathBuf};

use switchboard_db::{repo, CacheEntryRow, DbPool};
use switchboard_types::CacheNamespace;

use crate::error::CacheError;

/// A successful cache lookup.
#[derive(Debug, Clone)]
pub struct CacheHit {
    /// The cache key that was hit.
    pub cache_key: String,
    /// Raw PCM audio.
    pub pcm: Vec<u8>,
    /// Playback duration in milliseconds.
    pub duration_ms: i64,
    /// Provider cost originally paid for this entry, the basis of
    /// cost-saved accrual.
    pub tts_cost: f64,
}

/// Shared cache state: a pooled SQLite handle plus the audio blob root.
#[derive(Debug, Clone)]
pub struct CacheStore {
    pool: DbPool,
    audio_dir: PathBuf,
}

impl CacheStore {
    /// Creates a store rooted at `audio_dir`. The directory is created on
    /// first write, not here.
    pub fn new(pool: DbPool, audio_dir: impl AsRef<Path>) -> Self {
        Self {
            pool,
            audio_dir: audio_dir.as_ref().to_path_buf(),
        }
    }

    /// Blob path for a key: two-character fan-out directory, then the key.
    fn blob_path(&self, cache_key: &str) -> PathBuf {
        let shard = &cache_key[..cache_key.len().min(2)];
        self.audio_dir.join(shard).join(format!("{cache_key}.pcm"))
    }

    /// Looks up a cache entry by key.
    ///
    /// Expired unpinned entries read as misses (the sweep reclaims them
    /// later). An entry whose blob is missing or unreadable is deleted on
    /// the spot and also reads as a miss, so corruption self-heals as a
    /// fresh synthesis instead of crashing a render.
    pub fn get(&self, cache_key: &str) -> Result<Option<CacheHit>, CacheError> {
        let conn = self.pool.get()?;
        let Some(row) = repo::get_cache_entry(&conn, cache_key)? else {
            return Ok(None);
        };

        if row.expired && !row.is_pinned {
            tracing::debug!(cache_key, agent_id = %row.agent_id, "entry expired, treating as miss");
            return Ok(None);
        }

        match fs::read(self.audio_dir.join(&row.audio_path)) {
            Ok(pcm) => Ok(Some(CacheHit {
                cache_key: row.cache_key,
                pcm,
                duration_ms: row.duration_ms,
                tts_cost: row.tts_cost,
            })),
            Err(err) => {
                tracing::warn!(
                    cache_key,
                    agent_id = %row.agent_id,
                    audio_path = %row.audio_path,
                    error = %err,
                    "audio blob unreadable, evicting corrupt entry"
                );
                repo::delete_cache_entry(&conn, cache_key)?;
                Ok(None)
            }
        }
    }

    /// Persists a freshly synthesized entry: blob first, then the row.
    ///
    /// Idempotent per key — if another flight landed the same key first,
    /// the row insert is a no-op and both blobs are byte-identical because
    /// the key is content-addressed.
    #[allow(clippy::too_many_arguments)]
    pub fn put(
        &self,
        cache_key: &str,
        agent_id: &str,
        namespace: CacheNamespace,
        pcm: &[u8],
        duration_ms: i64,
        tts_cost: f64,
        ttl_seconds: Option<i64>,
        pinned: bool,
    ) -> Result<(), CacheError> {
        let blob = self.blob_path(cache_key);
        if let Some(parent) = blob.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&blob, pcm)?;

        let relative = blob
            .strip_prefix(&self.audio_dir)
            .unwrap_or(&blob)
            .to_string_lossy()
            .into_owned();

        let conn = self.pool.get()?;
        repo::insert_cache_entry(
            &conn,
            cache_key,
            agent_id,
            namespace.as_str(),
            &relative,
            duration_ms,
            pcm.len() as i64,
            tts_cost,
            ttl_seconds,
            pinned,
        )?;

        tracing::debug!(
            cache_key,
            agent_id,
            namespace = namespace.as_str(),
            size_bytes = pcm.len(),
            tts_cost,
            "cached synthesized audio"
        );
        Ok(())
    }

    /// Records a hit: bumps `hit_count`/`last_used_at` atomically and
    /// accrues the estimated provider cost avoided.
    pub fn record_hit(&self, cache_key: &str, agent_id: &str, cost_saved: f64) -> Result<(), CacheError> {
        let conn = self.pool.get()?;
        repo::touch_cache_entry(&conn, cache_key)?;
        repo::add_cost_saved(&conn, agent_id, cost_saved)?;
        Ok(())
    }

    /// Raw row access, used by tests and the sweep.
    pub fn entry(&self, cache_key: &str) -> Result<Option<CacheEntryRow>, CacheError> {
        let conn = self.pool.get()?;
        Ok(repo::get_cache_entry(&conn, cache_key)?)
    }

    /// The audio blob root, shared with the eviction sweep.
    pub fn audio_dir(&self) -> &Path {
        &self.audio_dir
    }

    /// The underlying pool, shared with the eviction sweep.
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}
