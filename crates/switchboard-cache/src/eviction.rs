//! Storage-budget enforcement.
//!
//! The sweep runs as a background task, off the synthesis hot path. An
//! agent whose cached bytes cross the high-water mark is reclaimed down to
//! the low-water mark (hysteresis against thrashing). Reclamation order:
//!
//! 1. TTL-expired, unpinned entries — unconditionally.
//! 2. Remaining unpinned entries by ascending `hit_count / age since last
//!    use`.
//!
//! Pinned entries (greetings, closings, please-wait filler, common digits)
//! are never candidates. Candidates are selected in a snapshot read, then
//! deleted row at a time; no lock is held across agents.

use std::fs;
use std::io;
use std::time::Duration;

use switchboard_db::{repo, EvictionCandidate};

use crate::error::CacheError;
use crate::store::CacheStore;

/// Watermarks and cadence for the sweep.
#[derive(Debug, Clone, Copy)]
pub struct EvictionSettings {
    /// Sweeping starts when an agent's cached bytes exceed this.
    pub high_water_bytes: i64,
    /// Sweeping stops once cached bytes drop to this.
    pub low_water_bytes: i64,
    /// Pause between sweep passes.
    pub sweep_interval: Duration,
}

impl Default for EvictionSettings {
    fn default() -> Self {
        Self {
            high_water_bytes: 512 * 1024 * 1024,
            low_water_bytes: 384 * 1024 * 1024,
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// Outcome of sweeping one agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Rows deleted.
    pub reclaimed_entries: usize,
    /// Bytes reclaimed.
    pub reclaimed_bytes: i64,
    /// Cached bytes before the sweep.
    pub bytes_before: i64,
}

/// The background reclaimer.
#[derive(Debug, Clone)]
pub struct EvictionPolicy {
    store: CacheStore,
    settings: EvictionSettings,
}

impl EvictionPolicy {
    /// Creates a policy over the given store. `low_water_bytes` must be
    /// below `high_water_bytes`; equal or inverted marks would defeat the
    /// hysteresis.
    pub fn new(store: CacheStore, settings: EvictionSettings) -> Self {
        debug_assert!(settings.low_water_bytes < settings.high_water_bytes);
        Self { store, settings }
    }

    /// Spawns the periodic sweep loop on the current runtime.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.settings.sweep_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(err) = self.sweep_all() {
                    tracing::error!(error = %err, "eviction sweep failed");
                }
            }
        })
    }

    /// Sweeps every agent that currently holds cache rows.
    pub fn sweep_all(&self) -> Result<(), CacheError> {
        let agents = {
            let conn = self.store.pool().get()?;
            repo::agents_with_cache(&conn)?
        };
        for agent_id in agents {
            let report = self.sweep_agent(&agent_id)?;
            if report.reclaimed_entries > 0 {
                tracing::info!(
                    agent_id = %agent_id,
                    reclaimed_entries = report.reclaimed_entries,
                    reclaimed_bytes = report.reclaimed_bytes,
                    bytes_before = report.bytes_before,
                    "eviction sweep reclaimed storage"
                );
            }
        }
        Ok(())
    }

    /// Sweeps one agent if its storage crosses the high-water mark.
    pub fn sweep_agent(&self, agent_id: &str) -> Result<SweepReport, CacheError> {
        let conn = self.store.pool().get()?;

        let bytes_before = repo::agent_cache_bytes(&conn, agent_id)?;
        let mut report = SweepReport {
            bytes_before,
            ..SweepReport::default()
        };
        if bytes_before <= self.settings.high_water_bytes {
            return Ok(report);
        }

        // Snapshot candidates up front; deletes below are row-at-a-time so
        // concurrent renders are never blocked behind the sweep.
        let expired = repo::expired_unpinned(&conn, agent_id)?;
        let scored = repo::eviction_candidates_by_score(&conn, agent_id)?;

        let mut remaining = bytes_before;

        // Expired entries go unconditionally, even if that alone would
        // bring us under the low-water mark.
        for candidate in &expired {
            if self.reclaim(&conn, candidate)? {
                remaining -= candidate.size_bytes;
                report.reclaimed_entries += 1;
                report.reclaimed_bytes += candidate.size_bytes;
            }
        }

        for candidate in &scored {
            if remaining <= self.settings.low_water_bytes {
                break;
            }
            if self.reclaim(&conn, candidate)? {
                remaining -= candidate.size_bytes;
                report.reclaimed_entries += 1;
                report.reclaimed_bytes += candidate.size_bytes;
            }
        }

        Ok(report)
    }

    /// Deletes one candidate's row and blob. Returns false if the row was
    /// already gone (another sweep or a corruption eviction beat us).
    fn reclaim(
        &self,
        conn: &rusqlite::Connection,
        candidate: &EvictionCandidate,
    ) -> Result<bool, CacheError> {
        if !repo::delete_cache_entry(conn, &candidate.cache_key)? {
            return Ok(false);
        }
        match fs::remove_file(self.store.audio_dir().join(&candidate.audio_path)) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                tracing::warn!(
                    cache_key = %candidate.cache_key,
                    error = %err,
                    "failed to unlink evicted audio blob"
                );
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_db::{create_pool, run_migrations, PoolSettings};
    use switchboard_types::CacheNamespace;

    fn test_store(dir: &tempfile::TempDir) -> CacheStore {
        let db_path = dir.path().join("cache.db");
        let pool = create_pool(&db_path, PoolSettings::default()).expect("pool");
        {
            let conn = pool.get().expect("conn");
            run_migrations(&conn).expect("migrations");
        }
        CacheStore::new(pool, dir.path().join("audio"))
    }

    fn put(store: &CacheStore, key: &str, bytes: usize, ttl: Option<i64>, pinned: bool) {
        store
            .put(
                key,
                "agent-1",
                CacheNamespace::Variable,
                &vec![0u8; bytes],
                100,
                0.001,
                ttl,
                pinned,
            )
            .expect("put");
    }

    #[test]
    fn no_sweep_under_high_water() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = test_store(&dir);
        put(&store, "a", 100, Some(-60), false);

        let policy = EvictionPolicy::new(
            store.clone(),
            EvictionSettings {
                high_water_bytes: 1_000,
                low_water_bytes: 500,
                sweep_interval: Duration::from_secs(60),
            },
        );
        let report = policy.sweep_agent("agent-1").expect("sweep");
        assert_eq!(report.reclaimed_entries, 0);
        assert!(store.entry("a").expect("entry").is_some(), "row must survive");
    }

    #[test]
    fn expired_reclaimed_before_scored() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = test_store(&dir);
        put(&store, "expired", 400, Some(-60), false);
        put(&store, "live-cold", 400, None, false);
        put(&store, "live-hot", 400, None, false);
        for _ in 0..20 {
            store.record_hit("live-hot", "agent-1", 0.001).expect("hit");
        }

        // 1200 bytes cached; reclaiming the expired entry (400) plus the
        // coldest live entry (400) reaches the low-water mark.
        let policy = EvictionPolicy::new(
            store.clone(),
            EvictionSettings {
                high_water_bytes: 1_000,
                low_water_bytes: 400,
                sweep_interval: Duration::from_secs(60),
            },
        );
        let report = policy.sweep_agent("agent-1").expect("sweep");
        assert_eq!(report.reclaimed_entries, 2);
        assert!(store.entry("expired").expect("e").is_none());
        assert!(store.entry("live-cold").expect("e").is_none());
        assert!(store.entry("live-hot").expect("e").is_some());
    }

    #[test]
    fn pinned_entries_survive_any_pressure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = test_store(&dir);
        // Pinned, zero hits, long expired: still untouchable.
        put(&store, "greeting", 900, Some(-3600), true);
        put(&store, "cold", 900, None, false);

        let policy = EvictionPolicy::new(
            store.clone(),
            EvictionSettings {
                high_water_bytes: 100,
                low_water_bytes: 50,
                sweep_interval: Duration::from_secs(60),
            },
        );
        let report = policy.sweep_agent("agent-1").expect("sweep");
        assert_eq!(report.reclaimed_entries, 1);
        assert!(store.entry("greeting").expect("e").is_some());
        assert!(store.entry("cold").expect("e").is_none());
    }

    #[test]
    fn sweep_stops_at_low_water() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = test_store(&dir);
        for (key, hits) in [("a", 0), ("b", 1), ("c", 5), ("d", 9)] {
            put(&store, key, 300, None, false);
            for _ in 0..hits {
                store.record_hit(key, "agent-1", 0.001).expect("hit");
            }
        }

        // 1200 cached, low water 600: exactly the two coldest entries go.
        let policy = EvictionPolicy::new(
            store.clone(),
            EvictionSettings {
                high_water_bytes: 1_000,
                low_water_bytes: 600,
                sweep_interval: Duration::from_secs(60),
            },
        );
        let report = policy.sweep_agent("agent-1").expect("sweep");
        assert_eq!(report.reclaimed_entries, 2);
        assert!(store.entry("a").expect("e").is_none());
        assert!(store.entry("b").expect("e").is_none());
        assert!(store.entry("c").expect("e").is_some());
        assert!(store.entry("d").expect("e").is_some());
    }
}
