//! Row-level repository operations.
//!
//! All functions take a borrowed [`rusqlite::Connection`] so callers own
//! pooling and transaction scope. Counter updates (`hit_count`,
//! `total_cost_saved`) are single-statement atomic forms: multiple call
//! workers touch the same rows concurrently, so a read-modify-write in
//! application memory would lose increments.

use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

use switchboard_types::{
    Intent, IntentAction, Segment, SegmentKind, Template, TemplateElement, TriggerCriteria,
};

/// Errors surfaced by the repository layer.
#[derive(Debug, Error)]
pub enum DbError {
    /// Underlying SQLite failure.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A stored JSON column could not be decoded.
    #[error("stored row is malformed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored enum label was not recognized.
    #[error("stored row holds unknown label '{0}' in column {1}")]
    UnknownLabel(String, &'static str),
}

/// One cache row, as persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntryRow {
    /// Content-addressed key (hex SHA-256).
    pub cache_key: String,
    /// Owning agent.
    pub agent_id: String,
    /// `response` or `variable`.
    pub namespace: String,
    /// Audio blob path, relative to the audio directory.
    pub audio_path: String,
    /// Playback duration in milliseconds.
    pub duration_ms: i64,
    /// Blob size, the unit of the storage budget.
    pub size_bytes: i64,
    /// Provider cost paid to synthesize this entry (USD).
    pub tts_cost: f64,
    /// Number of cache hits served.
    pub hit_count: i64,
    /// Last hit timestamp (ISO 8601).
    pub last_used_at: String,
    /// Expiry timestamp; `None` means no TTL.
    pub expires_at: Option<String>,
    /// Pinned entries are exempt from TTL and eviction.
    pub is_pinned: bool,
    /// Whether `expires_at` has passed (computed at read time).
    pub expired: bool,
}

/// One eviction candidate from a snapshot read.
#[derive(Debug, Clone, PartialEq)]
pub struct EvictionCandidate {
    /// Key of the row to delete.
    pub cache_key: String,
    /// Bytes reclaimed if this row is deleted.
    pub size_bytes: i64,
    /// Blob path to unlink alongside the row.
    pub audio_path: String,
}

// ---------------------------------------------------------------------------
// Intents and templates
// ---------------------------------------------------------------------------

/// Inserts or replaces an intent row (management-layer write path).
pub fn upsert_intent(conn: &Connection, intent: &Intent) -> Result<(), DbError> {
    let action_json = serde_json::to_string(&intent.action)?;
    let trigger_json = serde_json::to_string(&intent.trigger)?;
    conn.execute(
        "INSERT INTO intents
            (id, agent_id, action_json, trigger_json, confidence_threshold,
             template_id, priority, active)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(id) DO UPDATE SET
            agent_id = excluded.agent_id,
            action_json = excluded.action_json,
            trigger_json = excluded.trigger_json,
            confidence_threshold = excluded.confidence_threshold,
            template_id = excluded.template_id,
            priority = excluded.priority,
            active = excluded.active",
        params![
            intent.id,
            intent.agent_id,
            action_json,
            trigger_json,
            intent.confidence_threshold,
            intent.template_id,
            intent.priority,
            intent.active,
        ],
    )?;
    Ok(())
}

fn intent_from_row(row: &rusqlite::Row<'_>) -> Result<(Intent, String, String), rusqlite::Error> {
    Ok((
        Intent {
            id: row.get(0)?,
            agent_id: row.get(1)?,
            // Decoded by the caller; placeholders keep row mapping fallible
            // only on SQLite errors.
            action: IntentAction::Static {
                audio_key: None,
                text: None,
            },
            trigger: TriggerCriteria::default(),
            confidence_threshold: row.get(4)?,
            template_id: row.get(5)?,
            priority: row.get(6)?,
            active: row.get(7)?,
        },
        row.get::<_, String>(2)?,
        row.get::<_, String>(3)?,
    ))
}

/// Fetches one intent by ID.
pub fn get_intent(conn: &Connection, id: &str) -> Result<Option<Intent>, DbError> {
    let found = conn
        .query_row(
            "SELECT id, agent_id, action_json, trigger_json, confidence_threshold,
                    template_id, priority, active
             FROM intents WHERE id = ?1",
            params![id],
            intent_from_row,
        )
        .optional()?;

    match found {
        None => Ok(None),
        Some((mut intent, action_json, trigger_json)) => {
            intent.action = serde_json::from_str(&action_json)?;
            intent.trigger = serde_json::from_str(&trigger_json)?;
            Ok(Some(intent))
        }
    }
}

/// Lists active intents for an agent, highest priority first.
pub fn list_active_intents(conn: &Connection, agent_id: &str) -> Result<Vec<Intent>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT id, agent_id, action_json, trigger_json, confidence_threshold,
                template_id, priority, active
         FROM intents
         WHERE agent_id = ?1 AND active = 1
         ORDER BY priority DESC, id ASC",
    )?;
    let rows = stmt.query_map(params![agent_id], intent_from_row)?;

    let mut intents = Vec::new();
    for row in rows {
        let (mut intent, action_json, trigger_json) = row?;
        intent.action = serde_json::from_str(&action_json)?;
        intent.trigger = serde_json::from_str(&trigger_json)?;
        intents.push(intent);
    }
    Ok(intents)
}

/// Inserts or replaces a template row (management-layer write path).
pub fn upsert_template(conn: &Connection, template: &Template) -> Result<(), DbError> {
    let elements_json = serde_json::to_string(&template.elements)?;
    let required_json = serde_json::to_string(&template.required_variables)?;
    conn.execute(
        "INSERT INTO templates (id, agent_id, elements_json, required_variables_json)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(id) DO UPDATE SET
            agent_id = excluded.agent_id,
            elements_json = excluded.elements_json,
            required_variables_json = excluded.required_variables_json",
        params![template.id, template.agent_id, elements_json, required_json],
    )?;
    Ok(())
}

/// Fetches one template by ID.
pub fn get_template(conn: &Connection, id: &str) -> Result<Option<Template>, DbError> {
    let found = conn
        .query_row(
            "SELECT id, agent_id, elements_json, required_variables_json
             FROM templates WHERE id = ?1",
            params![id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            },
        )
        .optional()?;

    match found {
        None => Ok(None),
        Some((id, agent_id, elements_json, required_json)) => {
            let elements: Vec<TemplateElement> = serde_json::from_str(&elements_json)?;
            let required_variables: Vec<String> = serde_json::from_str(&required_json)?;
            Ok(Some(Template {
                id,
                agent_id,
                elements,
                required_variables,
            }))
        }
    }
}

// ---------------------------------------------------------------------------
// Segments
// ---------------------------------------------------------------------------

/// Publishes a new version of a segment.
///
/// The version number is assigned inside the INSERT with a
/// `COALESCE(MAX(version), 0) + 1` subquery, so two concurrent publishes
/// cannot observe the same maximum and collide.
pub fn publish_segment(
    conn: &Connection,
    key: &str,
    language: &str,
    kind: SegmentKind,
    text: &str,
    audio_path: &str,
    duration_ms: i64,
) -> Result<i64, DbError> {
    let version: i64 = conn.query_row(
        "INSERT INTO segments (key, language, version, kind, text, audio_path, duration_ms)
         VALUES (
            ?1, ?2,
            (SELECT COALESCE(MAX(version), 0) + 1 FROM segments
             WHERE key = ?1 AND language = ?2),
            ?3, ?4, ?5, ?6
         )
         RETURNING version",
        params![key, language, kind.as_str(), text, audio_path, duration_ms],
        |row| row.get(0),
    )?;
    Ok(version)
}

/// Fetches the latest published version of a segment for one language.
///
/// Never falls back to another language: a missing language is `None` and
/// the caller decides how to fail.
pub fn get_segment(
    conn: &Connection,
    key: &str,
    language: &str,
) -> Result<Option<Segment>, DbError> {
    let found = conn
        .query_row(
            "SELECT key, language, version, kind, text, audio_path, duration_ms
             FROM segments
             WHERE key = ?1 AND language = ?2
             ORDER BY version DESC
             LIMIT 1",
            params![key, language],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, i64>(6)?,
                ))
            },
        )
        .optional()?;

    match found {
        None => Ok(None),
        Some((key, language, version, kind_label, text, audio_path, duration_ms)) => {
            let kind = SegmentKind::from_str_label(&kind_label)
                .ok_or(DbError::UnknownLabel(kind_label, "segments.kind"))?;
            Ok(Some(Segment {
                key,
                kind,
                text,
                language,
                audio_path,
                duration_ms,
                version,
            }))
        }
    }
}

// ---------------------------------------------------------------------------
// Cache entries
// ---------------------------------------------------------------------------

/// Inserts a cache row created by a fresh synthesis.
///
/// Content-addressed keys make writes idempotent: if another flight landed
/// the same key first, the insert is a no-op and the earlier row wins.
#[allow(clippy::too_many_arguments)]
pub fn insert_cache_entry(
    conn: &Connection,
    cache_key: &str,
    agent_id: &str,
    namespace: &str,
    audio_path: &str,
    duration_ms: i64,
    size_bytes: i64,
    tts_cost: f64,
    ttl_seconds: Option<i64>,
    is_pinned: bool,
) -> Result<(), DbError> {
    conn.execute(
        "INSERT INTO cache_entries
            (cache_key, agent_id, namespace, audio_path, duration_ms,
             size_bytes, tts_cost, expires_at, is_pinned)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7,
                 CASE WHEN ?8 IS NULL THEN NULL
                      ELSE datetime('now', '+' || ?8 || ' seconds') END,
                 ?9)
         ON CONFLICT(cache_key) DO NOTHING",
        params![
            cache_key,
            agent_id,
            namespace,
            audio_path,
            duration_ms,
            size_bytes,
            tts_cost,
            ttl_seconds,
            is_pinned,
        ],
    )?;
    Ok(())
}

/// Fetches one cache row, computing expiry at read time.
pub fn get_cache_entry(conn: &Connection, cache_key: &str) -> Result<Option<CacheEntryRow>, DbError> {
    let row = conn
        .query_row(
            "SELECT cache_key, agent_id, namespace, audio_path, duration_ms,
                    size_bytes, tts_cost, hit_count, last_used_at, expires_at,
                    is_pinned,
                    (expires_at IS NOT NULL AND expires_at <= datetime('now'))
             FROM cache_entries WHERE cache_key = ?1",
            params![cache_key],
            |row| {
                Ok(CacheEntryRow {
                    cache_key: row.get(0)?,
                    agent_id: row.get(1)?,
                    namespace: row.get(2)?,
                    audio_path: row.get(3)?,
                    duration_ms: row.get(4)?,
                    size_bytes: row.get(5)?,
                    tts_cost: row.get(6)?,
                    hit_count: row.get(7)?,
                    last_used_at: row.get(8)?,
                    expires_at: row.get(9)?,
                    is_pinned: row.get(10)?,
                    expired: row.get(11)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

/// Atomically records a cache hit: bumps `hit_count` and `last_used_at`
/// in a single statement. Returns false if the row no longer exists.
pub fn touch_cache_entry(conn: &Connection, cache_key: &str) -> Result<bool, DbError> {
    let updated = conn.execute(
        "UPDATE cache_entries
         SET hit_count = hit_count + 1,
             last_used_at = datetime('now')
         WHERE cache_key = ?1",
        params![cache_key],
    )?;
    Ok(updated > 0)
}

/// Deletes one cache row. Returns false if it was already gone.
pub fn delete_cache_entry(conn: &Connection, cache_key: &str) -> Result<bool, DbError> {
    let deleted = conn.execute(
        "DELETE FROM cache_entries WHERE cache_key = ?1",
        params![cache_key],
    )?;
    Ok(deleted > 0)
}

/// Total cached bytes for one agent, the input to watermark checks.
pub fn agent_cache_bytes(conn: &Connection, agent_id: &str) -> Result<i64, DbError> {
    let bytes: i64 = conn.query_row(
        "SELECT COALESCE(SUM(size_bytes), 0) FROM cache_entries WHERE agent_id = ?1",
        params![agent_id],
        |row| row.get(0),
    )?;
    Ok(bytes)
}

/// Snapshot of TTL-expired, unpinned rows for one agent. These are
/// reclaimed unconditionally before any score-based eviction.
pub fn expired_unpinned(conn: &Connection, agent_id: &str) -> Result<Vec<EvictionCandidate>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT cache_key, size_bytes, audio_path
         FROM cache_entries
         WHERE agent_id = ?1
           AND is_pinned = 0
           AND expires_at IS NOT NULL
           AND expires_at <= datetime('now')",
    )?;
    let rows = stmt.query_map(params![agent_id], |row| {
        Ok(EvictionCandidate {
            cache_key: row.get(0)?,
            size_bytes: row.get(1)?,
            audio_path: row.get(2)?,
        })
    })?;

    let mut candidates = Vec::new();
    for row in rows {
        candidates.push(row?);
    }
    Ok(candidates)
}

/// Snapshot of unpinned, unexpired rows ranked by ascending
/// `hit_count / age_since_last_used`: rarely hit, long-idle entries first.
pub fn eviction_candidates_by_score(
    conn: &Connection,
    agent_id: &str,
) -> Result<Vec<EvictionCandidate>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT cache_key, size_bytes, audio_path
         FROM cache_entries
         WHERE agent_id = ?1
           AND is_pinned = 0
           AND (expires_at IS NULL OR expires_at > datetime('now'))
         ORDER BY CAST(hit_count AS REAL) /
                  MAX(1.0, (julianday('now') - julianday(last_used_at)) * 86400.0)
                  ASC,
                  last_used_at ASC",
    )?;
    let rows = stmt.query_map(params![agent_id], |row| {
        Ok(EvictionCandidate {
            cache_key: row.get(0)?,
            size_bytes: row.get(1)?,
            audio_path: row.get(2)?,
        })
    })?;

    let mut candidates = Vec::new();
    for row in rows {
        candidates.push(row?);
    }
    Ok(candidates)
}

/// Distinct agents that currently hold cache rows, for the eviction sweep.
pub fn agents_with_cache(conn: &Connection) -> Result<Vec<String>, DbError> {
    let mut stmt = conn.prepare("SELECT DISTINCT agent_id FROM cache_entries")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

    let mut agents = Vec::new();
    for row in rows {
        agents.push(row?);
    }
    Ok(agents)
}

// ---------------------------------------------------------------------------
// Agent usage counters
// ---------------------------------------------------------------------------

/// Atomically accrues estimated provider cost avoided by a cache hit.
pub fn add_cost_saved(conn: &Connection, agent_id: &str, amount: f64) -> Result<(), DbError> {
    conn.execute(
        "INSERT INTO agent_usage (agent_id, total_cost_saved, updated_at)
         VALUES (?1, ?2, datetime('now'))
         ON CONFLICT(agent_id) DO UPDATE SET
            total_cost_saved = total_cost_saved + excluded.total_cost_saved,
            updated_at = datetime('now')",
        params![agent_id, amount],
    )?;
    Ok(())
}

/// Atomically accrues provider cost actually paid for a synthesis.
pub fn add_synthesis_cost(conn: &Connection, agent_id: &str, amount: f64) -> Result<(), DbError> {
    conn.execute(
        "INSERT INTO agent_usage (agent_id, total_synthesis_cost, updated_at)
         VALUES (?1, ?2, datetime('now'))
         ON CONFLICT(agent_id) DO UPDATE SET
            total_synthesis_cost = total_synthesis_cost + excluded.total_synthesis_cost,
            updated_at = datetime('now')",
        params![agent_id, amount],
    )?;
    Ok(())
}

/// Returns `(total_cost_saved, total_synthesis_cost)` for one agent.
pub fn get_usage(conn: &Connection, agent_id: &str) -> Result<(f64, f64), DbError> {
    let usage = conn
        .query_row(
            "SELECT total_cost_saved, total_synthesis_cost
             FROM agent_usage WHERE agent_id = ?1",
            params![agent_id],
            |row| Ok((row.get::<_, f64>(0)?, row.get::<_, f64>(1)?)),
        )
        .optional()?;
    Ok(usage.unwrap_or((0.0, 0.0)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run_migrations;
    use switchboard_types::VariableFormat;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        run_migrations(&conn).expect("migrations should succeed");
        conn
    }

    fn sample_entry(conn: &Connection, key: &str, ttl: Option<i64>, pinned: bool) {
        insert_cache_entry(
            conn,
            key,
            "agent-1",
            "variable",
            &format!("{key}.pcm"),
            800,
            32_000,
            0.004,
            ttl,
            pinned,
        )
        .expect("insert should succeed");
    }

    #[test]
    fn cache_round_trip_preserves_audio_and_cost() {
        let conn = test_conn();
        sample_entry(&conn, "abc123", Some(3600), false);

        let row = get_cache_entry(&conn, "abc123")
            .expect("get should succeed")
            .expect("row should exist");
        assert_eq!(row.audio_path, "abc123.pcm");
        assert_eq!(row.tts_cost, 0.004);
        assert_eq!(row.hit_count, 0);
        assert!(!row.expired, "fresh entry must not be expired");
        assert!(row.expires_at.is_some());
    }

    #[test]
    fn insert_is_idempotent_for_same_key() {
        let conn = test_conn();
        sample_entry(&conn, "abc123", None, false);
        touch_cache_entry(&conn, "abc123").expect("touch should succeed");

        // A second flight landing the same key must not reset the row.
        sample_entry(&conn, "abc123", None, false);
        let row = get_cache_entry(&conn, "abc123").unwrap().unwrap();
        assert_eq!(row.hit_count, 1);
    }

    #[test]
    fn touch_increments_atomically() {
        let conn = test_conn();
        sample_entry(&conn, "abc123", None, false);

        assert!(touch_cache_entry(&conn, "abc123").unwrap());
        assert!(touch_cache_entry(&conn, "abc123").unwrap());
        assert!(!touch_cache_entry(&conn, "missing").unwrap());

        let row = get_cache_entry(&conn, "abc123").unwrap().unwrap();
        assert_eq!(row.hit_count, 2);
    }

    #[test]
    fn expired_entry_reads_as_expired() {
        let conn = test_conn();
        // Negative TTL places expires_at in the past.
        sample_entry(&conn, "stale", Some(-60), false);

        let row = get_cache_entry(&conn, "stale").unwrap().unwrap();
        assert!(row.expired);

        let expired = expired_unpinned(&conn, "agent-1").unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].cache_key, "stale");
    }

    #[test]
    fn pinned_rows_are_never_candidates() {
        let conn = test_conn();
        sample_entry(&conn, "greeting", Some(-60), true);
        sample_entry(&conn, "cold", None, false);

        assert!(expired_unpinned(&conn, "agent-1").unwrap().is_empty());
        let scored = eviction_candidates_by_score(&conn, "agent-1").unwrap();
        assert_eq!(scored.len(), 1);
        assert_eq!(scored[0].cache_key, "cold");
    }

    #[test]
    fn score_ranks_rarely_hit_entries_first() {
        let conn = test_conn();
        sample_entry(&conn, "hot", None, false);
        sample_entry(&conn, "cold", None, false);
        for _ in 0..10 {
            touch_cache_entry(&conn, "hot").unwrap();
        }

        let scored = eviction_candidates_by_score(&conn, "agent-1").unwrap();
        assert_eq!(scored[0].cache_key, "cold");
    }

    #[test]
    fn usage_counters_accumulate() {
        let conn = test_conn();
        add_cost_saved(&conn, "agent-1", 0.004).unwrap();
        add_cost_saved(&conn, "agent-1", 0.006).unwrap();
        add_synthesis_cost(&conn, "agent-1", 0.01).unwrap();

        let (saved, paid) = get_usage(&conn, "agent-1").unwrap();
        assert!((saved - 0.01).abs() < 1e-9);
        assert!((paid - 0.01).abs() < 1e-9);
        assert_eq!(get_usage(&conn, "agent-2").unwrap(), (0.0, 0.0));
    }

    #[test]
    fn segment_versions_are_monotonic_and_latest_wins() {
        let conn = test_conn();
        let v1 = publish_segment(
            &conn,
            "greeting",
            "en-US",
            SegmentKind::Prefix,
            "Hello, thanks for calling.",
            "greeting_v1.pcm",
            1200,
        )
        .unwrap();
        let v2 = publish_segment(
            &conn,
            "greeting",
            "en-US",
            SegmentKind::Prefix,
            "Hi, thanks for calling.",
            "greeting_v2.pcm",
            1100,
        )
        .unwrap();
        assert_eq!((v1, v2), (1, 2));

        let segment = get_segment(&conn, "greeting", "en-US").unwrap().unwrap();
        assert_eq!(segment.version, 2);
        assert_eq!(segment.audio_path, "greeting_v2.pcm");

        // Other languages are invisible, never substituted.
        assert!(get_segment(&conn, "greeting", "tr-TR").unwrap().is_none());
    }

    #[test]
    fn intent_and_template_round_trip() {
        let conn = test_conn();
        let template = Template {
            id: "tpl-1".to_string(),
            agent_id: "agent-1".to_string(),
            elements: vec![
                TemplateElement::Segment {
                    key: "invoice_prefix".to_string(),
                },
                TemplateElement::Variable {
                    name: "invoice_no".to_string(),
                    format: VariableFormat::SpellDigits,
                },
            ],
            required_variables: vec!["invoice_no".to_string()],
        };
        upsert_template(&conn, &template).unwrap();
        assert_eq!(get_template(&conn, "tpl-1").unwrap(), Some(template));

        let intent = Intent {
            id: "intent-1".to_string(),
            agent_id: "agent-1".to_string(),
            action: IntentAction::Transfer {
                transfer_queue: "billing".to_string(),
            },
            trigger: TriggerCriteria {
                keywords: vec!["agent".to_string(), "human".to_string()],
                utterance_examples: vec![],
            },
            confidence_threshold: 0.7,
            template_id: None,
            priority: 5,
            active: true,
        };
        upsert_intent(&conn, &intent).unwrap();
        assert_eq!(get_intent(&conn, "intent-1").unwrap(), Some(intent.clone()));

        let active = list_active_intents(&conn, "agent-1").unwrap();
        assert_eq!(active, vec![intent]);
    }
}
