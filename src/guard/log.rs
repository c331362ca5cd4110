//! Persistent guard-check log backed by SQLite.
//!
//! Every evaluation can be recorded with a 200-char input preview, the
//! backend that decided, and the verdict. WAL mode keeps concurrent readers
//! cheap. All methods take `&self` through an internal `Mutex<Connection>`.

use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection};
use thiserror::Error;

use crate::ids::short_id;

use super::GuardResult;

/// Maximum stored preview length in characters.
const PREVIEW_CHARS: usize = 200;

/// Guard log errors.
#[derive(Debug, Error)]
pub enum GuardLogError {
    /// SQLite failure.
    #[error("guard log database error: {0}")]
    Database(String),
}

impl From<rusqlite::Error> for GuardLogError {
    fn from(e: rusqlite::Error) -> Self {
        GuardLogError::Database(e.to_string())
    }
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS guard_checks (
    id            TEXT PRIMARY KEY,
    timestamp     TEXT NOT NULL,
    input_preview TEXT NOT NULL,
    threat_level  TEXT NOT NULL,
    score         REAL NOT NULL,
    backend       TEXT NOT NULL,
    reason        TEXT NOT NULL,
    allowed       INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_guard_checks_timestamp ON guard_checks(timestamp);
"#;

/// A persisted guard check row.
#[derive(Debug, Clone)]
pub struct GuardCheckRecord {
    /// Row id.
    pub id: String,
    /// RFC 3339 timestamp.
    pub timestamp: String,
    /// First 200 chars of the checked input.
    pub input_preview: String,
    /// Threat level label.
    pub threat_level: String,
    /// Threat score, 0–100.
    pub score: f64,
    /// Backend that produced the verdict.
    pub backend: String,
    /// Verdict explanation.
    pub reason: String,
    /// Whether the input was allowed.
    pub allowed: bool,
}

/// Aggregate counters over the log.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GuardLogStats {
    /// Total recorded checks.
    pub total_checks: u64,
    /// Checks that blocked.
    pub blocked: u64,
    /// Mean score across all checks.
    pub avg_score: f64,
}

/// SQLite-backed guard check log.
pub struct GuardLog {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for GuardLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardLog").finish()
    }
}

impl GuardLog {
    /// Open (or create) a log at the given path, enabling WAL.
    ///
    /// # Errors
    ///
    /// Returns [`GuardLogError::Database`] when the database cannot be opened.
    pub fn open(path: &str) -> Result<Self, GuardLogError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory log for testing.
    ///
    /// # Errors
    ///
    /// Returns [`GuardLogError::Database`] when SQLite initialization fails.
    pub fn open_in_memory() -> Result<Self, GuardLogError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Record one guard check.
    ///
    /// # Errors
    ///
    /// Returns [`GuardLogError::Database`] on write failure.
    pub fn record(
        &self,
        input_text: &str,
        result: &GuardResult,
        backend: &str,
    ) -> Result<(), GuardLogError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| GuardLogError::Database(e.to_string()))?;
        let preview: String = input_text.chars().take(PREVIEW_CHARS).collect();
        conn.execute(
            "INSERT INTO guard_checks (id, timestamp, input_preview, threat_level, score, backend, reason, allowed)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                short_id(),
                Utc::now().to_rfc3339(),
                preview,
                result.threat_level.as_str(),
                result.score,
                backend,
                result.reason,
                i64::from(result.allowed),
            ],
        )?;
        Ok(())
    }

    /// Most recent checks, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`GuardLogError::Database`] on query failure.
    pub fn list_entries(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<GuardCheckRecord>, GuardLogError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| GuardLogError::Database(e.to_string()))?;
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, input_preview, threat_level, score, backend, reason, allowed
             FROM guard_checks ORDER BY timestamp DESC LIMIT ?1 OFFSET ?2",
        )?;
        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);
        let offset_i64 = i64::try_from(offset).unwrap_or(0);
        let rows = stmt.query_map(params![limit_i64, offset_i64], |row| {
            Ok(GuardCheckRecord {
                id: row.get(0)?,
                timestamp: row.get(1)?,
                input_preview: row.get(2)?,
                threat_level: row.get(3)?,
                score: row.get(4)?,
                backend: row.get(5)?,
                reason: row.get(6)?,
                allowed: row.get::<_, i64>(7)? != 0,
            })
        })?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Aggregate counters.
    ///
    /// # Errors
    ///
    /// Returns [`GuardLogError::Database`] on query failure.
    pub fn stats(&self) -> Result<GuardLogStats, GuardLogError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| GuardLogError::Database(e.to_string()))?;
        conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(CASE WHEN allowed = 0 THEN 1 ELSE 0 END), 0),
                    COALESCE(AVG(score), 0.0)
             FROM guard_checks",
            [],
            |row| {
                Ok(GuardLogStats {
                    total_checks: row.get::<_, i64>(0)?.unsigned_abs(),
                    blocked: row.get::<_, i64>(1)?.unsigned_abs(),
                    avg_score: row.get(2)?,
                })
            },
        )
        .map_err(GuardLogError::from)
    }
}
