//! Content-addressed storage for large byte payloads.
//!
//! Artifacts are keyed by the SHA-256 of their content, so re-storing
//! identical bytes is idempotent and yields the same handle. Handles are
//! small value types safe to embed in a working context; the bytes live in
//! SQLite (WAL, safe for concurrent read/write) or on the filesystem under
//! two-char prefix directories.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::ids::now_epoch;

/// Summary budget in characters.
const SUMMARY_MAX_CHARS: usize = 200;

/// Artifact store errors.
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// SQLite failure.
    #[error("artifact database error: {0}")]
    Database(String),
    /// Filesystem failure.
    #[error("artifact I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Metadata sidecar did not parse.
    #[error("artifact metadata error: {0}")]
    Metadata(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for ArtifactError {
    fn from(e: rusqlite::Error) -> Self {
        ArtifactError::Database(e.to_string())
    }
}

/// Lightweight reference to an externalized payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactHandle {
    /// SHA-256 of the content, hex.
    pub artifact_id: String,
    /// Short human-readable preview.
    pub summary: String,
    /// Content length in bytes.
    pub size_bytes: usize,
    /// MIME type supplied at store time.
    pub mime_type: String,
    /// Epoch seconds at first store.
    pub created_at: f64,
    /// Producer label, e.g. `tool:search`.
    pub source: String,
}

/// Hex SHA-256 of a byte payload.
pub fn content_hash(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

/// First ~200 chars of UTF-8 content, truncated at the last word boundary
/// when one exists past half the budget, with a trailing `...`. Content that
/// is not valid UTF-8 summarizes as `[binary data, N bytes]`.
pub fn make_summary(content: &[u8]) -> String {
    let Ok(text) = std::str::from_utf8(content) else {
        return format!("[binary data, {} bytes]", content.len());
    };
    if text.chars().count() <= SUMMARY_MAX_CHARS {
        return text.to_owned();
    }
    let mut truncated: String = text.chars().take(SUMMARY_MAX_CHARS).collect();
    if let Some(last_space) = truncated.rfind(' ') {
        if last_space > SUMMARY_MAX_CHARS / 2 {
            truncated.truncate(last_space);
        }
    }
    truncated.push_str("...");
    truncated
}

/// Abstract store for large payloads.
pub trait ArtifactStore: Send + Sync {
    /// Store content under its hash; idempotent on identical bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError`] on backend failure.
    fn store(
        &self,
        content: &[u8],
        source: &str,
        mime_type: &str,
    ) -> Result<ArtifactHandle, ArtifactError>;

    /// Fetch content by id, `None` when absent.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError`] on backend failure.
    fn retrieve(&self, artifact_id: &str) -> Result<Option<Vec<u8>>, ArtifactError>;

    /// Whether an artifact exists.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError`] on backend failure.
    fn exists(&self, artifact_id: &str) -> Result<bool, ArtifactError>;

    /// All stored handles.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError`] on backend failure.
    fn list_handles(&self) -> Result<Vec<ArtifactHandle>, ArtifactError>;

    /// Delete by id; `true` when something was removed.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError`] on backend failure.
    fn delete(&self, artifact_id: &str) -> Result<bool, ArtifactError>;
}

// ── SQLite backend ──────────────────────────────────────────────

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS artifacts (
    id         TEXT PRIMARY KEY,
    content    BLOB NOT NULL,
    summary    TEXT NOT NULL,
    size_bytes INTEGER NOT NULL,
    mime_type  TEXT NOT NULL,
    source     TEXT NOT NULL,
    created_at REAL NOT NULL
);
"#;

/// SQLite-backed artifact storage (WAL).
pub struct SqliteArtifactStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteArtifactStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteArtifactStore").finish()
    }
}

impl SqliteArtifactStore {
    /// Open (or create) a store at the given path, enabling WAL.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::Database`] when the database cannot open.
    pub fn open(path: &Path) -> Result<Self, ArtifactError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory store for testing.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::Database`] when SQLite initialization fails.
    pub fn open_in_memory() -> Result<Self, ArtifactError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl ArtifactStore for SqliteArtifactStore {
    fn store(
        &self,
        content: &[u8],
        source: &str,
        mime_type: &str,
    ) -> Result<ArtifactHandle, ArtifactError> {
        let artifact_id = content_hash(content);
        let conn = self
            .conn
            .lock()
            .map_err(|e| ArtifactError::Database(e.to_string()))?;

        let existing: Option<(String, i64, f64)> = conn
            .query_row(
                "SELECT summary, size_bytes, created_at FROM artifacts WHERE id = ?1",
                params![artifact_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        if let Some((summary, size_bytes, created_at)) = existing {
            return Ok(ArtifactHandle {
                artifact_id,
                summary,
                size_bytes: usize::try_from(size_bytes).unwrap_or(0),
                mime_type: mime_type.to_owned(),
                created_at,
                source: source.to_owned(),
            });
        }

        let summary = make_summary(content);
        let created_at = now_epoch();
        conn.execute(
            "INSERT INTO artifacts (id, content, summary, size_bytes, mime_type, source, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                artifact_id,
                content,
                summary,
                i64::try_from(content.len()).unwrap_or(i64::MAX),
                mime_type,
                source,
                created_at,
            ],
        )?;
        Ok(ArtifactHandle {
            artifact_id,
            summary,
            size_bytes: content.len(),
            mime_type: mime_type.to_owned(),
            created_at,
            source: source.to_owned(),
        })
    }

    fn retrieve(&self, artifact_id: &str) -> Result<Option<Vec<u8>>, ArtifactError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| ArtifactError::Database(e.to_string()))?;
        conn.query_row(
            "SELECT content FROM artifacts WHERE id = ?1",
            params![artifact_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(ArtifactError::from)
    }

    fn exists(&self, artifact_id: &str) -> Result<bool, ArtifactError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| ArtifactError::Database(e.to_string()))?;
        let row: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM artifacts WHERE id = ?1",
                params![artifact_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(row.is_some())
    }

    fn list_handles(&self) -> Result<Vec<ArtifactHandle>, ArtifactError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| ArtifactError::Database(e.to_string()))?;
        let mut stmt = conn.prepare(
            "SELECT id, summary, size_bytes, mime_type, created_at, source FROM artifacts",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(ArtifactHandle {
                artifact_id: row.get(0)?,
                summary: row.get(1)?,
                size_bytes: usize::try_from(row.get::<_, i64>(2)?).unwrap_or(0),
                mime_type: row.get(3)?,
                created_at: row.get(4)?,
                source: row.get(5)?,
            })
        })?;
        let mut handles = Vec::new();
        for row in rows {
            handles.push(row?);
        }
        Ok(handles)
    }

    fn delete(&self, artifact_id: &str) -> Result<bool, ArtifactError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| ArtifactError::Database(e.to_string()))?;
        let deleted = conn.execute("DELETE FROM artifacts WHERE id = ?1", params![artifact_id])?;
        Ok(deleted > 0)
    }
}

// ── Filesystem backend ──────────────────────────────────────────

#[derive(Serialize, Deserialize)]
struct FsMeta {
    summary: String,
    size_bytes: usize,
    mime_type: String,
    source: String,
    created_at: f64,
}

/// Filesystem-backed artifact storage with 2-char prefix directories and
/// JSON metadata sidecars.
#[derive(Debug)]
pub struct FsArtifactStore {
    base: PathBuf,
}

impl FsArtifactStore {
    /// Create a store rooted at `base_dir`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::Io`] when the directory cannot be created.
    pub fn new(base_dir: &Path) -> Result<Self, ArtifactError> {
        std::fs::create_dir_all(base_dir)?;
        Ok(Self {
            base: base_dir.to_path_buf(),
        })
    }

    fn data_path(&self, artifact_id: &str) -> PathBuf {
        let prefix: String = artifact_id.chars().take(2).collect();
        self.base.join(prefix).join(format!("{artifact_id}.dat"))
    }

    fn meta_path(&self, artifact_id: &str) -> PathBuf {
        let prefix: String = artifact_id.chars().take(2).collect();
        self.base
            .join(prefix)
            .join(format!("{artifact_id}.meta.json"))
    }
}

impl ArtifactStore for FsArtifactStore {
    fn store(
        &self,
        content: &[u8],
        source: &str,
        mime_type: &str,
    ) -> Result<ArtifactHandle, ArtifactError> {
        let artifact_id = content_hash(content);
        let data_path = self.data_path(&artifact_id);
        let meta_path = self.meta_path(&artifact_id);

        if data_path.exists() && meta_path.exists() {
            let meta: FsMeta = serde_json::from_str(&std::fs::read_to_string(&meta_path)?)?;
            return Ok(ArtifactHandle {
                artifact_id,
                summary: meta.summary,
                size_bytes: meta.size_bytes,
                mime_type: meta.mime_type,
                created_at: meta.created_at,
                source: source.to_owned(),
            });
        }

        if let Some(parent) = data_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let summary = make_summary(content);
        let created_at = now_epoch();
        std::fs::write(&data_path, content)?;
        let meta = FsMeta {
            summary: summary.clone(),
            size_bytes: content.len(),
            mime_type: mime_type.to_owned(),
            source: source.to_owned(),
            created_at,
        };
        std::fs::write(&meta_path, serde_json::to_string(&meta)?)?;

        Ok(ArtifactHandle {
            artifact_id,
            summary,
            size_bytes: content.len(),
            mime_type: mime_type.to_owned(),
            created_at,
            source: source.to_owned(),
        })
    }

    fn retrieve(&self, artifact_id: &str) -> Result<Option<Vec<u8>>, ArtifactError> {
        let path = self.data_path(artifact_id);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(std::fs::read(path)?))
    }

    fn exists(&self, artifact_id: &str) -> Result<bool, ArtifactError> {
        Ok(self.data_path(artifact_id).exists())
    }

    fn list_handles(&self) -> Result<Vec<ArtifactHandle>, ArtifactError> {
        let mut handles = Vec::new();
        for prefix_entry in std::fs::read_dir(&self.base)? {
            let prefix_dir = prefix_entry?.path();
            if !prefix_dir.is_dir() {
                continue;
            }
            for entry in std::fs::read_dir(&prefix_dir)? {
                let path = entry?.path();
                let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
                let Some(artifact_id) = name.strip_suffix(".meta.json") else {
                    continue;
                };
                let meta: FsMeta = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
                handles.push(ArtifactHandle {
                    artifact_id: artifact_id.to_owned(),
                    summary: meta.summary,
                    size_bytes: meta.size_bytes,
                    mime_type: meta.mime_type,
                    created_at: meta.created_at,
                    source: meta.source,
                });
            }
        }
        Ok(handles)
    }

    fn delete(&self, artifact_id: &str) -> Result<bool, ArtifactError> {
        let mut deleted = false;
        let data_path = self.data_path(artifact_id);
        if data_path.exists() {
            std::fs::remove_file(data_path)?;
            deleted = true;
        }
        let meta_path = self.meta_path(artifact_id);
        if meta_path.exists() {
            std::fs::remove_file(meta_path)?;
            deleted = true;
        }
        Ok(deleted)
    }
}
