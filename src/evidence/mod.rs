//! Evidence pack -- tamper-evident execution trace.
//!
//! Every session appends immutable [`EvidenceEntry`] records where each
//! entry's hash covers the previous entry's hash, so any after-the-fact
//! mutation breaks [`EvidencePack::verify`]. The pack commits to its full
//! contents with an RFC 6962 Merkle root and, when a signer is attached,
//! carries an ed25519 signature per entry for at-rest tamper detection.

pub mod merkle;
mod signer;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub use signer::EvidenceSigner;

use crate::ids::{now_epoch, time_sortable_id};

// ── Errors ──────────────────────────────────────────────────────

/// Evidence persistence errors.
#[derive(Debug, Error)]
pub enum EvidenceError {
    /// Filesystem failure while saving or loading.
    #[error("evidence I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// A persisted line did not parse as an entry.
    #[error("evidence parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

// ── Types ───────────────────────────────────────────────────────

/// Classification of an evidence entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceKind {
    /// Raw input that entered the system.
    Input,
    /// A decision taken by a component (guard, planner, selector).
    Decision,
    /// An outbound tool invocation.
    ToolCall,
    /// Supporting material pulled in (memory hits, artifacts).
    Source,
    /// Produced output.
    Output,
    /// A failure.
    Error,
}

impl EvidenceKind {
    /// Stable snake_case label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Decision => "decision",
            Self::ToolCall => "tool_call",
            Self::Source => "source",
            Self::Output => "output",
            Self::Error => "error",
        }
    }
}

/// A single immutable entry in the evidence chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceEntry {
    /// Time-sortable entry id.
    pub entry_id: String,
    /// Epoch seconds at append time.
    pub timestamp: f64,
    /// Pipeline phase (or subsystem label) that produced the entry.
    pub phase: String,
    /// Entry classification.
    pub kind: EvidenceKind,
    /// Structured payload.
    pub data: serde_json::Value,
    /// The previous entry's `entry_hash`; empty for the first entry.
    pub prev_hash: String,
    /// SHA-256 over the canonical serialization of this entry.
    pub entry_hash: String,
    /// Hex ed25519 signature over `entry_hash`, when a signer is attached.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl EvidenceEntry {
    /// Recompute this entry's hash from its hashed fields.
    pub fn compute_hash(&self) -> String {
        hash_entry_fields(self.timestamp, &self.phase, self.kind, &self.data, &self.prev_hash)
    }
}

/// Hash the canonical serialization of an entry's hashed fields.
fn hash_entry_fields(
    timestamp: f64,
    phase: &str,
    kind: EvidenceKind,
    data: &serde_json::Value,
    prev_hash: &str,
) -> String {
    let payload = serde_json::json!({
        "timestamp": timestamp,
        "phase": phase,
        "kind": kind.as_str(),
        "data": data,
        "prev_hash": prev_hash,
    });
    let canonical = canonical_json(&payload);
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

/// Serialize a JSON value with lexicographically ordered object keys and no
/// whitespace. Arrays keep their order; only object key order is normalized.
pub fn canonical_json(value: &serde_json::Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &serde_json::Value, out: &mut String) {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::Value::String((*key).clone()).to_string());
                out.push(':');
                if let Some(v) = map.get(*key) {
                    write_canonical(v, out);
                }
            }
            out.push('}');
        }
        serde_json::Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

// ── EvidencePack ────────────────────────────────────────────────

/// Per-session, append-only, hash-chained audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidencePack {
    /// Owning session id.
    pub session_id: String,
    /// Ordered chain of entries.
    pub entries: Vec<EvidenceEntry>,
    /// Epoch seconds at pack creation.
    pub start_time: f64,
    /// Epoch seconds at finalization (set on save).
    pub end_time: Option<f64>,
    /// Model identifier used for the session, if any.
    pub model_id: Option<String>,
    /// Hex public key of the attached signer, if any.
    pub signer_public_key: Option<String>,
    /// RFC 6962 root over entry hashes (set on save or on demand).
    pub merkle_root: Option<String>,
    #[serde(skip)]
    signer: Option<EvidenceSigner>,
}

impl EvidencePack {
    /// Create an empty pack for a session.
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            entries: Vec::new(),
            start_time: now_epoch(),
            end_time: None,
            model_id: None,
            signer_public_key: None,
            merkle_root: None,
            signer: None,
        }
    }

    /// Attach an ed25519 signer; subsequent entries are signed.
    pub fn with_signer(mut self, signer: EvidenceSigner) -> Self {
        self.signer_public_key = Some(signer.public_key_hex());
        self.signer = Some(signer);
        self
    }

    /// Record the model identifier driving this session.
    pub fn set_model_id(&mut self, model_id: impl Into<String>) {
        self.model_id = Some(model_id.into());
    }

    /// Append an entry, chaining it onto the previous entry's hash.
    pub fn add(&mut self, phase: &str, kind: EvidenceKind, data: serde_json::Value) {
        let timestamp = now_epoch();
        let prev_hash = self
            .entries
            .last()
            .map(|e| e.entry_hash.clone())
            .unwrap_or_default();
        let entry_hash = hash_entry_fields(timestamp, phase, kind, &data, &prev_hash);
        let signature = self.signer.as_ref().map(|s| s.sign(entry_hash.as_bytes()));
        self.entries.push(EvidenceEntry {
            entry_id: time_sortable_id(),
            timestamp,
            phase: phase.to_owned(),
            kind,
            data,
            prev_hash,
            entry_hash,
            signature,
        });
    }

    /// Number of entries in the chain.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Verify chain links, recomputed hashes, and (when a public key is
    /// present) per-entry signatures. Never panics or errors -- any mismatch
    /// yields `false`.
    pub fn verify(&self) -> bool {
        let mut expected_prev = String::new();
        for entry in &self.entries {
            if entry.prev_hash != expected_prev {
                return false;
            }
            if entry.compute_hash() != entry.entry_hash {
                return false;
            }
            if let Some(ref public_key) = self.signer_public_key {
                match entry.signature {
                    Some(ref sig) => {
                        if !signer::verify_signature(public_key, entry.entry_hash.as_bytes(), sig) {
                            return false;
                        }
                    }
                    None => return false,
                }
            }
            expected_prev = entry.entry_hash.clone();
        }
        true
    }

    /// RFC 6962 tree hash over the entry hashes, as 64 hex chars.
    pub fn merkle_root_hash(&self) -> String {
        let leaves: Vec<Vec<u8>> = self
            .entries
            .iter()
            .map(|e| e.entry_hash.as_bytes().to_vec())
            .collect();
        merkle::merkle_root_hex(&leaves)
    }

    /// Render all entries as newline-delimited JSON.
    pub fn to_jsonl(&self) -> String {
        let lines: Vec<String> = self
            .entries
            .iter()
            .filter_map(|e| serde_json::to_string(e).ok())
            .collect();
        lines.join("\n")
    }

    /// Finalize and persist the pack as `evidence_<session_id>.jsonl` in
    /// `dir`. The Merkle root and end time are fixed into the pack first.
    ///
    /// # Errors
    ///
    /// Returns [`EvidenceError::Io`] when the directory or file cannot be
    /// written.
    pub fn save(&mut self, dir: &Path) -> Result<PathBuf, EvidenceError> {
        self.merkle_root = Some(self.merkle_root_hash());
        self.end_time = Some(now_epoch());
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("evidence_{}.jsonl", self.session_id));
        std::fs::write(&path, self.to_jsonl())?;
        Ok(path)
    }

    /// Load a pack back from a JSONL file written by [`EvidencePack::save`].
    /// The session id is recovered from the filename.
    ///
    /// # Errors
    ///
    /// Returns [`EvidenceError`] on I/O or parse failure.
    pub fn load(path: &Path) -> Result<Self, EvidenceError> {
        let contents = std::fs::read_to_string(path)?;
        let mut entries = Vec::new();
        for line in contents.lines().filter(|l| !l.trim().is_empty()) {
            entries.push(serde_json::from_str::<EvidenceEntry>(line)?);
        }
        let session_id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.strip_prefix("evidence_"))
            .unwrap_or("unknown")
            .to_owned();
        let start_time = entries.first().map(|e| e.timestamp).unwrap_or_default();
        let end_time = entries.last().map(|e| e.timestamp);
        let mut pack = Self::new(session_id);
        pack.start_time = start_time;
        pack.end_time = end_time;
        pack.entries = entries;
        pack.merkle_root = Some(pack.merkle_root_hash());
        Ok(pack)
    }
}
