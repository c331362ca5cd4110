//! Memory service interface and the in-memory reference backend.
//!
//! Recall is word-overlap matching: query words of three or more chars are
//! matched as substrings against `key + content`, results sorted most
//! recent first. The tiered service in [`tiered`] layers hot/warm/cold
//! semantics on top of this contract.

pub mod embedding;
pub mod entity;
pub mod tiered;

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

pub use embedding::{
    cosine_similarity, EmbeddingError, EmbeddingService, OllamaEmbeddingService,
    StubEmbeddingService,
};
pub use entity::{EntityExtractor, RegexEntityExtractor, StubEntityExtractor};
pub use tiered::{ColdEntry, HotEntry, MemoryTier, TieredMemoryService, WarmEntry};

use crate::ids::now_epoch;

/// Memory entry classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryCategory {
    /// Long-lived facts about the user or system.
    Core,
    /// Day-scoped notes.
    Daily,
    /// Conversation-derived context.
    Conversation,
    /// Caller-defined.
    Custom,
}

impl MemoryCategory {
    /// Stable lowercase label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Core => "core",
            Self::Daily => "daily",
            Self::Conversation => "conversation",
            Self::Custom => "custom",
        }
    }
}

/// A single memory record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Lookup key.
    pub key: String,
    /// Stored content.
    pub content: String,
    /// Classification.
    pub category: MemoryCategory,
    /// Epoch seconds at store time.
    pub timestamp: f64,
    /// Owning session, if scoped.
    pub session_id: Option<String>,
    /// Free-form tags.
    pub tags: Vec<String>,
}

/// Abstract interface for memory backends.
///
/// Implementations use interior mutability so a shared reference can serve
/// both the orchestrator and the context compiler.
pub trait MemoryService: Send + Sync {
    /// Persist an entry.
    fn store(
        &self,
        key: &str,
        content: &str,
        category: MemoryCategory,
        session_id: Option<&str>,
        tags: &[String],
    );

    /// Retrieve entries matching the query, most recent first.
    fn recall(&self, query: &str, limit: usize, session_id: Option<&str>) -> Vec<MemoryEntry>;

    /// Remove an entry by key; `true` when something was removed.
    fn forget(&self, key: &str) -> bool;
}

/// Lowercased query words of three or more characters.
pub(crate) fn query_words(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split_whitespace()
        .filter(|w| w.chars().count() >= 3)
        .map(str::to_owned)
        .collect()
}

/// Word-overlap match on `key + content`. An empty word set matches all.
pub(crate) fn matches_query(key: &str, content: &str, words: &[String]) -> bool {
    if words.is_empty() {
        return true;
    }
    let haystack = format!("{key} {content}").to_lowercase();
    words.iter().any(|w| haystack.contains(w.as_str()))
}

/// Dict-backed backend for testing and development.
#[derive(Default)]
pub struct InMemoryBackend {
    entries: Mutex<HashMap<String, MemoryEntry>>,
}

impl InMemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }
}

impl MemoryService for InMemoryBackend {
    fn store(
        &self,
        key: &str,
        content: &str,
        category: MemoryCategory,
        session_id: Option<&str>,
        tags: &[String],
    ) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(
                key.to_owned(),
                MemoryEntry {
                    key: key.to_owned(),
                    content: content.to_owned(),
                    category,
                    timestamp: now_epoch(),
                    session_id: session_id.map(str::to_owned),
                    tags: tags.to_vec(),
                },
            );
        }
    }

    fn recall(&self, query: &str, limit: usize, session_id: Option<&str>) -> Vec<MemoryEntry> {
        let words = query_words(query);
        let Ok(entries) = self.entries.lock() else {
            return Vec::new();
        };
        let mut matches: Vec<MemoryEntry> = entries
            .values()
            .filter(|e| session_id.is_none() || e.session_id.as_deref() == session_id)
            .filter(|e| matches_query(&e.key, &e.content, &words))
            .cloned()
            .collect();
        matches.sort_by(|a, b| {
            b.timestamp
                .partial_cmp(&a.timestamp)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(limit);
        matches
    }

    fn forget(&self, key: &str) -> bool {
        self.entries
            .lock()
            .map(|mut entries| entries.remove(key).is_some())
            .unwrap_or(false)
    }
}
