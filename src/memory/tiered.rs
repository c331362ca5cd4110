//! Three-tier memory: hot (TTL cache), warm (tag index), cold (persistent
//! with relations and optional embeddings).
//!
//! Hot entries carry an expiry and are lazily evicted on read. `decay()`
//! runs a single pass that evicts expired hot entries and promotes warm
//! entries past their maximum age to cold. Cold stores feed an entity
//! relation index enabling `recall_by_relation` and bounded multi-hop
//! traversal.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use super::embedding::{cosine_similarity, EmbeddingService};
use super::entity::EntityExtractor;
use super::{matches_query, query_words, MemoryCategory, MemoryEntry, MemoryService};
use crate::ids::now_epoch;

/// The three memory tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryTier {
    /// Recent, fast, TTL-bound cache.
    Hot,
    /// Temporal index with tags.
    Warm,
    /// Long-term persistent store.
    Cold,
}

/// A hot-tier entry with an expiry timestamp.
#[derive(Debug, Clone)]
pub struct HotEntry {
    /// Lookup key.
    pub key: String,
    /// Stored content.
    pub content: String,
    /// Classification.
    pub category: MemoryCategory,
    /// Owning session, if scoped.
    pub session_id: Option<String>,
    /// Epoch seconds after which the entry is dead.
    pub expires_at: f64,
    /// Free-form tags.
    pub tags: Vec<String>,
}

/// A warm-tier entry with tag-based indexing.
#[derive(Debug, Clone)]
pub struct WarmEntry {
    /// Lookup key.
    pub key: String,
    /// Stored content.
    pub content: String,
    /// Classification.
    pub category: MemoryCategory,
    /// Owning session, if scoped.
    pub session_id: Option<String>,
    /// Epoch seconds at store time.
    pub timestamp: f64,
    /// Free-form tags.
    pub tags: Vec<String>,
}

/// A cold-tier entry with extracted relations and an optional embedding.
#[derive(Debug, Clone)]
pub struct ColdEntry {
    /// Lookup key.
    pub key: String,
    /// Stored content.
    pub content: String,
    /// Classification.
    pub category: MemoryCategory,
    /// Owning session, if scoped.
    pub session_id: Option<String>,
    /// Epoch seconds at store time.
    pub timestamp: f64,
    /// Free-form tags.
    pub tags: Vec<String>,
    /// Entity strings extracted from the content.
    pub relations: Vec<String>,
    /// Embedding vector, when an embedding service is attached.
    pub embedding: Option<Vec<f32>>,
}

#[derive(Default)]
struct Tiers {
    hot: BTreeMap<String, HotEntry>,
    warm: BTreeMap<String, WarmEntry>,
    cold: BTreeMap<String, ColdEntry>,
    relation_index: HashMap<String, HashSet<String>>,
}

/// Tiered memory service: hot (cache) → warm (indexed) → cold (persistent).
pub struct TieredMemoryService {
    inner: Mutex<Tiers>,
    hot_ttl_seconds: f64,
    warm_max_age_seconds: f64,
    embedding_service: Option<Arc<dyn EmbeddingService>>,
    entity_extractor: Option<Arc<dyn EntityExtractor>>,
}

impl Default for TieredMemoryService {
    fn default() -> Self {
        Self::new(300.0, 3600.0)
    }
}

impl TieredMemoryService {
    /// Create a service with the given hot TTL and warm maximum age.
    pub fn new(hot_ttl_seconds: f64, warm_max_age_seconds: f64) -> Self {
        Self {
            inner: Mutex::new(Tiers::default()),
            hot_ttl_seconds,
            warm_max_age_seconds,
            embedding_service: None,
            entity_extractor: None,
        }
    }

    /// Attach an embedding service; cold stores gain vectors and
    /// [`TieredMemoryService::recall_semantic`] ranks by cosine similarity.
    pub fn with_embedding_service(mut self, service: Arc<dyn EmbeddingService>) -> Self {
        self.embedding_service = Some(service);
        self
    }

    /// Attach an entity extractor feeding the cold-tier relation index.
    pub fn with_entity_extractor(mut self, extractor: Arc<dyn EntityExtractor>) -> Self {
        self.entity_extractor = Some(extractor);
        self
    }

    /// Whether an embedding service is attached.
    pub fn has_embedding_service(&self) -> bool {
        self.embedding_service.is_some()
    }

    /// Store an entry in a specific tier.
    pub fn store_in_tier(
        &self,
        key: &str,
        content: &str,
        category: MemoryCategory,
        session_id: Option<&str>,
        tags: &[String],
        tier: MemoryTier,
    ) {
        let now = now_epoch();
        let Ok(mut tiers) = self.inner.lock() else {
            return;
        };
        match tier {
            MemoryTier::Hot => {
                tiers.hot.insert(
                    key.to_owned(),
                    HotEntry {
                        key: key.to_owned(),
                        content: content.to_owned(),
                        category,
                        session_id: session_id.map(str::to_owned),
                        expires_at: now + self.hot_ttl_seconds,
                        tags: tags.to_vec(),
                    },
                );
            }
            MemoryTier::Warm => {
                tiers.warm.insert(
                    key.to_owned(),
                    WarmEntry {
                        key: key.to_owned(),
                        content: content.to_owned(),
                        category,
                        session_id: session_id.map(str::to_owned),
                        timestamp: now,
                        tags: tags.to_vec(),
                    },
                );
            }
            MemoryTier::Cold => {
                let relations = self
                    .entity_extractor
                    .as_ref()
                    .map(|e| e.extract(content))
                    .unwrap_or_default();
                let embedding = self.embedding_service.as_ref().and_then(|svc| {
                    svc.embed(&[content.to_owned()])
                        .ok()
                        .and_then(|mut v| v.pop())
                });
                for entity in &relations {
                    tiers
                        .relation_index
                        .entry(entity.clone())
                        .or_default()
                        .insert(key.to_owned());
                }
                tiers.cold.insert(
                    key.to_owned(),
                    ColdEntry {
                        key: key.to_owned(),
                        content: content.to_owned(),
                        category,
                        session_id: session_id.map(str::to_owned),
                        timestamp: now,
                        tags: tags.to_vec(),
                        relations,
                        embedding,
                    },
                );
            }
        }
    }

    /// Recall with optional tier and tag filters. Tier-less queries union
    /// all tiers; results sort timestamp-descending and truncate to `limit`.
    /// Expired hot entries encountered during the scan are evicted.
    pub fn recall_filtered(
        &self,
        query: &str,
        limit: usize,
        session_id: Option<&str>,
        tier: Option<MemoryTier>,
        tags: Option<&[String]>,
    ) -> Vec<MemoryEntry> {
        let words = query_words(query);
        let now = now_epoch();
        let Ok(mut tiers) = self.inner.lock() else {
            return Vec::new();
        };
        let mut results: Vec<MemoryEntry> = Vec::new();

        if tier.is_none() || tier == Some(MemoryTier::Hot) {
            let expired: Vec<String> = tiers
                .hot
                .values()
                .filter(|e| e.expires_at <= now)
                .map(|e| e.key.clone())
                .collect();
            for key in expired {
                tiers.hot.remove(&key);
            }
            for entry in tiers.hot.values() {
                if entry_matches(
                    &entry.key,
                    &entry.content,
                    entry.session_id.as_deref(),
                    &entry.tags,
                    &words,
                    session_id,
                    tags,
                ) {
                    results.push(MemoryEntry {
                        key: entry.key.clone(),
                        content: entry.content.clone(),
                        category: entry.category,
                        timestamp: now,
                        session_id: entry.session_id.clone(),
                        tags: entry.tags.clone(),
                    });
                }
            }
        }

        if tier.is_none() || tier == Some(MemoryTier::Warm) {
            for entry in tiers.warm.values() {
                if entry_matches(
                    &entry.key,
                    &entry.content,
                    entry.session_id.as_deref(),
                    &entry.tags,
                    &words,
                    session_id,
                    tags,
                ) {
                    results.push(MemoryEntry {
                        key: entry.key.clone(),
                        content: entry.content.clone(),
                        category: entry.category,
                        timestamp: entry.timestamp,
                        session_id: entry.session_id.clone(),
                        tags: entry.tags.clone(),
                    });
                }
            }
        }

        if tier.is_none() || tier == Some(MemoryTier::Cold) {
            for entry in tiers.cold.values() {
                if entry_matches(
                    &entry.key,
                    &entry.content,
                    entry.session_id.as_deref(),
                    &entry.tags,
                    &words,
                    session_id,
                    tags,
                ) {
                    results.push(MemoryEntry {
                        key: entry.key.clone(),
                        content: entry.content.clone(),
                        category: entry.category,
                        timestamp: entry.timestamp,
                        session_id: entry.session_id.clone(),
                        tags: entry.tags.clone(),
                    });
                }
            }
        }

        results.sort_by(|a, b| {
            b.timestamp
                .partial_cmp(&a.timestamp)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(limit);
        results
    }

    /// Cold-tier entries whose relation list mentions `entity`.
    pub fn recall_by_relation(&self, entity: &str) -> Vec<MemoryEntry> {
        let Ok(tiers) = self.inner.lock() else {
            return Vec::new();
        };
        let keys = tiers.relation_index.get(entity).cloned().unwrap_or_default();
        let mut results: Vec<MemoryEntry> = keys
            .iter()
            .filter_map(|k| tiers.cold.get(k))
            .map(cold_to_entry)
            .collect();
        results.sort_by(|a, b| {
            b.timestamp
                .partial_cmp(&a.timestamp)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results
    }

    /// Multi-hop recall: expand the relation graph layer by layer, up to
    /// `hops` levels from the seed entity.
    pub fn recall_multihop(&self, entity: &str, hops: usize) -> Vec<MemoryEntry> {
        let Ok(tiers) = self.inner.lock() else {
            return Vec::new();
        };
        let mut seen_keys: HashSet<String> = HashSet::new();
        let mut frontier: HashSet<String> = HashSet::from([entity.to_owned()]);

        for _ in 0..hops {
            let mut next_frontier: HashSet<String> = HashSet::new();
            for ent in &frontier {
                if let Some(keys) = tiers.relation_index.get(ent) {
                    for key in keys {
                        if seen_keys.insert(key.clone()) {
                            if let Some(entry) = tiers.cold.get(key) {
                                next_frontier.extend(entry.relations.iter().cloned());
                            }
                        }
                    }
                }
            }
            frontier = next_frontier.difference(&frontier).cloned().collect();
        }

        let mut results: Vec<MemoryEntry> = seen_keys
            .iter()
            .filter_map(|k| tiers.cold.get(k))
            .map(cold_to_entry)
            .collect();
        results.sort_by(|a, b| {
            b.timestamp
                .partial_cmp(&a.timestamp)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results
    }

    /// Rank cold entries carrying embeddings by cosine similarity to the
    /// query. Requires an attached embedding service; otherwise empty.
    pub fn recall_semantic(&self, query: &str, limit: usize) -> Vec<MemoryEntry> {
        let Some(ref service) = self.embedding_service else {
            return Vec::new();
        };
        let Ok(vectors) = service.embed(&[query.to_owned()]) else {
            return Vec::new();
        };
        let Some(query_vec) = vectors.first() else {
            return Vec::new();
        };
        let Ok(tiers) = self.inner.lock() else {
            return Vec::new();
        };
        let mut scored: Vec<(f32, MemoryEntry)> = tiers
            .cold
            .values()
            .filter_map(|entry| {
                entry
                    .embedding
                    .as_ref()
                    .map(|vec| (cosine_similarity(query_vec, vec), cold_to_entry(entry)))
            })
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        scored.into_iter().map(|(_, e)| e).collect()
    }

    /// Move an entry to `target_tier`, preserving content, category,
    /// session, and tags. Returns `false` when the key is unknown.
    pub fn promote(&self, key: &str, target_tier: MemoryTier) -> bool {
        let found = {
            let Ok(mut tiers) = self.inner.lock() else {
                return false;
            };
            let found = find_entry(&tiers, key);
            if found.is_some() {
                tiers.hot.remove(key);
                tiers.warm.remove(key);
                if tiers.cold.remove(key).is_some() {
                    for keys in tiers.relation_index.values_mut() {
                        keys.remove(key);
                    }
                }
            }
            found
        };
        match found {
            Some((content, category, session_id, tags)) => {
                self.store_in_tier(
                    key,
                    &content,
                    category,
                    session_id.as_deref(),
                    &tags,
                    target_tier,
                );
                true
            }
            None => false,
        }
    }

    /// Run one decay pass: evict expired hot entries and promote warm
    /// entries older than the warm maximum age to cold. Returns
    /// `(evicted_hot, promoted_to_cold)`.
    pub fn decay(&self) -> (usize, usize) {
        let now = now_epoch();
        let Ok(mut tiers) = self.inner.lock() else {
            return (0, 0);
        };

        let expired: Vec<String> = tiers
            .hot
            .values()
            .filter(|e| e.expires_at <= now)
            .map(|e| e.key.clone())
            .collect();
        for key in &expired {
            tiers.hot.remove(key);
        }

        let aged: Vec<String> = tiers
            .warm
            .values()
            .filter(|e| (now - e.timestamp) >= self.warm_max_age_seconds)
            .map(|e| e.key.clone())
            .collect();
        for key in &aged {
            if let Some(entry) = tiers.warm.remove(key) {
                tiers.cold.insert(
                    key.clone(),
                    ColdEntry {
                        key: entry.key,
                        content: entry.content,
                        category: entry.category,
                        session_id: entry.session_id,
                        timestamp: entry.timestamp,
                        tags: entry.tags,
                        relations: Vec::new(),
                        embedding: None,
                    },
                );
            }
        }

        (expired.len(), aged.len())
    }
}

fn cold_to_entry(entry: &ColdEntry) -> MemoryEntry {
    MemoryEntry {
        key: entry.key.clone(),
        content: entry.content.clone(),
        category: entry.category,
        timestamp: entry.timestamp,
        session_id: entry.session_id.clone(),
        tags: entry.tags.clone(),
    }
}

#[allow(clippy::type_complexity)]
fn find_entry(
    tiers: &Tiers,
    key: &str,
) -> Option<(String, MemoryCategory, Option<String>, Vec<String>)> {
    if let Some(e) = tiers.hot.get(key) {
        return Some((e.content.clone(), e.category, e.session_id.clone(), e.tags.clone()));
    }
    if let Some(e) = tiers.warm.get(key) {
        return Some((e.content.clone(), e.category, e.session_id.clone(), e.tags.clone()));
    }
    if let Some(e) = tiers.cold.get(key) {
        return Some((e.content.clone(), e.category, e.session_id.clone(), e.tags.clone()));
    }
    None
}

#[allow(clippy::too_many_arguments)]
fn entry_matches(
    key: &str,
    content: &str,
    entry_session: Option<&str>,
    entry_tags: &[String],
    words: &[String],
    session_filter: Option<&str>,
    tag_filter: Option<&[String]>,
) -> bool {
    if let Some(session) = session_filter {
        if entry_session != Some(session) {
            return false;
        }
    }
    if let Some(tags) = tag_filter {
        if !tags.is_empty() && !tags.iter().any(|t| entry_tags.contains(t)) {
            return false;
        }
    }
    matches_query(key, content, words)
}

impl MemoryService for TieredMemoryService {
    /// Default store targets the hot tier.
    fn store(
        &self,
        key: &str,
        content: &str,
        category: MemoryCategory,
        session_id: Option<&str>,
        tags: &[String],
    ) {
        self.store_in_tier(key, content, category, session_id, tags, MemoryTier::Hot);
    }

    fn recall(&self, query: &str, limit: usize, session_id: Option<&str>) -> Vec<MemoryEntry> {
        self.recall_filtered(query, limit, session_id, None, None)
    }

    fn forget(&self, key: &str) -> bool {
        let Ok(mut tiers) = self.inner.lock() else {
            return false;
        };
        let mut found = false;
        found |= tiers.hot.remove(key).is_some();
        found |= tiers.warm.remove(key).is_some();
        if tiers.cold.remove(key).is_some() {
            found = true;
            for keys in tiers.relation_index.values_mut() {
                keys.remove(key);
            }
        }
        found
    }
}
