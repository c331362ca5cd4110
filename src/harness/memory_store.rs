//! Cold-tier pattern store for winning harness candidates.
//!
//! Successful provider/model/prompt combinations are persisted so future
//! runs can seed their generation context with what worked before.

use std::sync::Arc;

use crate::memory::{MemoryCategory, MemoryTier, TieredMemoryService};

use super::{Candidate, Feedback};

/// Stores winning patterns for reuse across harness runs.
pub struct HarnessMemoryStore {
    memory: Arc<TieredMemoryService>,
}

impl Default for HarnessMemoryStore {
    fn default() -> Self {
        Self::new(Arc::new(TieredMemoryService::default()))
    }
}

impl HarnessMemoryStore {
    /// Store over an explicit tiered memory service.
    pub fn new(memory: Arc<TieredMemoryService>) -> Self {
        Self { memory }
    }

    /// Persist a winning candidate pattern in cold-tier memory.
    pub fn store_pattern(&self, task: &str, candidate: &Candidate, feedback: &Feedback) {
        let key = format!("harness:{}", candidate.id);
        let prompt_head: String = candidate.prompt.chars().take(200).collect();
        let content = format!(
            "task: {task}\nprovider: {}\nmodel: {}\nscore: {}\nprompt: {prompt_head}",
            candidate.provider, candidate.model, feedback.score
        );
        self.memory.store_in_tier(
            &key,
            &content,
            MemoryCategory::Core,
            Some("harness"),
            &[],
            MemoryTier::Cold,
        );
    }

    /// Recall the best-matching stored pattern for a task, rendered as a
    /// generation context line. `None` when nothing matches.
    pub fn recall_context(&self, task: &str) -> Option<String> {
        self.recall_patterns(task, 3)
            .first()
            .map(|pattern| format!("Previous patterns: {pattern}"))
    }

    /// Recall stored pattern bodies matching the task (word-overlap).
    pub fn recall_patterns(&self, task: &str, limit: usize) -> Vec<String> {
        self.memory
            .recall_filtered(task, limit, None, Some(MemoryTier::Cold), None)
            .into_iter()
            .filter(|entry| entry.key.starts_with("harness:"))
            .map(|entry| entry.content)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, prompt: &str) -> Candidate {
        Candidate {
            id: id.to_owned(),
            provider: "codex".to_owned(),
            model: "m1".to_owned(),
            prompt: prompt.to_owned(),
            output: "out".to_owned(),
            latency_ms: 2.0,
            token_count: 3,
        }
    }

    #[test]
    fn test_store_and_recall_pattern() {
        let store = HarnessMemoryStore::default();
        store.store_pattern(
            "refactor the parser module",
            &candidate("c1", "refactor the parser module carefully"),
            &Feedback::new(true, 0.9, "ok"),
        );

        let patterns = store.recall_patterns("parser refactor work", 3);
        assert_eq!(patterns.len(), 1);
        assert!(patterns[0].contains("provider: codex"));
        assert!(patterns[0].contains("score: 0.9"));
    }

    #[test]
    fn test_recall_context_rendering() {
        let store = HarnessMemoryStore::default();
        assert!(store.recall_context("anything").is_none());

        store.store_pattern(
            "summarize the document",
            &candidate("c2", "summarize the document"),
            &Feedback::new(true, 0.85, "ok"),
        );
        let context = store
            .recall_context("summarize the document")
            .expect("context");
        assert!(context.starts_with("Previous patterns: "));
    }

    #[test]
    fn test_prompt_truncated_to_200_chars() {
        let store = HarnessMemoryStore::default();
        let long_prompt = "verylongword ".repeat(50);
        store.store_pattern(
            "long prompt task words",
            &candidate("c3", &long_prompt),
            &Feedback::new(true, 0.7, "ok"),
        );
        let patterns = store.recall_patterns("long prompt task words", 1);
        let prompt_line = patterns[0]
            .lines()
            .find(|l| l.starts_with("prompt: "))
            .expect("prompt line");
        assert!(prompt_line.chars().count() <= 208);
    }
}
