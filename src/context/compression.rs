//! Context compression -- shrink item lists to fit a token budget.
//!
//! Complements the processor chain for callers that carry flat string
//! context (tool transcripts, recalled notes) instead of a full session.
//! Estimation here uses the coarser words/0.75 heuristic the window
//! accounting was tuned against, not the compiler's per-message estimate.

use serde::{Deserialize, Serialize};

/// Available compression strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionStrategy {
    /// Keep leading items until the budget fills.
    Truncate,
    /// Join everything, word-truncate when over budget.
    Summarize,
    /// Keep trailing (most recent) items until the budget fills.
    SlidingWindow,
    /// Keep highest-priority items, preserving original order.
    Priority,
}

/// Result of compressing a list of context items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressedContext {
    /// Estimated tokens before compression.
    pub original_length: usize,
    /// Estimated tokens after compression.
    pub compressed_length: usize,
    /// Strategy that produced this result.
    pub strategy_used: CompressionStrategy,
    /// Compressed content, newline- or separator-joined.
    pub content: String,
    /// Items that did not survive compression.
    pub dropped_count: usize,
}

/// Compresses context items to fit within a token budget.
#[derive(Debug, Clone)]
pub struct ContextCompressor {
    max_tokens: usize,
    strategy: CompressionStrategy,
}

impl Default for ContextCompressor {
    fn default() -> Self {
        Self::new(4096, CompressionStrategy::SlidingWindow)
    }
}

impl ContextCompressor {
    /// Create a compressor with a budget and strategy.
    pub fn new(max_tokens: usize, strategy: CompressionStrategy) -> Self {
        Self {
            max_tokens,
            strategy,
        }
    }

    /// Estimate tokens as `words / 0.75`.
    pub fn estimate_tokens(&self, text: &str) -> usize {
        let words = text.split_whitespace().count();
        words.saturating_mul(4).checked_div(3).unwrap_or(0)
    }

    /// Whether `text` fits the budget.
    pub fn fits(&self, text: &str) -> bool {
        self.estimate_tokens(text) <= self.max_tokens
    }

    /// Compress items with the configured strategy. `priorities` is only
    /// consulted by [`CompressionStrategy::Priority`]; missing scores
    /// default to 0.
    pub fn compress(&self, items: &[String], priorities: Option<&[f64]>) -> CompressedContext {
        let original_length = items
            .iter()
            .fold(0usize, |acc, i| acc.saturating_add(self.estimate_tokens(i)));

        if items.is_empty() {
            return CompressedContext {
                original_length: 0,
                compressed_length: 0,
                strategy_used: self.strategy,
                content: String::new(),
                dropped_count: 0,
            };
        }

        match self.strategy {
            CompressionStrategy::Truncate => self.keep_prefix(items, original_length),
            CompressionStrategy::SlidingWindow => self.keep_suffix(items, original_length),
            CompressionStrategy::Priority => self.keep_by_priority(items, priorities, original_length),
            CompressionStrategy::Summarize => self.join_and_trim(items, original_length),
        }
    }

    fn keep_prefix(&self, items: &[String], original_length: usize) -> CompressedContext {
        let mut kept: Vec<&str> = Vec::new();
        let mut budget = self.max_tokens;
        for item in items {
            let cost = self.estimate_tokens(item);
            if cost > budget {
                break;
            }
            kept.push(item);
            budget = budget.saturating_sub(cost);
        }
        self.finish(items, kept, CompressionStrategy::Truncate, original_length)
    }

    fn keep_suffix(&self, items: &[String], original_length: usize) -> CompressedContext {
        let mut kept_rev: Vec<&str> = Vec::new();
        let mut budget = self.max_tokens;
        for item in items.iter().rev() {
            let cost = self.estimate_tokens(item);
            if cost > budget {
                break;
            }
            kept_rev.push(item);
            budget = budget.saturating_sub(cost);
        }
        kept_rev.reverse();
        self.finish(items, kept_rev, CompressionStrategy::SlidingWindow, original_length)
    }

    fn keep_by_priority(
        &self,
        items: &[String],
        priorities: Option<&[f64]>,
        original_length: usize,
    ) -> CompressedContext {
        let mut indexed: Vec<(f64, usize)> = items
            .iter()
            .enumerate()
            .map(|(i, _)| (priorities.and_then(|p| p.get(i)).copied().unwrap_or(0.0), i))
            .collect();
        indexed.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let mut kept_indices: Vec<usize> = Vec::new();
        let mut budget = self.max_tokens;
        for (_priority, idx) in indexed {
            let cost = self.estimate_tokens(&items[idx]);
            if cost > budget {
                continue;
            }
            kept_indices.push(idx);
            budget = budget.saturating_sub(cost);
        }
        kept_indices.sort_unstable();
        let kept: Vec<&str> = kept_indices.iter().map(|i| items[*i].as_str()).collect();
        self.finish(items, kept, CompressionStrategy::Priority, original_length)
    }

    fn join_and_trim(&self, items: &[String], original_length: usize) -> CompressedContext {
        let mut combined = items
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" | ");

        if !self.fits(&combined) {
            let target_words = self.max_tokens.saturating_mul(3).checked_div(4).unwrap_or(0);
            combined = combined
                .split_whitespace()
                .take(target_words)
                .collect::<Vec<_>>()
                .join(" ");
        }

        let present = items.iter().filter(|i| combined.contains(i.as_str())).count();
        CompressedContext {
            original_length,
            compressed_length: self.estimate_tokens(&combined),
            strategy_used: CompressionStrategy::Summarize,
            content: combined,
            dropped_count: items.len().saturating_sub(present),
        }
    }

    fn finish(
        &self,
        items: &[String],
        kept: Vec<&str>,
        strategy: CompressionStrategy,
        original_length: usize,
    ) -> CompressedContext {
        let content = kept.join("\n");
        CompressedContext {
            original_length,
            compressed_length: self.estimate_tokens(&content),
            strategy_used: strategy,
            content,
            dropped_count: items.len().saturating_sub(kept.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(n: usize, words_each: usize) -> Vec<String> {
        (0..n)
            .map(|i| {
                std::iter::repeat(format!("item{i}"))
                    .take(words_each)
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect()
    }

    #[test]
    fn test_empty_input() {
        let compressor = ContextCompressor::default();
        let out = compressor.compress(&[], None);
        assert_eq!(out.compressed_length, 0);
        assert_eq!(out.dropped_count, 0);
        assert!(out.content.is_empty());
    }

    #[test]
    fn test_truncate_keeps_prefix() {
        // Each item ~13 tokens (10 words); budget fits two.
        let compressor = ContextCompressor::new(27, CompressionStrategy::Truncate);
        let out = compressor.compress(&items(5, 10), None);
        assert_eq!(out.dropped_count, 3);
        assert!(out.content.starts_with("item0"));
        assert!(!out.content.contains("item4"));
    }

    #[test]
    fn test_sliding_window_keeps_suffix() {
        let compressor = ContextCompressor::new(27, CompressionStrategy::SlidingWindow);
        let out = compressor.compress(&items(5, 10), None);
        assert_eq!(out.dropped_count, 3);
        assert!(out.content.contains("item4"));
        assert!(!out.content.contains("item0"));
        // Original order preserved for the kept tail.
        assert!(out.content.find("item3") < out.content.find("item4"));
    }

    #[test]
    fn test_priority_keeps_highest_in_original_order() {
        let compressor = ContextCompressor::new(27, CompressionStrategy::Priority);
        let priorities = [0.1, 0.9, 0.2, 0.8, 0.0];
        let out = compressor.compress(&items(5, 10), Some(&priorities));
        assert_eq!(out.dropped_count, 3);
        assert!(out.content.contains("item1"));
        assert!(out.content.contains("item3"));
        assert!(out.content.find("item1") < out.content.find("item3"));
    }

    #[test]
    fn test_summarize_joins_and_trims() {
        let compressor = ContextCompressor::new(10, CompressionStrategy::Summarize);
        let out = compressor.compress(&items(4, 10), None);
        assert!(out.compressed_length <= 10);
        assert!(out.dropped_count > 0);
    }

    #[test]
    fn test_summarize_within_budget_keeps_all() {
        let compressor = ContextCompressor::new(1000, CompressionStrategy::Summarize);
        let source = vec!["alpha".to_owned(), "beta".to_owned()];
        let out = compressor.compress(&source, None);
        assert_eq!(out.content, "alpha | beta");
        assert_eq!(out.dropped_count, 0);
    }

    #[test]
    fn test_fits() {
        let compressor = ContextCompressor::new(4, CompressionStrategy::Truncate);
        assert!(compressor.fits("one two three"));
        assert!(!compressor.fits("one two three four five"));
    }
}
