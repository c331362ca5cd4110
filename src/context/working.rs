//! Working context -- compiled, token-budgeted view of a session.

use serde::{Deserialize, Serialize};

/// A role-tagged message in the compiled history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextMessage {
    /// Message role (`user`, `assistant`, `system`).
    pub role: String,
    /// Message text.
    pub content: String,
}

/// A memory entry attached to the context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryHit {
    /// Memory key.
    pub key: String,
    /// Memory content.
    pub content: String,
    /// Category label.
    pub category: String,
}

/// A compact reference to an externalized artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// Content-hash handle.
    pub handle: String,
    /// Short preview of the stored bytes.
    pub summary: String,
    /// Stored size in bytes.
    pub size_bytes: usize,
    /// Producer label.
    pub source: String,
}

/// A raw tool result still inlined in the context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResultEntry {
    /// Tool name.
    pub tool: String,
    /// Raw result text.
    pub result: String,
}

/// Budget-aware compiled context for provider calls.
///
/// `token_count` is the estimated cost of everything included;
/// `is_within_budget` holds exactly when `token_count <= budget`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingContext {
    /// System prompt prepended to every provider call.
    pub system_prompt: String,
    /// Selected conversation history.
    pub history: Vec<ContextMessage>,
    /// Attached memory hits.
    pub memory_hits: Vec<MemoryHit>,
    /// References to externalized artifacts.
    pub artifact_refs: Vec<ArtifactRef>,
    /// Tool results still inlined.
    pub tool_results: Vec<ToolResultEntry>,
    /// Estimated tokens across all included fields.
    pub token_count: usize,
    /// Caller-supplied token budget.
    pub budget: usize,
}

impl WorkingContext {
    /// An empty context holding only the system prompt.
    pub fn empty(system_prompt: &str, budget: usize) -> Self {
        Self {
            system_prompt: system_prompt.to_owned(),
            history: Vec::new(),
            memory_hits: Vec::new(),
            artifact_refs: Vec::new(),
            tool_results: Vec::new(),
            token_count: super::budget::estimate_tokens(system_prompt),
            budget,
        }
    }

    /// Whether the context fits its budget.
    pub fn is_within_budget(&self) -> bool {
        self.token_count <= self.budget
    }

    /// Tokens past the budget, 0 when within it.
    pub fn overflow(&self) -> usize {
        self.token_count.saturating_sub(self.budget)
    }

    /// Serialize to a provider message list: one system message carrying the
    /// system prompt plus memories, artifact references, and tool results,
    /// followed by the history in order.
    pub fn to_messages(&self) -> Vec<ContextMessage> {
        let mut parts: Vec<String> = vec![self.system_prompt.clone()];

        if !self.memory_hits.is_empty() {
            parts.push("\n\n## Relevant memories".to_owned());
            for hit in &self.memory_hits {
                parts.push(format!("- [{}]: {}", hit.key, hit.content));
            }
        }

        if !self.artifact_refs.is_empty() {
            parts.push("\n\n## Available artifacts (use handle to retrieve)".to_owned());
            for artifact in &self.artifact_refs {
                parts.push(format!(
                    "- [{}] ({} bytes): {}",
                    artifact.handle, artifact.size_bytes, artifact.summary
                ));
            }
        }

        if !self.tool_results.is_empty() {
            parts.push("\n\n## Recent tool results".to_owned());
            for tr in &self.tool_results {
                parts.push(format!("- {}: {}", tr.tool, tr.result));
            }
        }

        let mut messages = vec![ContextMessage {
            role: "system".to_owned(),
            content: parts.join("\n"),
        }];
        messages.extend(self.history.iter().cloned());
        messages
    }
}
