//! Multi-turn conversation memory with context window limits.

use serde::{Deserialize, Serialize};

use crate::ids::now_epoch;
use crate::providers::{ChatMessage, ChatRole};

/// A single turn in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Speaker role.
    pub role: ChatRole,
    /// Turn text.
    pub content: String,
    /// Epoch seconds at append time.
    pub timestamp: f64,
    /// Free-form per-turn metadata.
    pub metadata: serde_json::Value,
}

/// Bounded multi-turn history: oldest turns are dropped past the turn cap
/// or the estimated token cap (4 chars per token).
pub struct ConversationMemory {
    turns: Vec<ConversationTurn>,
    max_turns: usize,
    max_tokens: usize,
    system_prompt: Option<String>,
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::new(50, 8000)
    }
}

impl ConversationMemory {
    /// Create a memory bounded by turn count and estimated tokens.
    pub fn new(max_turns: usize, max_tokens: usize) -> Self {
        Self {
            turns: Vec::new(),
            max_turns,
            max_tokens,
            system_prompt: None,
        }
    }

    /// Snapshot of the current turns.
    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    /// Current system prompt, if set.
    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    /// Set the system prompt prepended by [`ConversationMemory::to_messages`].
    pub fn set_system_prompt(&mut self, prompt: &str) {
        self.system_prompt = Some(prompt.to_owned());
    }

    /// Append a user turn.
    pub fn add_user_message(&mut self, content: &str) {
        self.push(ChatRole::User, content, serde_json::json!({}));
    }

    /// Append an assistant turn.
    pub fn add_assistant_message(&mut self, content: &str) {
        self.push(ChatRole::Assistant, content, serde_json::json!({}));
    }

    /// Append a tool result turn.
    pub fn add_tool_result(&mut self, content: &str, tool_name: &str) {
        self.push(
            ChatRole::Tool,
            content,
            serde_json::json!({"tool_name": tool_name}),
        );
    }

    /// Convert to a provider message list, system prompt first.
    pub fn to_messages(&self) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.turns.len().saturating_add(1));
        if let Some(ref prompt) = self.system_prompt {
            messages.push(ChatMessage {
                role: ChatRole::System,
                content: prompt.clone(),
            });
        }
        messages.extend(self.turns.iter().map(|t| ChatMessage {
            role: t.role,
            content: t.content.clone(),
        }));
        messages
    }

    /// Drop all turns, keeping the system prompt.
    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Summary of the conversation state.
    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "turn_count": self.turns.len(),
            "max_turns": self.max_turns,
            "max_tokens": self.max_tokens,
            "has_system_prompt": self.system_prompt.is_some(),
            "estimated_tokens": self.estimated_tokens(),
        })
    }

    fn push(&mut self, role: ChatRole, content: &str, metadata: serde_json::Value) {
        self.turns.push(ConversationTurn {
            role,
            content: content.to_owned(),
            timestamp: now_epoch(),
            metadata,
        });
        self.trim();
    }

    fn trim(&mut self) {
        while self.turns.len() > self.max_turns {
            self.turns.remove(0);
        }
        while self.estimated_tokens() > self.max_tokens && self.turns.len() > 1 {
            self.turns.remove(0);
        }
    }

    /// Rough token estimate: 4 chars per token across turns + system prompt.
    fn estimated_tokens(&self) -> usize {
        let mut total: usize = self
            .turns
            .iter()
            .fold(0, |acc, t| acc.saturating_add(t.content.chars().count()));
        if let Some(ref prompt) = self.system_prompt {
            total = total.saturating_add(prompt.chars().count());
        }
        total.checked_div(4).unwrap_or(0)
    }
}
