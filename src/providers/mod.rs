//! LLM provider abstraction.
//!
//! Defines the [`LlmProvider`] trait and the shared request/response types
//! used by all implementations:
//!
//! - [`StubProvider`] -- deterministic canned responses for tests
//! - [`codex::CodexCliProvider`] -- `codex exec` subprocess
//! - [`gemini::GeminiCliProvider`] -- `gemini --prompt` subprocess
//!
//! [`factory::ProviderFactory`] resolves the configured provider;
//! [`router::ProviderRouter`] maps model names onto registered providers.

pub mod codex;
pub mod factory;
pub mod gemini;
pub mod router;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use codex::CodexCliProvider;
pub use factory::ProviderFactory;
pub use gemini::GeminiCliProvider;
pub use router::{ModelSelector, ProviderRouter};

// ── Core types ──────────────────────────────────────────────────

/// Conversation participant role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// System message.
    System,
    /// Human user message.
    User,
    /// Assistant (LLM) message.
    Assistant,
    /// Tool result message.
    Tool,
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Author role.
    pub role: ChatRole,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    /// Convenience constructor for a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    /// Convenience constructor for a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// Request payload sent to a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Model identifier; providers may substitute their configured default.
    pub model: String,
    /// Conversation including the latest user message.
    pub messages: Vec<ChatMessage>,
    /// Maximum tokens in the response.
    pub max_tokens: Option<u32>,
    /// Sampling temperature.
    pub temperature: Option<f64>,
}

impl ChatRequest {
    /// A request with just a model and messages.
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            max_tokens: None,
            temperature: None,
        }
    }
}

/// Specification for a tool the model may call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Tool name.
    pub name: String,
    /// Description shown to the model.
    pub description: String,
    /// JSON Schema for the tool's parameters.
    pub parameters: serde_json::Value,
}

/// A tool invocation returned by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Tool name.
    pub tool_name: String,
    /// Arguments as JSON.
    pub arguments: serde_json::Value,
}

/// Token consumption for a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens in the prompt.
    pub prompt_tokens: u32,
    /// Tokens generated.
    pub completion_tokens: u32,
}

/// Response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Response text.
    pub content: String,
    /// Tool calls requested by the model.
    pub tool_calls: Vec<ToolCall>,
    /// Usage statistics, when the backend reports them.
    pub usage: Option<TokenUsage>,
}

/// Declares what a provider can do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCapabilities {
    /// Native tool calling.
    pub native_tool_calling: bool,
    /// Image input.
    pub vision: bool,
    /// Token streaming.
    pub streaming: bool,
}

// ── Errors ──────────────────────────────────────────────────────

/// Errors returned by providers.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The provider CLI binary is not on PATH.
    #[error("{binary} CLI not found on PATH; install it or select the stub provider")]
    MissingBinary {
        /// Binary name probed.
        binary: String,
    },
    /// The subprocess exceeded its deadline.
    #[error("{binary} timed out after {seconds}s")]
    Timeout {
        /// Binary name.
        binary: String,
        /// Configured timeout.
        seconds: u64,
    },
    /// The subprocess exited non-zero.
    #[error("{binary} failed (exit {code}): {detail}")]
    Subprocess {
        /// Binary name.
        binary: String,
        /// Exit code, -1 when killed by signal.
        code: i32,
        /// Captured stderr/stdout detail.
        detail: String,
    },
    /// I/O failure spawning or talking to the subprocess.
    #[error("provider I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The requested provider name is not known.
    #[error("unknown provider '{0}', valid values: codex, gemini, stub")]
    UnknownProvider(String),
}

// ── Trait ───────────────────────────────────────────────────────

/// Core LLM provider interface.
///
/// Implementations must be `Send + Sync` for use across async task
/// boundaries in swarm fan-out and harness generation.
#[async_trait]
pub trait LlmProvider: Send + Sync + std::fmt::Debug {
    /// Canonical provider name (`stub`, `codex`, `gemini`).
    fn name(&self) -> &str;

    /// What this provider supports.
    fn capabilities(&self) -> ProviderCapabilities;

    /// The model identifier this provider is configured for.
    fn model(&self) -> &str;

    /// Request a completion.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] on transport, timeout, or backend failure.
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError>;

    /// Request a completion with tool definitions. Providers without native
    /// tool calling inline the tool descriptions into the prompt.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] on transport, timeout, or backend failure.
    async fn chat_with_tools(
        &self,
        request: ChatRequest,
        tools: &[ToolSpec],
    ) -> Result<ChatResponse, ProviderError>;
}

/// Flatten a request's messages into a single prompt string for CLI
/// providers that take one text argument.
pub(crate) fn flatten_messages(request: &ChatRequest) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(request.messages.len());
    for msg in &request.messages {
        match msg.role {
            ChatRole::System => parts.push(format!("[System] {}", msg.content)),
            ChatRole::User => parts.push(msg.content.clone()),
            ChatRole::Assistant => parts.push(format!("[Assistant] {}", msg.content)),
            ChatRole::Tool => parts.push(format!("[Tool] {}", msg.content)),
        }
    }
    parts.join("\n\n")
}

/// Word-count token estimate used by CLI providers that do not report usage.
pub(crate) fn word_count_u32(text: &str) -> u32 {
    u32::try_from(text.split_whitespace().count()).unwrap_or(u32::MAX)
}

// ── Stub provider ───────────────────────────────────────────────

/// Returns canned responses without any external calls.
#[derive(Debug, Clone)]
pub struct StubProvider {
    model_id: String,
}

impl Default for StubProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl StubProvider {
    /// Canned response prefix.
    const CANNED: &'static str = "This is a stub response for testing purposes.";

    /// Create a stub provider.
    pub fn new() -> Self {
        Self {
            model_id: "stub".to_owned(),
        }
    }
}

#[async_trait]
impl LlmProvider for StubProvider {
    fn name(&self) -> &str {
        "stub"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::default()
    }

    fn model(&self) -> &str {
        &self.model_id
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let prompt_tokens = request
            .messages
            .iter()
            .fold(0u32, |acc, m| acc.saturating_add(word_count_u32(&m.content)));
        let content = format!("{} (model={})", Self::CANNED, request.model);
        let completion_tokens = word_count_u32(&content);
        Ok(ChatResponse {
            content,
            tool_calls: Vec::new(),
            usage: Some(TokenUsage {
                prompt_tokens,
                completion_tokens,
            }),
        })
    }

    async fn chat_with_tools(
        &self,
        request: ChatRequest,
        tools: &[ToolSpec],
    ) -> Result<ChatResponse, ProviderError> {
        let mut response = self.chat(request).await?;
        if let Some(tool) = tools.first() {
            response.tool_calls.push(ToolCall {
                tool_name: tool.name.clone(),
                arguments: serde_json::json!({"input": "stub"}),
            });
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stub_is_deterministic() {
        let provider = StubProvider::new();
        let request = ChatRequest::new("m1", vec![ChatMessage::user("hello world")]);
        let a = provider.chat(request.clone()).await.expect("chat");
        let b = provider.chat(request).await.expect("chat");
        assert_eq!(a.content, b.content);
        assert!(a.content.contains("(model=m1)"));
    }

    #[tokio::test]
    async fn test_stub_counts_words() {
        let provider = StubProvider::new();
        let request = ChatRequest::new(
            "m",
            vec![
                ChatMessage::system("three word prompt"),
                ChatMessage::user("two words"),
            ],
        );
        let response = provider.chat(request).await.expect("chat");
        let usage = response.usage.expect("usage");
        assert_eq!(usage.prompt_tokens, 5);
        assert!(usage.completion_tokens > 0);
    }

    #[tokio::test]
    async fn test_stub_tool_call_when_tools_given() {
        let provider = StubProvider::new();
        let request = ChatRequest::new("m", vec![ChatMessage::user("go")]);
        let tools = [ToolSpec {
            name: "search".to_owned(),
            description: "find things".to_owned(),
            parameters: serde_json::json!({}),
        }];
        let response = provider
            .chat_with_tools(request.clone(), &tools)
            .await
            .expect("chat");
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].tool_name, "search");

        let bare = provider.chat_with_tools(request, &[]).await.expect("chat");
        assert!(bare.tool_calls.is_empty());
    }

    #[test]
    fn test_flatten_messages_roles() {
        let request = ChatRequest::new(
            "m",
            vec![
                ChatMessage::system("sys"),
                ChatMessage::user("ask"),
                ChatMessage {
                    role: ChatRole::Assistant,
                    content: "answer".to_owned(),
                },
            ],
        );
        let flat = flatten_messages(&request);
        assert_eq!(flat, "[System] sys\n\nask\n\n[Assistant] answer");
    }
}
