//! Codex CLI provider -- runs `codex exec` as a subprocess.
//!
//! Uses the caller's existing CLI authentication, so no API key is needed.
//! Configuration: `STRAYLIGHT_CODEX_MODEL` (model name) and
//! `STRAYLIGHT_LLM_TIMEOUT_SEC` (subprocess deadline, default 300).

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::{
    flatten_messages, word_count_u32, ChatRequest, ChatResponse, LlmProvider,
    ProviderCapabilities, ProviderError, TokenUsage, ToolSpec,
};

const DEFAULT_MODEL: &str = "gpt-5.3-codex";
const DEFAULT_TIMEOUT_SECS: u64 = 300;
const BINARY: &str = "codex";

/// Read the provider timeout from the environment, falling back to 300 s.
pub(crate) fn env_timeout_secs() -> u64 {
    std::env::var("STRAYLIGHT_LLM_TIMEOUT_SEC")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_TIMEOUT_SECS)
}

/// Whether a binary resolves on PATH.
pub(crate) fn binary_on_path(binary: &str) -> bool {
    let Some(paths) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&paths).any(|dir| {
        let candidate = dir.join(binary);
        candidate.is_file()
    })
}

/// LLM provider delegating to the `codex` CLI.
#[derive(Debug, Clone)]
pub struct CodexCliProvider {
    model_id: String,
    timeout_secs: u64,
}

impl Default for CodexCliProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl CodexCliProvider {
    /// Build a provider from environment configuration.
    pub fn new() -> Self {
        Self {
            model_id: std::env::var("STRAYLIGHT_CODEX_MODEL")
                .unwrap_or_else(|_| DEFAULT_MODEL.to_owned()),
            timeout_secs: env_timeout_secs(),
        }
    }

    /// Build a provider with explicit model and timeout.
    pub fn with_settings(model: &str, timeout_secs: u64) -> Self {
        Self {
            model_id: model.to_owned(),
            timeout_secs,
        }
    }

    async fn run(&self, prompt: &str, model: &str) -> Result<String, ProviderError> {
        if !binary_on_path(BINARY) {
            return Err(ProviderError::MissingBinary {
                binary: BINARY.to_owned(),
            });
        }

        let child = Command::new(BINARY)
            .arg("exec")
            .arg(prompt)
            .arg("-m")
            .arg(model)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .output();

        let output = tokio::time::timeout(Duration::from_secs(self.timeout_secs), child)
            .await
            .map_err(|_| ProviderError::Timeout {
                binary: BINARY.to_owned(),
                seconds: self.timeout_secs,
            })??;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();

        if !output.status.success() {
            let detail = if stderr.is_empty() { stdout } else { stderr };
            return Err(ProviderError::Subprocess {
                binary: BINARY.to_owned(),
                code: output.status.code().unwrap_or(-1),
                detail: if detail.is_empty() {
                    "unknown error".to_owned()
                } else {
                    detail
                },
            });
        }
        Ok(stdout)
    }
}

#[async_trait]
impl LlmProvider for CodexCliProvider {
    fn name(&self) -> &str {
        "codex"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::default()
    }

    fn model(&self) -> &str {
        &self.model_id
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let prompt = flatten_messages(&request);
        let model = if request.model.is_empty() || request.model == "default" {
            self.model_id.as_str()
        } else {
            request.model.as_str()
        };
        let stdout = self.run(&prompt, model).await?;
        Ok(ChatResponse {
            usage: Some(TokenUsage {
                prompt_tokens: word_count_u32(&prompt),
                completion_tokens: word_count_u32(&stdout),
            }),
            content: stdout,
            tool_calls: Vec::new(),
        })
    }

    async fn chat_with_tools(
        &self,
        mut request: ChatRequest,
        tools: &[ToolSpec],
    ) -> Result<ChatResponse, ProviderError> {
        if tools.is_empty() {
            return self.chat(request).await;
        }
        // No native tool calling: describe the tools in the last message and
        // ask for a JSON invocation.
        let tool_text = tools
            .iter()
            .map(|t| format!("- {}: {} (params: {})", t.name, t.description, t.parameters))
            .collect::<Vec<_>>()
            .join("\n");
        if let Some(last) = request.messages.last_mut() {
            last.content = format!(
                "Available tools:\n{tool_text}\n\nIf you need a tool, respond with JSON: \
                 {{\"tool\": \"<name>\", \"arguments\": {{...}}}}\n\n{}",
                last.content
            );
        }
        self.chat(request).await
    }
}
