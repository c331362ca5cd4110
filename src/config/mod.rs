//! Configuration loading.
//!
//! Loads from `./config.toml` (or `$STRAYLIGHT_CONFIG_PATH`); environment
//! variables override file values, file values override defaults.
//! Default data paths resolve under the platform data directory.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StraylightConfig {
    /// LLM provider settings.
    pub llm: LlmConfig,
    /// Filesystem paths for persistent state.
    pub paths: PathsConfig,
    /// Guard settings.
    pub guard: GuardConfig,
    /// External tool-server settings.
    pub mcp: McpConfig,
}

impl StraylightConfig {
    /// Load with precedence env vars > TOML file > defaults.
    ///
    /// # Errors
    ///
    /// Returns an error when a present config file fails to parse.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from_file()?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parse a TOML string directly (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error on invalid TOML.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).context("failed to parse config TOML")
    }

    fn load_from_file() -> Result<Self> {
        let path = std::env::var("STRAYLIGHT_CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));
        match std::fs::read_to_string(&path) {
            Ok(contents) => {
                tracing::info!(path = %path.display(), "loading config from file");
                Self::from_toml(&contents)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("no config file found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!("failed to read config file: {e}")),
        }
    }

    /// Apply environment overrides through a resolver function (testable
    /// without mutating the process environment).
    pub fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(v) = env("STRAYLIGHT_LLM_PROVIDER") {
            self.llm.provider = v;
        }
        if let Some(v) = env("STRAYLIGHT_CODEX_MODEL") {
            self.llm.codex_model = v;
        }
        if let Some(v) = env("STRAYLIGHT_GEMINI_MODEL") {
            self.llm.gemini_model = v;
        }
        if let Some(v) = env("STRAYLIGHT_LLM_TIMEOUT_SEC") {
            match v.parse() {
                Ok(n) => self.llm.timeout_sec = n,
                Err(_) => tracing::warn!(
                    var = "STRAYLIGHT_LLM_TIMEOUT_SEC",
                    value = %v,
                    "ignoring invalid env override"
                ),
            }
        }
        if let Some(v) = env("STRAYLIGHT_EVIDENCE_DIR") {
            self.paths.evidence_dir = PathBuf::from(v);
        }
        if let Some(v) = env("STRAYLIGHT_ARTIFACT_DB") {
            self.paths.artifact_db = PathBuf::from(v);
        }
        if let Some(v) = env("STRAYLIGHT_GUARD_LOG_DB") {
            self.paths.guard_log_db = PathBuf::from(v);
        }
        if let Some(v) = env("STRAYLIGHT_MODEL_CACHE_DIR") {
            self.paths.model_cache_dir = PathBuf::from(v);
        }
        if let Some(v) = env("STRAYLIGHT_MCP_SERVER_CMD") {
            self.mcp.server_command = v.split_whitespace().map(str::to_owned).collect();
        }
    }
}

/// LLM provider configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider selector: `stub`, `codex`, or `gemini`.
    pub provider: String,
    /// Model name for the codex CLI.
    pub codex_model: String,
    /// Model name for the gemini CLI.
    pub gemini_model: String,
    /// Per-request provider timeout in seconds.
    pub timeout_sec: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "stub".to_owned(),
            codex_model: "gpt-5.3-codex".to_owned(),
            gemini_model: "gemini-3.1-pro-preview".to_owned(),
            timeout_sec: 300,
        }
    }
}

/// Filesystem paths for persistent state.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory for saved evidence packs.
    pub evidence_dir: PathBuf,
    /// SQLite database for the artifact store.
    pub artifact_db: PathBuf,
    /// SQLite database for the guard-check log.
    pub guard_log_db: PathBuf,
    /// Cache directory for local classifier models.
    pub model_cache_dir: PathBuf,
    /// Directory for rotated log files.
    pub logs_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        let base = directories::ProjectDirs::from("", "", "straylight")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".straylight"));
        Self {
            evidence_dir: base.join("evidence"),
            artifact_db: base.join("artifacts.db"),
            guard_log_db: base.join("guard.db"),
            model_cache_dir: base.join("models"),
            logs_dir: base.join("logs"),
        }
    }
}

/// Guard configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Per-session tool-call cap.
    pub tool_call_cap: u32,
    /// Tools the invocation guard allows.
    pub allowed_tools: Vec<String>,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            tool_call_cap: 20,
            allowed_tools: Vec::new(),
        }
    }
}

/// External tool-server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct McpConfig {
    /// Argv used to spawn the external tool server.
    pub server_command: Vec<String>,
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            server_command: vec!["ygn-core".to_owned(), "mcp".to_owned()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StraylightConfig::default();
        assert_eq!(config.llm.provider, "stub");
        assert_eq!(config.llm.timeout_sec, 300);
        assert_eq!(config.guard.tool_call_cap, 20);
        assert_eq!(config.mcp.server_command, vec!["ygn-core", "mcp"]);
    }

    #[test]
    fn test_from_toml_partial() {
        let config = StraylightConfig::from_toml(
            r#"
            [llm]
            provider = "codex"
            timeout_sec = 120
            "#,
        )
        .expect("parse");
        assert_eq!(config.llm.provider, "codex");
        assert_eq!(config.llm.timeout_sec, 120);
        // Unset fields keep defaults.
        assert_eq!(config.llm.codex_model, "gpt-5.3-codex");
    }

    #[test]
    fn test_invalid_toml_errors() {
        assert!(StraylightConfig::from_toml("llm = [not toml").is_err());
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = StraylightConfig::from_toml(
            r#"
            [llm]
            provider = "codex"
            "#,
        )
        .expect("parse");
        config.apply_overrides(|key| match key {
            "STRAYLIGHT_LLM_PROVIDER" => Some("gemini".to_owned()),
            "STRAYLIGHT_LLM_TIMEOUT_SEC" => Some("45".to_owned()),
            "STRAYLIGHT_MCP_SERVER_CMD" => Some("custom-core serve --mcp".to_owned()),
            _ => None,
        });
        assert_eq!(config.llm.provider, "gemini");
        assert_eq!(config.llm.timeout_sec, 45);
        assert_eq!(
            config.mcp.server_command,
            vec!["custom-core", "serve", "--mcp"]
        );
    }

    #[test]
    fn test_invalid_timeout_override_ignored() {
        let mut config = StraylightConfig::default();
        config.apply_overrides(|key| {
            (key == "STRAYLIGHT_LLM_TIMEOUT_SEC").then(|| "not-a-number".to_owned())
        });
        assert_eq!(config.llm.timeout_sec, 300);
    }

    #[test]
    fn test_path_overrides() {
        let mut config = StraylightConfig::default();
        config.apply_overrides(|key| {
            (key == "STRAYLIGHT_EVIDENCE_DIR").then(|| "/tmp/evidence".to_owned())
        });
        assert_eq!(config.paths.evidence_dir, PathBuf::from("/tmp/evidence"));
    }
}
