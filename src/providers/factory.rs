//! Provider factory -- deterministic selection from the environment.
//!
//! Resolution:
//! 1. `STRAYLIGHT_LLM_PROVIDER` set → that exact provider, fail-fast on an
//!    unknown value.
//! 2. Unset with `fallback = true` → probe codex → gemini on PATH, else stub.
//! 3. Unset with `fallback = false` → stub.

use std::sync::Arc;

use super::codex::binary_on_path;
use super::{CodexCliProvider, GeminiCliProvider, LlmProvider, ProviderError, StubProvider};

/// Environment variable selecting the provider.
pub const PROVIDER_ENV: &str = "STRAYLIGHT_LLM_PROVIDER";

/// Creates the appropriate provider based on configuration.
pub struct ProviderFactory;

impl ProviderFactory {
    /// Create a provider from [`PROVIDER_ENV`].
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::UnknownProvider`] when the env var holds an
    /// unrecognized value.
    pub fn create(fallback: bool) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        let selected = std::env::var(PROVIDER_ENV)
            .unwrap_or_default()
            .trim()
            .to_lowercase();

        if !selected.is_empty() {
            return Self::create_explicit(&selected);
        }
        if fallback {
            return Ok(Self::create_with_fallback());
        }
        Ok(Arc::new(StubProvider::new()))
    }

    /// Create a specific provider by name.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::UnknownProvider`] for names other than
    /// `codex`, `gemini`, `stub`.
    pub fn create_explicit(name: &str) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        match name {
            "codex" => Ok(Arc::new(CodexCliProvider::new())),
            "gemini" => Ok(Arc::new(GeminiCliProvider::new())),
            "stub" => Ok(Arc::new(StubProvider::new())),
            other => Err(ProviderError::UnknownProvider(other.to_owned())),
        }
    }

    /// Probe CLI availability: codex first, then gemini, else stub.
    fn create_with_fallback() -> Arc<dyn LlmProvider> {
        if binary_on_path("codex") {
            return Arc::new(CodexCliProvider::new());
        }
        if binary_on_path("gemini") {
            return Arc::new(GeminiCliProvider::new());
        }
        Arc::new(StubProvider::new())
    }

    /// Human-readable provider description for diagnostics.
    pub fn describe(provider: &dyn LlmProvider) -> String {
        match provider.name() {
            "stub" => "StubProvider (deterministic responses)".to_owned(),
            name => format!("{name} (model={})", provider.model()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_stub() {
        let provider = ProviderFactory::create_explicit("stub").expect("stub");
        assert_eq!(provider.name(), "stub");
    }

    #[test]
    fn test_explicit_codex_and_gemini_construct() {
        assert_eq!(
            ProviderFactory::create_explicit("codex").expect("codex").name(),
            "codex"
        );
        assert_eq!(
            ProviderFactory::create_explicit("gemini").expect("gemini").name(),
            "gemini"
        );
    }

    #[test]
    fn test_unknown_provider_fails_fast() {
        let err = ProviderFactory::create_explicit("gpt-4").expect_err("unknown");
        assert!(matches!(err, ProviderError::UnknownProvider(_)));
        assert!(err.to_string().contains("gpt-4"));
    }

    #[test]
    fn test_describe() {
        let stub = StubProvider::new();
        assert!(ProviderFactory::describe(&stub).contains("deterministic"));
        let codex = CodexCliProvider::with_settings("m-x", 10);
        assert_eq!(ProviderFactory::describe(&codex), "codex (model=m-x)");
    }
}
