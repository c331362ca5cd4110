//! Provider routing -- maps model names to providers and picks models for
//! tasks by complexity.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::swarm::TaskComplexity;

use super::LlmProvider;

/// Routing errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouterError {
    /// No registered provider matches the model name.
    #[error("no provider found for model '{0}'")]
    NoProvider(String),
    /// The named provider is not registered.
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
}

/// Model-name prefixes mapped to canonical provider names.
const PREFIX_MAP: &[(&str, &str)] = &[
    ("claude", "claude"),
    ("gpt", "openai"),
    ("o1", "openai"),
    ("o3", "openai"),
    ("gemini", "gemini"),
    ("llama", "ollama"),
    ("mistral", "ollama"),
    ("phi", "ollama"),
];

/// Routes model names to registered providers.
#[derive(Default)]
pub struct ProviderRouter {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    model_map: HashMap<String, String>,
    default: Option<String>,
}

impl ProviderRouter {
    /// Empty router; register providers before routing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under its canonical name.
    pub fn register(&mut self, provider: Arc<dyn LlmProvider>) {
        self.providers.insert(provider.name().to_owned(), provider);
    }

    /// Set the default provider used when no mapping matches.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::UnknownProvider`] when the name is not
    /// registered.
    pub fn set_default(&mut self, provider_name: &str) -> Result<(), RouterError> {
        if !self.providers.contains_key(provider_name) {
            return Err(RouterError::UnknownProvider(provider_name.to_owned()));
        }
        self.default = Some(provider_name.to_owned());
        Ok(())
    }

    /// Explicitly map a model name to a registered provider.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::UnknownProvider`] when the name is not
    /// registered.
    pub fn map_model(&mut self, model_name: &str, provider_name: &str) -> Result<(), RouterError> {
        if !self.providers.contains_key(provider_name) {
            return Err(RouterError::UnknownProvider(provider_name.to_owned()));
        }
        self.model_map
            .insert(model_name.to_owned(), provider_name.to_owned());
        Ok(())
    }

    /// Resolve a model name: explicit map, then prefix heuristics, then the
    /// default provider.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::NoProvider`] when nothing matches.
    pub fn route(&self, model_name: &str) -> Result<Arc<dyn LlmProvider>, RouterError> {
        if let Some(provider_name) = self.model_map.get(model_name) {
            if let Some(provider) = self.providers.get(provider_name) {
                return Ok(Arc::clone(provider));
            }
        }

        let lower = model_name.to_lowercase();
        for (prefix, provider_name) in PREFIX_MAP {
            if lower.starts_with(prefix) {
                if let Some(provider) = self.providers.get(*provider_name) {
                    return Ok(Arc::clone(provider));
                }
            }
        }

        if let Some(ref default) = self.default {
            if let Some(provider) = self.providers.get(default) {
                return Ok(Arc::clone(provider));
            }
        }

        Err(RouterError::NoProvider(model_name.to_owned()))
    }

    /// Get a provider by canonical name.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::UnknownProvider`] when the name is not
    /// registered.
    pub fn get(&self, provider_name: &str) -> Result<Arc<dyn LlmProvider>, RouterError> {
        self.providers
            .get(provider_name)
            .cloned()
            .ok_or_else(|| RouterError::UnknownProvider(provider_name.to_owned()))
    }

    /// Sorted list of registered provider names.
    pub fn list_providers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }
}

// ── Model selector ──────────────────────────────────────────────

/// Default model names by task complexity.
fn complexity_model(complexity: TaskComplexity) -> &'static str {
    match complexity {
        TaskComplexity::Trivial | TaskComplexity::Simple => "claude-3-haiku-20240307",
        TaskComplexity::Moderate | TaskComplexity::Complex => "claude-3-5-sonnet-20241022",
        TaskComplexity::Expert => "claude-3-opus-20240229",
    }
}

/// Selects the best model name for a task.
#[derive(Debug, Default, Clone, Copy)]
pub struct ModelSelector;

impl ModelSelector {
    /// Pick a model for the given complexity, optionally constrained to a
    /// preferred provider.
    pub fn select(
        &self,
        complexity: TaskComplexity,
        preferred_provider: Option<&str>,
    ) -> String {
        match preferred_provider {
            Some("openai") => {
                if matches!(complexity, TaskComplexity::Expert | TaskComplexity::Complex) {
                    "gpt-4o".to_owned()
                } else {
                    "gpt-4o-mini".to_owned()
                }
            }
            Some("gemini") => "gemini-1.5-pro".to_owned(),
            Some("ollama") => "llama3".to_owned(),
            _ => complexity_model(complexity).to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::StubProvider;

    fn stub_named(name: &'static str) -> Arc<dyn LlmProvider> {
        // A stub provider wearing a different canonical name for routing
        // tests.
        #[derive(Debug)]
        struct Named(&'static str, StubProvider);
        #[async_trait::async_trait]
        impl LlmProvider for Named {
            fn name(&self) -> &str {
                self.0
            }
            fn capabilities(&self) -> crate::providers::ProviderCapabilities {
                self.1.capabilities()
            }
            fn model(&self) -> &str {
                "stub"
            }
            async fn chat(
                &self,
                request: crate::providers::ChatRequest,
            ) -> Result<crate::providers::ChatResponse, crate::providers::ProviderError>
            {
                self.1.chat(request).await
            }
            async fn chat_with_tools(
                &self,
                request: crate::providers::ChatRequest,
                tools: &[crate::providers::ToolSpec],
            ) -> Result<crate::providers::ChatResponse, crate::providers::ProviderError>
            {
                self.1.chat_with_tools(request, tools).await
            }
        }
        Arc::new(Named(name, StubProvider::new()))
    }

    #[test]
    fn test_explicit_mapping_wins() {
        let mut router = ProviderRouter::new();
        router.register(stub_named("openai"));
        router.register(stub_named("claude"));
        router.map_model("claude-x", "openai").expect("map");
        assert_eq!(router.route("claude-x").expect("route").name(), "openai");
    }

    #[test]
    fn test_prefix_heuristics() {
        let mut router = ProviderRouter::new();
        router.register(stub_named("openai"));
        router.register(stub_named("ollama"));
        assert_eq!(router.route("gpt-4o").expect("route").name(), "openai");
        assert_eq!(router.route("o3-mini").expect("route").name(), "openai");
        assert_eq!(router.route("llama3").expect("route").name(), "ollama");
        assert_eq!(router.route("mistral-7b").expect("route").name(), "ollama");
    }

    #[test]
    fn test_default_fallback() {
        let mut router = ProviderRouter::new();
        router.register(stub_named("stub"));
        router.set_default("stub").expect("default");
        assert_eq!(router.route("totally-unknown").expect("route").name(), "stub");
    }

    #[test]
    fn test_no_provider_error() {
        let router = ProviderRouter::new();
        assert_eq!(
            router.route("gpt-4o").expect_err("no providers"),
            RouterError::NoProvider("gpt-4o".to_owned())
        );
    }

    #[test]
    fn test_set_default_requires_registration() {
        let mut router = ProviderRouter::new();
        assert!(router.set_default("missing").is_err());
    }

    #[test]
    fn test_list_providers_sorted() {
        let mut router = ProviderRouter::new();
        router.register(stub_named("ollama"));
        router.register(stub_named("claude"));
        assert_eq!(router.list_providers(), vec!["claude", "ollama"]);
    }

    #[test]
    fn test_model_selector_by_complexity() {
        let selector = ModelSelector;
        assert_eq!(
            selector.select(TaskComplexity::Trivial, None),
            "claude-3-haiku-20240307"
        );
        assert_eq!(
            selector.select(TaskComplexity::Expert, None),
            "claude-3-opus-20240229"
        );
    }

    #[test]
    fn test_model_selector_preferred_provider() {
        let selector = ModelSelector;
        assert_eq!(selector.select(TaskComplexity::Expert, Some("openai")), "gpt-4o");
        assert_eq!(
            selector.select(TaskComplexity::Simple, Some("openai")),
            "gpt-4o-mini"
        );
        assert_eq!(
            selector.select(TaskComplexity::Moderate, Some("gemini")),
            "gemini-1.5-pro"
        );
    }
}
