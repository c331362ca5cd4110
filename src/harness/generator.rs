//! Candidate generation backends.

use std::time::Instant;

use async_trait::async_trait;
use futures::future::join_all;

use crate::ids::short_id;
use crate::providers::{ChatMessage, ChatRequest, ProviderFactory};

use super::{Candidate, HarnessConfig};

/// Abstract candidate generation.
#[async_trait]
pub trait CandidateGenerator: Send + Sync {
    /// Generate candidates for a task from the configured providers.
    async fn generate(&self, task: &str, context: &str, config: &HarnessConfig)
        -> Vec<Candidate>;
}

/// Returns a fixed output per configured slot. For testing.
pub struct StubCandidateGenerator {
    output: String,
}

impl Default for StubCandidateGenerator {
    fn default() -> Self {
        Self::new("stub output")
    }
}

impl StubCandidateGenerator {
    /// Stub producing `output` for every candidate slot.
    pub fn new(output: &str) -> Self {
        Self {
            output: output.to_owned(),
        }
    }
}

#[async_trait]
impl CandidateGenerator for StubCandidateGenerator {
    async fn generate(
        &self,
        task: &str,
        _context: &str,
        config: &HarnessConfig,
    ) -> Vec<Candidate> {
        let mut candidates = Vec::new();
        for provider in &config.providers {
            for _ in 0..config.candidates_per_provider {
                candidates.push(Candidate {
                    id: short_id().chars().take(8).collect(),
                    provider: provider.clone(),
                    model: "stub".to_owned(),
                    prompt: task.to_owned(),
                    output: self.output.clone(),
                    latency_ms: 0.0,
                    token_count: u32::try_from(self.output.split_whitespace().count())
                        .unwrap_or(0),
                });
            }
        }
        candidates
    }
}

/// Generates candidates via real providers resolved by name through the
/// factory. Unavailable providers and failed calls are skipped with a
/// warning; the round simply yields fewer candidates.
#[derive(Debug, Default, Clone, Copy)]
pub struct MultiProviderGenerator;

#[async_trait]
impl CandidateGenerator for MultiProviderGenerator {
    async fn generate(&self, task: &str, context: &str, config: &HarnessConfig) -> Vec<Candidate> {
        let prompt = if context.is_empty() {
            task.to_owned()
        } else {
            format!("{context}\n\n{task}")
        };

        let mut calls = Vec::new();
        for provider_name in &config.providers {
            let provider = match ProviderFactory::create_explicit(provider_name) {
                Ok(provider) => provider,
                Err(error) => {
                    tracing::warn!(%error, provider = %provider_name, "skipping unavailable provider");
                    continue;
                }
            };
            for _ in 0..config.candidates_per_provider {
                let provider = std::sync::Arc::clone(&provider);
                let provider_name = provider_name.clone();
                let prompt = prompt.clone();
                calls.push(async move {
                    let model = provider.model().to_owned();
                    let started = Instant::now();
                    let response = provider
                        .chat(ChatRequest::new(
                            model.clone(),
                            vec![ChatMessage::user(prompt.clone())],
                        ))
                        .await;
                    #[allow(clippy::cast_precision_loss)]
                    let latency_ms = started.elapsed().as_micros() as f64 / 1000.0;
                    match response {
                        Ok(response) => {
                            let token_count = response
                                .usage
                                .map(|u| u.prompt_tokens.saturating_add(u.completion_tokens))
                                .unwrap_or(0);
                            Some(Candidate {
                                id: short_id().chars().take(8).collect(),
                                provider: provider_name,
                                model,
                                prompt,
                                output: response.content,
                                latency_ms,
                                token_count,
                            })
                        }
                        Err(error) => {
                            tracing::warn!(%error, provider = %provider_name, "provider chat failed");
                            None
                        }
                    }
                });
            }
        }

        join_all(calls).await.into_iter().flatten().collect()
    }
}
