//! Embedding service abstraction for semantic recall.
//!
//! The stub backend returns zero vectors; the Ollama backend calls the
//! local `/api/embeddings` endpoint over blocking HTTP (embedding happens
//! outside the async request path, during indexing).

use serde::Deserialize;
use thiserror::Error;

/// Default base URL for a local Ollama instance.
const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// Errors from embedding generation.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// HTTP transport failure.
    #[error("embedding request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// Response did not match the expected shape.
    #[error("embedding response parse error: {0}")]
    Parse(String),
}

/// Abstract embedding backend.
pub trait EmbeddingService: Send + Sync {
    /// Embed a batch of texts into vectors.
    ///
    /// # Errors
    ///
    /// Returns [`EmbeddingError`] when the backend is unreachable or the
    /// response is malformed.
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Dimensionality of produced vectors.
    fn dimension(&self) -> usize;
}

/// Returns zero vectors; for testing without ML dependencies.
#[derive(Debug, Clone, Copy)]
pub struct StubEmbeddingService {
    dim: usize,
}

impl Default for StubEmbeddingService {
    fn default() -> Self {
        Self { dim: 384 }
    }
}

impl StubEmbeddingService {
    /// Create a stub with the given dimensionality.
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

impl EmbeddingService for StubEmbeddingService {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|_| vec![0.0; self.dim]).collect())
    }

    fn dimension(&self) -> usize {
        self.dim
    }
}

#[derive(Deserialize)]
struct OllamaEmbeddingResponse {
    embedding: Vec<f32>,
}

/// Embeddings via the Ollama `/api/embeddings` endpoint.
pub struct OllamaEmbeddingService {
    model: String,
    dim: usize,
    url: String,
    client: reqwest::blocking::Client,
}

impl std::fmt::Debug for OllamaEmbeddingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaEmbeddingService")
            .field("model", &self.model)
            .field("dim", &self.dim)
            .field("url", &self.url)
            .finish()
    }
}

impl OllamaEmbeddingService {
    /// Create a service for `model` with the expected vector dimension.
    pub fn new(model: &str, dim: usize) -> Self {
        Self::with_base_url(model, dim, DEFAULT_OLLAMA_BASE_URL)
    }

    /// Create a service pointed at a custom Ollama base URL.
    pub fn with_base_url(model: &str, dim: usize, base_url: &str) -> Self {
        Self {
            model: model.to_owned(),
            dim,
            url: format!("{base_url}/api/embeddings"),
            client: reqwest::blocking::Client::new(),
        }
    }
}

impl EmbeddingService for OllamaEmbeddingService {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            let response = self
                .client
                .post(&self.url)
                .json(&serde_json::json!({"model": self.model, "prompt": text}))
                .send()?
                .error_for_status()?;
            let parsed: OllamaEmbeddingResponse = response
                .json()
                .map_err(|e| EmbeddingError::Parse(e.to_string()))?;
            results.push(parsed.embedding);
        }
        Ok(results)
    }

    fn dimension(&self) -> usize {
        self.dim
    }
}

/// Cosine similarity between two vectors.
///
/// Returns 0.0 for empty, mismatched-length, or zero-norm vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += f64::from(*x) * f64::from(*y);
        norm_a += f64::from(*x) * f64::from(*x);
        norm_b += f64::from(*y) * f64::from(*y);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    #[allow(clippy::cast_possible_truncation)]
    let sim = (dot / (norm_a.sqrt() * norm_b.sqrt())) as f32;
    sim
}
