//! Refinement harness -- generate-verify-refine loop with consensus
//! selection.
//!
//! [`engine::RefinementHarness`] composes a [`generator::CandidateGenerator`],
//! a [`verifier::Verifier`], a [`policy::RefinementPolicy`], and a
//! [`selector::Selector`] to iteratively produce, score, and refine provider
//! outputs until a quality threshold is met or the round budget runs out.

pub mod engine;
pub mod generator;
pub mod memory_store;
pub mod policy;
pub mod selector;
pub mod verifier;

use serde::{Deserialize, Serialize};

pub use engine::RefinementHarness;
pub use generator::{CandidateGenerator, MultiProviderGenerator, StubCandidateGenerator};
pub use memory_store::HarnessMemoryStore;
pub use policy::{DefaultPolicy, RefinementPolicy};
pub use selector::{ConsensusSelector, Selector};
pub use verifier::{CommandVerifier, TextVerifier, Verifier};

/// A single candidate output from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    /// Short candidate id.
    pub id: String,
    /// Provider that produced it.
    pub provider: String,
    /// Model that served it.
    pub model: String,
    /// Prompt that was sent.
    pub prompt: String,
    /// Generated output.
    pub output: String,
    /// Generation latency.
    pub latency_ms: f64,
    /// Total tokens reported for the generation.
    pub token_count: u32,
}

/// Verification result for a candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    /// Whether the candidate passes.
    pub passed: bool,
    /// Quality score in 0–1.
    pub score: f64,
    /// Human-readable diagnostics.
    pub diagnostics: String,
    /// Verifier-specific artifacts (captured output, etc.).
    pub artifacts: serde_json::Value,
}

impl Feedback {
    /// Feedback with empty artifacts.
    pub fn new(passed: bool, score: f64, diagnostics: impl Into<String>) -> Self {
        Self {
            passed,
            score,
            diagnostics: diagnostics.into(),
            artifacts: serde_json::json!({}),
        }
    }
}

/// Configuration for a harness run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Maximum refinement rounds.
    pub max_rounds: usize,
    /// Score at which refinement stops early.
    pub min_score: f64,
    /// Whether to fan out across all providers.
    pub ensemble: bool,
    /// Provider names consulted by the generator.
    pub providers: Vec<String>,
    /// Candidates requested per provider per round.
    pub candidates_per_provider: usize,
    /// Verifier selector (`text` or `command`).
    pub verifier: String,
    /// Shell command for the command verifier.
    pub command: Option<String>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            max_rounds: 3,
            min_score: 0.8,
            ensemble: true,
            providers: vec!["codex".to_owned(), "gemini".to_owned()],
            candidates_per_provider: 2,
            verifier: "text".to_owned(),
            command: None,
        }
    }
}

/// Result of a complete harness run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessResult {
    /// Winning candidate.
    pub winner: Candidate,
    /// Winner's feedback.
    pub feedback: Feedback,
    /// Rounds executed.
    pub rounds_used: usize,
    /// Candidates generated across all rounds.
    pub total_candidates: usize,
}

/// Harness errors.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// The generator produced no candidates in any round.
    #[error("no candidates were generated")]
    NoCandidates,
}
