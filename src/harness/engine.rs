//! The generate-verify-refine loop.

use sha2::{Digest, Sha256};

use crate::evidence::{EvidenceKind, EvidencePack};

use super::generator::CandidateGenerator;
use super::memory_store::HarnessMemoryStore;
use super::policy::RefinementPolicy;
use super::selector::Selector;
use super::verifier::Verifier;
use super::{Candidate, Feedback, HarnessConfig, HarnessError, HarnessResult};

/// Orchestrates generate → verify → refine rounds and final selection.
///
/// Every candidate's output hash and score, and the final selection
/// decision, are traced into an optional evidence pack under phase
/// `harness`.
pub struct RefinementHarness {
    generator: Box<dyn CandidateGenerator>,
    verifier: Box<dyn Verifier>,
    policy: Box<dyn RefinementPolicy>,
    selector: Box<dyn Selector>,
    memory: Option<HarnessMemoryStore>,
}

impl RefinementHarness {
    /// Compose a harness from its four collaborators.
    pub fn new(
        generator: Box<dyn CandidateGenerator>,
        verifier: Box<dyn Verifier>,
        policy: Box<dyn RefinementPolicy>,
        selector: Box<dyn Selector>,
    ) -> Self {
        Self {
            generator,
            verifier,
            policy,
            selector,
            memory: None,
        }
    }

    /// Attach a pattern memory store consulted before generation and
    /// updated with the winner.
    pub fn with_memory(mut self, memory: HarnessMemoryStore) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Execute the loop until the policy stops it, then select a winner.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::NoCandidates`] when no round produced any
    /// candidate.
    pub async fn run(
        &self,
        task: &str,
        config: &HarnessConfig,
        mut evidence: Option<&mut EvidencePack>,
    ) -> Result<HarnessResult, HarnessError> {
        let context = self
            .memory
            .as_ref()
            .and_then(|memory| memory.recall_context(task))
            .unwrap_or_default();

        if let Some(evidence) = evidence.as_deref_mut() {
            evidence.add(
                "harness",
                EvidenceKind::Input,
                serde_json::json!({
                    "task": task,
                    "has_memory_context": !context.is_empty(),
                }),
            );
        }

        let mut all: Vec<(Candidate, Feedback)> = Vec::new();
        let mut best_score = 0.0f64;
        let mut current_task = task.to_owned();
        let mut round = 0usize;

        while self.policy.should_continue(round, best_score, &feedbacks(&all)) {
            let candidates = self
                .generator
                .generate(&current_task, &context, config)
                .await;

            for candidate in candidates {
                let feedback = self.verifier.verify(&candidate, task).await;
                if feedback.score > best_score {
                    best_score = feedback.score;
                }
                if let Some(evidence) = evidence.as_deref_mut() {
                    evidence.add(
                        "harness",
                        EvidenceKind::Output,
                        serde_json::json!({
                            "round": round,
                            "candidate_id": candidate.id,
                            "provider": candidate.provider,
                            "output_hash": output_hash(&candidate.output),
                            "score": feedback.score,
                            "passed": feedback.passed,
                        }),
                    );
                }
                all.push((candidate, feedback));
            }

            round = round.saturating_add(1);

            if self.policy.should_continue(round, best_score, &feedbacks(&all)) {
                if let Some((_, worst)) = all.iter().min_by(|(_, a), (_, b)| {
                    a.score
                        .partial_cmp(&b.score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                }) {
                    current_task = self.policy.refine_prompt(task, worst);
                }
            }
        }

        let winner = self
            .selector
            .select(&all)
            .ok_or(HarnessError::NoCandidates)?
            .clone();
        let winner_feedback = all
            .iter()
            .find(|(c, _)| c.id == winner.id)
            .map(|(_, f)| f.clone())
            .ok_or(HarnessError::NoCandidates)?;

        if let Some(ref memory) = self.memory {
            memory.store_pattern(task, &winner, &winner_feedback);
        }

        if let Some(evidence) = evidence.as_deref_mut() {
            evidence.add(
                "harness",
                EvidenceKind::Decision,
                serde_json::json!({
                    "action": "selection",
                    "winner_id": winner.id,
                    "winner_score": winner_feedback.score,
                    "total_candidates": all.len(),
                    "rounds_used": round,
                }),
            );
        }

        Ok(HarnessResult {
            winner,
            feedback: winner_feedback,
            rounds_used: round,
            total_candidates: all.len(),
        })
    }
}

fn feedbacks(all: &[(Candidate, Feedback)]) -> Vec<Feedback> {
    all.iter().map(|(_, f)| f.clone()).collect()
}

/// First 16 hex chars of the output's SHA-256.
fn output_hash(output: &str) -> String {
    hex::encode(Sha256::digest(output.as_bytes()))
        .chars()
        .take(16)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::generator::StubCandidateGenerator;
    use crate::harness::policy::DefaultPolicy;
    use crate::harness::selector::ConsensusSelector;
    use crate::harness::verifier::TextVerifier;
    use async_trait::async_trait;

    fn harness_with(generator: Box<dyn CandidateGenerator>) -> RefinementHarness {
        RefinementHarness::new(
            generator,
            Box::new(TextVerifier),
            Box::new(DefaultPolicy::new(2, 0.8)),
            Box::new(ConsensusSelector::default()),
        )
    }

    #[tokio::test]
    async fn test_run_selects_a_winner() {
        let harness = harness_with(Box::new(StubCandidateGenerator::new(
            "A structured answer about the task:\n- point one\n- point two",
        )));
        let config = HarnessConfig {
            providers: vec!["stub".to_owned()],
            candidates_per_provider: 2,
            ..HarnessConfig::default()
        };
        let result = harness.run("the task", &config, None).await.expect("run");
        assert!(result.total_candidates >= 2);
        assert!(result.rounds_used >= 1);
        assert!(!result.winner.output.is_empty());
    }

    #[tokio::test]
    async fn test_run_traces_evidence() {
        let harness = harness_with(Box::new(StubCandidateGenerator::default()));
        let config = HarnessConfig {
            providers: vec!["stub".to_owned()],
            candidates_per_provider: 1,
            max_rounds: 1,
            ..HarnessConfig::default()
        };
        let mut evidence = EvidencePack::new("harness-test");
        harness
            .run("task", &config, Some(&mut evidence))
            .await
            .expect("run");

        assert!(evidence.verify());
        let phases: Vec<&str> = evidence.entries.iter().map(|e| e.phase.as_str()).collect();
        assert!(phases.iter().all(|p| *p == "harness"));
        // input + one candidate + selection
        assert_eq!(evidence.len(), 3);
        let hash = evidence.entries[1].data["output_hash"]
            .as_str()
            .expect("hash");
        assert_eq!(hash.len(), 16);
        assert_eq!(
            evidence.entries[2].data["action"],
            serde_json::json!("selection")
        );
    }

    struct EmptyGenerator;

    #[async_trait]
    impl CandidateGenerator for EmptyGenerator {
        async fn generate(
            &self,
            _task: &str,
            _context: &str,
            _config: &HarnessConfig,
        ) -> Vec<Candidate> {
            Vec::new()
        }
    }

    #[tokio::test]
    async fn test_no_candidates_is_an_error() {
        let harness = harness_with(Box::new(EmptyGenerator));
        let config = HarnessConfig::default();
        let err = harness.run("task", &config, None).await.expect_err("empty");
        assert!(matches!(err, HarnessError::NoCandidates));
    }

    /// Generator whose output quality improves once the prompt carries
    /// refinement feedback.
    struct ImprovingGenerator;

    #[async_trait]
    impl CandidateGenerator for ImprovingGenerator {
        async fn generate(
            &self,
            task: &str,
            _context: &str,
            _config: &HarnessConfig,
        ) -> Vec<Candidate> {
            let refined = task.contains("Please improve");
            let output = if refined {
                "A long, structured, relevant answer for the requested task:\n\
                 - the first detailed point with plenty of task words\n\
                 - the second detailed point expanding the requested task further\n\
                 - a closing summary tying the requested task together"
                    .to_owned()
            } else {
                "meh".to_owned()
            };
            vec![Candidate {
                id: crate::ids::short_id(),
                provider: "stub".to_owned(),
                model: "stub".to_owned(),
                prompt: task.to_owned(),
                output,
                latency_ms: 1.0,
                token_count: 1,
            }]
        }
    }

    #[tokio::test]
    async fn test_refinement_improves_across_rounds() {
        let harness = RefinementHarness::new(
            Box::new(ImprovingGenerator),
            Box::new(TextVerifier),
            Box::new(DefaultPolicy::new(3, 0.8)),
            Box::new(ConsensusSelector::default()),
        );
        let config = HarnessConfig {
            providers: vec!["stub".to_owned()],
            candidates_per_provider: 1,
            ..HarnessConfig::default()
        };
        let result = harness
            .run("the requested task", &config, None)
            .await
            .expect("run");
        assert!(result.rounds_used >= 2, "expected a refinement round");
        assert!(result.winner.output.len() > 10);
        assert!(result.feedback.score > 0.5);
    }
}
