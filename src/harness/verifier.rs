//! Verification backends scoring candidate outputs.

use std::time::Duration;

use async_trait::async_trait;

use super::{Candidate, Feedback};

/// Phrases that indicate a refused response.
const REFUSAL_PHRASES: &[&str] = &[
    "i cannot",
    "i can't",
    "i'm unable",
    "i am unable",
    "i apologize",
    "as an ai",
    "i don't have access",
];

/// Abstract candidate verification.
#[async_trait]
pub trait Verifier: Send + Sync {
    /// Score a candidate against the original task.
    async fn verify(&self, candidate: &Candidate, task: &str) -> Feedback;
}

/// Heuristic text-quality verifier.
///
/// Sums four sub-scores: length (0–0.3), non-refusal (0 or 0.3),
/// task-relevance word overlap (0–0.2), and structural markers (0–0.2).
/// A candidate passes at score >= 0.5 without a refusal.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextVerifier;

#[async_trait]
impl Verifier for TextVerifier {
    async fn verify(&self, candidate: &Candidate, task: &str) -> Feedback {
        let text = candidate.output.trim();
        if text.is_empty() {
            return Feedback::new(false, 0.0, "Empty output");
        }

        let mut score = 0.0f64;
        let mut diagnostics: Vec<&str> = Vec::new();

        // Length (0-0.3).
        #[allow(clippy::cast_precision_loss)]
        let length_score = (text.chars().count() as f64 / 200.0).min(0.3);
        score += length_score;

        // Refusal check (0 or 0.3).
        let lower = text.to_lowercase();
        let is_refusal = REFUSAL_PHRASES.iter().any(|p| lower.contains(p));
        if is_refusal {
            diagnostics.push("Detected refusal pattern");
        } else {
            score += 0.3;
        }

        // Task relevance (0-0.2).
        let task_lower = task.to_lowercase();
        let task_set: std::collections::HashSet<&str> = task_lower.split_whitespace().collect();
        let output_set: std::collections::HashSet<&str> = lower.split_whitespace().collect();
        #[allow(clippy::cast_precision_loss)]
        let overlap =
            task_set.intersection(&output_set).count() as f64 / task_set.len().max(1) as f64;
        score += overlap.min(0.2);

        // Structure (0-0.2).
        if ["\n", "- ", "1.", "```", "##"].iter().any(|m| text.contains(m)) {
            score += 0.2;
        }

        let score = (score * 1000.0).round() / 1000.0;
        let passed = score >= 0.5 && !is_refusal;
        Feedback::new(
            passed,
            score,
            if diagnostics.is_empty() {
                "ok".to_owned()
            } else {
                diagnostics.join("; ")
            },
        )
    }
}

/// Runs a shell command; exit 0 scores 1.0, anything else 0.0.
pub struct CommandVerifier {
    command: String,
    timeout: Duration,
}

impl CommandVerifier {
    /// Verifier running `command` through `sh -c` under `timeout`.
    pub fn new(command: &str, timeout: Duration) -> Self {
        Self {
            command: command.to_owned(),
            timeout,
        }
    }
}

#[async_trait]
impl Verifier for CommandVerifier {
    async fn verify(&self, _candidate: &Candidate, _task: &str) -> Feedback {
        let run = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .output();

        let output = match tokio::time::timeout(self.timeout, run).await {
            Ok(Ok(output)) => output,
            Ok(Err(error)) => {
                return Feedback::new(false, 0.0, format!("spawn failed: {error}"));
            }
            Err(_) => {
                return Feedback::new(
                    false,
                    0.0,
                    format!("Timed out after {}s", self.timeout.as_secs()),
                );
            }
        };

        let code = output.status.code().unwrap_or(-1);
        let passed = output.status.success();
        let mut feedback = Feedback::new(
            passed,
            if passed { 1.0 } else { 0.0 },
            format!("exit code {code}"),
        );
        feedback.artifacts = serde_json::json!({
            "stdout": truncate(&String::from_utf8_lossy(&output.stdout), 2000),
            "stderr": truncate(&String::from_utf8_lossy(&output.stderr), 2000),
        });
        feedback
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(output: &str) -> Candidate {
        Candidate {
            id: "c1".to_owned(),
            provider: "stub".to_owned(),
            model: "stub".to_owned(),
            prompt: "p".to_owned(),
            output: output.to_owned(),
            latency_ms: 1.0,
            token_count: 5,
        }
    }

    #[tokio::test]
    async fn test_empty_output_scores_zero() {
        let feedback = TextVerifier.verify(&candidate("   "), "task").await;
        assert!(!feedback.passed);
        assert_eq!(feedback.score, 0.0);
        assert_eq!(feedback.diagnostics, "Empty output");
    }

    #[tokio::test]
    async fn test_refusal_detected() {
        let feedback = TextVerifier
            .verify(
                &candidate("I cannot help with that request, I apologize."),
                "task",
            )
            .await;
        assert!(!feedback.passed);
        assert!(feedback.diagnostics.contains("refusal"));
    }

    #[tokio::test]
    async fn test_good_structured_answer_passes() {
        let output = "Here is the plan for the deployment task:\n\
                      - step one prepares the environment\n\
                      - step two runs the deployment task itself\n\
                      - step three verifies the deployment result end to end\n\
                      The deployment task completes after verification.";
        let feedback = TextVerifier
            .verify(&candidate(output), "plan the deployment task")
            .await;
        assert!(feedback.passed, "score was {}", feedback.score);
        assert!(feedback.score >= 0.5);
        assert_eq!(feedback.diagnostics, "ok");
    }

    #[tokio::test]
    async fn test_relevance_contributes() {
        let relevant = TextVerifier
            .verify(
                &candidate("the quick brown fox jumps swiftly"),
                "quick brown fox",
            )
            .await;
        let irrelevant = TextVerifier
            .verify(
                &candidate("the quick brown fox jumps swiftly"),
                "unrelated topic entirely",
            )
            .await;
        assert!(relevant.score > irrelevant.score);
    }

    #[tokio::test]
    async fn test_command_verifier_success() {
        let verifier = CommandVerifier::new("true", Duration::from_secs(10));
        let feedback = verifier.verify(&candidate("x"), "task").await;
        assert!(feedback.passed);
        assert_eq!(feedback.score, 1.0);
        assert_eq!(feedback.diagnostics, "exit code 0");
    }

    #[tokio::test]
    async fn test_command_verifier_failure() {
        let verifier = CommandVerifier::new("exit 3", Duration::from_secs(10));
        let feedback = verifier.verify(&candidate("x"), "task").await;
        assert!(!feedback.passed);
        assert_eq!(feedback.score, 0.0);
        assert_eq!(feedback.diagnostics, "exit code 3");
    }

    #[tokio::test]
    async fn test_command_verifier_captures_output() {
        let verifier = CommandVerifier::new("echo captured-marker", Duration::from_secs(10));
        let feedback = verifier.verify(&candidate("x"), "task").await;
        assert!(feedback.artifacts["stdout"]
            .as_str()
            .expect("stdout captured")
            .contains("captured-marker"));
    }

    #[tokio::test]
    async fn test_command_verifier_timeout() {
        let verifier = CommandVerifier::new("sleep 5", Duration::from_millis(50));
        let feedback = verifier.verify(&candidate("x"), "task").await;
        assert!(!feedback.passed);
        assert!(feedback.diagnostics.contains("Timed out"));
    }
}
