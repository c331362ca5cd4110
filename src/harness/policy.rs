//! Refinement policies -- when to stop, and how to adjust the prompt.

use super::Feedback;

/// Controls refinement continuation and prompt adjustment.
pub trait RefinementPolicy: Send + Sync {
    /// Whether another refinement round should run.
    fn should_continue(&self, round: usize, best_score: f64, history: &[Feedback]) -> bool;

    /// Produce an improved prompt from the worst candidate's feedback.
    fn refine_prompt(&self, task: &str, feedback: &Feedback) -> String;
}

/// Stop after `max_rounds` or once `min_score` is reached; refine by
/// appending the feedback diagnostics and score to the task.
#[derive(Debug, Clone, Copy)]
pub struct DefaultPolicy {
    /// Round budget.
    pub max_rounds: usize,
    /// Early-stop score threshold.
    pub min_score: f64,
}

impl Default for DefaultPolicy {
    fn default() -> Self {
        Self {
            max_rounds: 3,
            min_score: 0.8,
        }
    }
}

impl DefaultPolicy {
    /// Policy with explicit bounds.
    pub fn new(max_rounds: usize, min_score: f64) -> Self {
        Self {
            max_rounds,
            min_score,
        }
    }
}

impl RefinementPolicy for DefaultPolicy {
    fn should_continue(&self, round: usize, best_score: f64, _history: &[Feedback]) -> bool {
        round < self.max_rounds && best_score < self.min_score
    }

    fn refine_prompt(&self, task: &str, feedback: &Feedback) -> String {
        format!(
            "{task}\n\nPrevious attempt feedback: {}\nScore: {:.2}. Please improve.",
            feedback.diagnostics, feedback.score
        )
    }
}
