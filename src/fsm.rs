//! Finite state machine for the seven-phase cognitive pipeline.
//!
//! Transitions are linear from `idle` through `validation`, with the single
//! legal backward edge `validation -> execution` for retries, then
//! `synthesis -> complete -> idle`. Anything else is an
//! [`FsmError::InvalidTransition`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Pipeline phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Waiting for work.
    Idle,
    /// Understand the input.
    Diagnosis,
    /// Pick a strategy.
    Analysis,
    /// Produce an execution plan.
    Planning,
    /// Run the plan.
    Execution,
    /// Check the execution output.
    Validation,
    /// Consolidate the final answer.
    Synthesis,
    /// Finalize and return to idle.
    Complete,
}

impl Phase {
    /// Stable lowercase label used in evidence entries and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Diagnosis => "diagnosis",
            Self::Analysis => "analysis",
            Self::Planning => "planning",
            Self::Execution => "execution",
            Self::Validation => "validation",
            Self::Synthesis => "synthesis",
            Self::Complete => "complete",
        }
    }

    /// Phases a given phase may transition into.
    fn successors(self) -> &'static [Phase] {
        match self {
            Self::Idle => &[Phase::Diagnosis],
            Self::Diagnosis => &[Phase::Analysis],
            Self::Analysis => &[Phase::Planning],
            Self::Planning => &[Phase::Execution],
            Self::Execution => &[Phase::Validation],
            Self::Validation => &[Phase::Synthesis, Phase::Execution],
            Self::Synthesis => &[Phase::Complete],
            Self::Complete => &[Phase::Idle],
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// FSM transition errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FsmError {
    /// The requested transition is not in the transition table.
    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition {
        /// Current phase.
        from: Phase,
        /// Requested phase.
        to: Phase,
    },
}

/// Current FSM position plus free-form context carried between phases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsmState {
    /// Current phase.
    pub phase: Phase,
    /// Opaque context shared by phase handlers.
    pub context: serde_json::Value,
}

impl Default for FsmState {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            context: serde_json::Value::Object(serde_json::Map::new()),
        }
    }
}

impl FsmState {
    /// Create a fresh state at `idle` with empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the transition to `target` is legal from the current phase.
    pub fn can_transition(&self, target: Phase) -> bool {
        self.phase.successors().contains(&target)
    }

    /// Transition into `target`, carrying the context forward.
    ///
    /// # Errors
    ///
    /// Returns [`FsmError::InvalidTransition`] when the edge is not in the
    /// transition table.
    pub fn transition(self, target: Phase) -> Result<FsmState, FsmError> {
        if !self.can_transition(target) {
            return Err(FsmError::InvalidTransition {
                from: self.phase,
                to: target,
            });
        }
        Ok(FsmState {
            phase: target,
            context: self.context,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_phase_is_idle() {
        assert_eq!(FsmState::new().phase, Phase::Idle);
    }

    #[test]
    fn test_full_forward_walk() {
        let mut state = FsmState::new();
        for phase in [
            Phase::Diagnosis,
            Phase::Analysis,
            Phase::Planning,
            Phase::Execution,
            Phase::Validation,
            Phase::Synthesis,
            Phase::Complete,
            Phase::Idle,
        ] {
            state = state.transition(phase).expect("legal transition");
        }
        assert_eq!(state.phase, Phase::Idle);
    }

    #[test]
    fn test_validation_can_retry_execution() {
        let state = FsmState {
            phase: Phase::Validation,
            context: serde_json::json!({}),
        };
        let state = state.transition(Phase::Execution).expect("retry edge");
        assert_eq!(state.phase, Phase::Execution);
    }

    #[test]
    fn test_skipping_phases_is_rejected() {
        let err = FsmState::new()
            .transition(Phase::Synthesis)
            .expect_err("idle cannot jump to synthesis");
        assert_eq!(
            err,
            FsmError::InvalidTransition {
                from: Phase::Idle,
                to: Phase::Synthesis,
            }
        );
    }

    #[test]
    fn test_no_backward_edges_except_validation() {
        for (from, to) in [
            (Phase::Analysis, Phase::Diagnosis),
            (Phase::Planning, Phase::Analysis),
            (Phase::Execution, Phase::Planning),
            (Phase::Synthesis, Phase::Validation),
            (Phase::Complete, Phase::Synthesis),
        ] {
            let state = FsmState {
                phase: from,
                context: serde_json::json!({}),
            };
            assert!(
                state.transition(to).is_err(),
                "{from} -> {to} must be rejected"
            );
        }
    }

    #[test]
    fn test_synthesis_requires_validation_first() {
        // From any phase before validation, synthesis is unreachable directly.
        for phase in [
            Phase::Idle,
            Phase::Diagnosis,
            Phase::Analysis,
            Phase::Planning,
            Phase::Execution,
        ] {
            let state = FsmState {
                phase,
                context: serde_json::json!({}),
            };
            assert!(!state.can_transition(Phase::Synthesis));
        }
    }

    #[test]
    fn test_context_is_carried() {
        let state = FsmState {
            phase: Phase::Idle,
            context: serde_json::json!({"k": "v"}),
        };
        let state = state.transition(Phase::Diagnosis).expect("legal");
        assert_eq!(state.context["k"], "v");
    }

    #[test]
    fn test_phase_serde_tags() {
        let json = serde_json::to_string(&Phase::Diagnosis).expect("serialize");
        assert_eq!(json, "\"diagnosis\"");
        let back: Phase = serde_json::from_str("\"diagnosis\"").expect("roundtrip");
        assert_eq!(back, Phase::Diagnosis);
        assert!(serde_json::from_str::<Phase>("\"unknown\"").is_err());
    }
}
