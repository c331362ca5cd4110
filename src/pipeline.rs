//! HiveMind seven-phase pipeline -- structured cognitive execution.
//!
//! Runs diagnosis → analysis → planning → execution → validation →
//! synthesis → complete, appending one evidence entry per phase. The
//! synchronous variant is fully deterministic; the provider-backed variant
//! delegates the cognitive phases (analysis, planning, execution,
//! synthesis) to an LLM while diagnosis, validation, and complete stay
//! deterministic. The pipeline never retries past validation on its own;
//! retries are a refinement-harness policy decision.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::evidence::{EvidenceKind, EvidencePack};
use crate::fsm::{FsmError, FsmState, Phase};
use crate::providers::{ChatMessage, ChatRequest, ChatResponse, LlmProvider, ProviderError};

/// Terminal status of a single phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseStatus {
    /// Phase completed normally.
    Ok,
    /// Phase hit its deadline.
    Timeout,
    /// Phase failed.
    Error,
    /// Phase was skipped.
    Skipped,
}

/// Output from a single pipeline phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseResult {
    /// Which phase produced this.
    pub phase: Phase,
    /// Phase payload.
    pub data: serde_json::Value,
    /// Confidence in the phase outcome, 0–1.
    pub confidence: f64,
    /// Terminal status.
    pub status: PhaseStatus,
    /// Wall-clock duration of the phase.
    pub latency_ms: f64,
}

impl PhaseResult {
    fn ok(phase: Phase, data: serde_json::Value, confidence: f64, started: Instant) -> Self {
        Self {
            phase,
            data,
            confidence,
            status: PhaseStatus::Ok,
            latency_ms: elapsed_ms(started),
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_micros() as f64 / 1000.0
}

/// Pipeline errors: an illegal FSM walk or a provider failure mid-phase.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The FSM rejected a transition. Indicates a programming error.
    #[error(transparent)]
    Fsm(#[from] FsmError),
    /// A provider-backed phase failed; evidence up to this phase is intact.
    #[error("provider failure in {phase} phase: {source}")]
    Provider {
        /// Phase that was running.
        phase: Phase,
        /// Underlying provider error.
        source: ProviderError,
    },
}

/// Executes the seven-phase pipeline, producing evidence along the way.
#[derive(Debug, Default, Clone, Copy)]
pub struct HiveMindPipeline;

impl HiveMindPipeline {
    /// Create a pipeline.
    pub fn new() -> Self {
        Self
    }

    /// Run all seven phases deterministically.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Fsm`] only on an illegal transition, which
    /// cannot happen with the fixed walk and indicates a programming error.
    pub fn run(
        &self,
        user_input: &str,
        evidence: &mut EvidencePack,
    ) -> Result<Vec<PhaseResult>, PipelineError> {
        let mut fsm = FsmState::new();
        let mut results: Vec<PhaseResult> = Vec::with_capacity(7);

        // Diagnosis: record input shape.
        fsm = fsm.transition(Phase::Diagnosis)?;
        let started = Instant::now();
        let diag_data = diagnosis_data(user_input);
        evidence.add("diagnosis", EvidenceKind::Input, diag_data.clone());
        results.push(PhaseResult::ok(Phase::Diagnosis, diag_data, 1.0, started));

        // Analysis: pick a strategy label.
        fsm = fsm.transition(Phase::Analysis)?;
        let started = Instant::now();
        let strategy = determine_strategy(user_input);
        let analysis_data = serde_json::json!({"strategy": strategy});
        evidence.add("analysis", EvidenceKind::Decision, analysis_data.clone());
        results.push(PhaseResult::ok(Phase::Analysis, analysis_data, 0.9, started));

        // Planning: build an execution plan.
        fsm = fsm.transition(Phase::Planning)?;
        let started = Instant::now();
        let plan = serde_json::json!({
            "strategy": strategy,
            "steps": [
                {"action": "process", "input": user_input},
                {"action": "respond"},
            ],
        });
        let plan_data = serde_json::json!({"plan": plan});
        evidence.add("planning", EvidenceKind::Decision, plan_data.clone());
        results.push(PhaseResult::ok(Phase::Planning, plan_data, 0.85, started));

        // Execution: run the plan.
        fsm = fsm.transition(Phase::Execution)?;
        let started = Instant::now();
        let exec_output = format!("Processed: {user_input}");
        let exec_data = serde_json::json!({"output": exec_output});
        evidence.add("execution", EvidenceKind::Output, exec_data.clone());
        results.push(PhaseResult::ok(Phase::Execution, exec_data, 0.8, started));

        // Validation: check the execution output.
        fsm = fsm.transition(Phase::Validation)?;
        let started = Instant::now();
        let passed = !exec_output.is_empty();
        let val_data = serde_json::json!({"passed": passed, "output": exec_output});
        evidence.add("validation", EvidenceKind::Decision, val_data.clone());
        results.push(PhaseResult::ok(
            Phase::Validation,
            val_data,
            if passed { 0.9 } else { 0.4 },
            started,
        ));

        // Synthesis: consolidate the final answer.
        fsm = fsm.transition(Phase::Synthesis)?;
        let started = Instant::now();
        let synth_data = serde_json::json!({"final": exec_output});
        evidence.add("synthesis", EvidenceKind::Output, synth_data.clone());
        results.push(PhaseResult::ok(Phase::Synthesis, synth_data, 0.95, started));

        // Complete: mark status.
        fsm = fsm.transition(Phase::Complete)?;
        let started = Instant::now();
        let complete_data =
            serde_json::json!({"status": "complete", "phases_run": results.len().saturating_add(1)});
        evidence.add("complete", EvidenceKind::Output, complete_data.clone());
        results.push(PhaseResult::ok(Phase::Complete, complete_data, 1.0, started));

        let _ = fsm;
        Ok(results)
    }

    /// Run all seven phases with a provider driving the cognitive steps.
    /// Diagnosis, validation, and complete keep their deterministic logic.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Provider`] when a provider call fails; all
    /// evidence entries appended before the failure remain in the pack.
    pub async fn run_with_provider(
        &self,
        user_input: &str,
        evidence: &mut EvidencePack,
        provider: Arc<dyn LlmProvider>,
    ) -> Result<Vec<PhaseResult>, PipelineError> {
        let model = provider.model().to_owned();
        evidence.set_model_id(model.clone());
        let mut fsm = FsmState::new();
        let mut results: Vec<PhaseResult> = Vec::with_capacity(7);

        // Diagnosis (deterministic).
        fsm = fsm.transition(Phase::Diagnosis)?;
        let started = Instant::now();
        let diag_data = diagnosis_data(user_input);
        evidence.add("diagnosis", EvidenceKind::Input, diag_data.clone());
        results.push(PhaseResult::ok(Phase::Diagnosis, diag_data, 1.0, started));

        // Analysis: ask the provider for a strategy.
        fsm = fsm.transition(Phase::Analysis)?;
        let started = Instant::now();
        let strategy = phase_chat(
            &provider,
            &model,
            Phase::Analysis,
            "Determine the best processing strategy for this input. \
             Reply with a single strategy name.",
            user_input,
        )
        .await?
        .content;
        let analysis_data = serde_json::json!({"strategy": strategy});
        evidence.add("analysis", EvidenceKind::Decision, analysis_data.clone());
        results.push(PhaseResult::ok(Phase::Analysis, analysis_data, 0.9, started));

        // Planning: ask the provider for a plan.
        fsm = fsm.transition(Phase::Planning)?;
        let started = Instant::now();
        let plan_text = phase_chat(
            &provider,
            &model,
            Phase::Planning,
            &format!("Create an execution plan using the '{strategy}' strategy."),
            user_input,
        )
        .await?
        .content;
        let plan_data = serde_json::json!({
            "plan": {"strategy": strategy, "llm_plan": plan_text},
        });
        evidence.add("planning", EvidenceKind::Decision, plan_data.clone());
        results.push(PhaseResult::ok(Phase::Planning, plan_data, 0.85, started));

        // Execution: ask the provider to execute.
        fsm = fsm.transition(Phase::Execution)?;
        let started = Instant::now();
        let exec_output = phase_chat(
            &provider,
            &model,
            Phase::Execution,
            &format!("Execute this plan and produce the result.\n\nPlan:\n{plan_text}"),
            user_input,
        )
        .await?
        .content;
        let exec_data = serde_json::json!({"output": exec_output});
        evidence.add("execution", EvidenceKind::Output, exec_data.clone());
        results.push(PhaseResult::ok(Phase::Execution, exec_data, 0.8, started));

        // Validation (deterministic).
        fsm = fsm.transition(Phase::Validation)?;
        let started = Instant::now();
        let passed = !exec_output.is_empty();
        let val_data = serde_json::json!({"passed": passed, "output": exec_output});
        evidence.add("validation", EvidenceKind::Decision, val_data.clone());
        results.push(PhaseResult::ok(
            Phase::Validation,
            val_data,
            if passed { 0.9 } else { 0.4 },
            started,
        ));

        // Synthesis: ask the provider for the final answer.
        fsm = fsm.transition(Phase::Synthesis)?;
        let started = Instant::now();
        let final_answer = phase_chat(
            &provider,
            &model,
            Phase::Synthesis,
            "Synthesize the execution output into a final answer.",
            &format!("Original request: {user_input}\n\nExecution output:\n{exec_output}"),
        )
        .await?
        .content;
        let synth_data = serde_json::json!({"final": final_answer});
        evidence.add("synthesis", EvidenceKind::Output, synth_data.clone());
        results.push(PhaseResult::ok(Phase::Synthesis, synth_data, 0.95, started));

        // Complete (deterministic).
        fsm = fsm.transition(Phase::Complete)?;
        let started = Instant::now();
        let complete_data =
            serde_json::json!({"status": "complete", "phases_run": results.len().saturating_add(1)});
        evidence.add("complete", EvidenceKind::Output, complete_data.clone());
        results.push(PhaseResult::ok(Phase::Complete, complete_data, 1.0, started));

        let _ = fsm;
        Ok(results)
    }
}

fn diagnosis_data(user_input: &str) -> serde_json::Value {
    serde_json::json!({
        "user_input": user_input,
        "input_length": user_input.chars().count(),
        "word_count": user_input.split_whitespace().count(),
    })
}

/// Choose a deterministic strategy label from input shape.
fn determine_strategy(user_input: &str) -> &'static str {
    if user_input.split_whitespace().count() <= 3 {
        return "direct";
    }
    if user_input.contains('?') {
        return "question_answering";
    }
    "general"
}

async fn phase_chat(
    provider: &Arc<dyn LlmProvider>,
    model: &str,
    phase: Phase,
    system: &str,
    user: &str,
) -> Result<ChatResponse, PipelineError> {
    provider
        .chat(ChatRequest::new(
            model,
            vec![ChatMessage::system(system), ChatMessage::user(user)],
        ))
        .await
        .map_err(|source| PipelineError::Provider { phase, source })
}
