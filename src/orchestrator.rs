//! Orchestrator -- drives a request through guard, memory, context, and the
//! seven-phase pipeline, leaving a finished evidence pack behind.
//!
//! Guard blocks are normal outcomes, not errors: they short-circuit with a
//! single `guard/decision` evidence entry and a `blocked` result. Provider
//! failures surface to the caller with the partial evidence preserved.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::artifact::ArtifactStore;
use crate::context::builder::ContextBuilder;
use crate::context::compiler::{
    ArtifactAttacher, Compactor, ContextCompiler, HistorySelector, MemoryPreloader, Processor,
};
use crate::context::session::{EventKind, Session};
use crate::context::working::WorkingContext;
use crate::evidence::{EvidenceKind, EvidencePack};
use crate::fsm::{FsmState, Phase};
use crate::guard::GuardPipeline;
use crate::ids::short_id;
use crate::memory::MemoryService;
use crate::pipeline::{HiveMindPipeline, PhaseResult, PipelineError};
use crate::providers::{LlmProvider, StubProvider};

/// Default system prompt for compiled runs.
const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant.";

/// Result of an orchestrated run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    /// Final answer, or `Blocked: <reason>` when the guard refused.
    pub result: String,
    /// Session identifier.
    pub session_id: String,
    /// Whether the guard blocked the input.
    pub blocked: bool,
}

/// Result of a compiled-context run, with budget accounting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompiledOutcome {
    /// Final answer, or `Blocked: <reason>`.
    pub result: String,
    /// Session identifier.
    pub session_id: String,
    /// Whether the guard blocked the input.
    pub blocked: bool,
    /// Tokens in the compiled working context.
    pub budget_used: usize,
    /// Whether the context fit the budget.
    pub within_budget: bool,
}

/// Drives the HiveMind pipeline with guard and memory collaborators.
pub struct Orchestrator {
    guard: Arc<GuardPipeline>,
    memory: Option<Arc<dyn MemoryService>>,
    provider: Arc<dyn LlmProvider>,
    pipeline: HiveMindPipeline,
    /// FSM position after the most recent run.
    pub state: FsmState,
    /// Evidence pack of the most recent run.
    pub evidence: EvidencePack,
    session_id: String,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Orchestrator {
    /// Orchestrator with a default guard, no memory, and the stub provider.
    pub fn new() -> Self {
        let session_id = short_id();
        Self {
            guard: Arc::new(GuardPipeline::new()),
            memory: None,
            provider: Arc::new(StubProvider::new()),
            pipeline: HiveMindPipeline::new(),
            state: FsmState::new(),
            evidence: EvidencePack::new(session_id.clone()),
            session_id,
        }
    }

    /// Replace the guard pipeline.
    pub fn with_guard(mut self, guard: Arc<GuardPipeline>) -> Self {
        self.guard = guard;
        self
    }

    /// Attach a memory service.
    pub fn with_memory(mut self, memory: Arc<dyn MemoryService>) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Replace the provider used by async runs.
    pub fn with_provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = provider;
        self
    }

    /// Session id for the current pack.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Execute a full deterministic pipeline pass.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] only on an internal FSM violation.
    pub fn run(&mut self, user_input: &str) -> Result<RunOutcome, PipelineError> {
        let ctx = ContextBuilder::new().build(
            user_input,
            Some(&self.session_id),
            self.memory.as_ref(),
            &self.guard,
        );
        let mut evidence = ctx.evidence;

        if !ctx.guard_result.allowed {
            return Ok(self.finish_blocked(evidence, &ctx.guard_result));
        }

        let results = self.pipeline.run(user_input, &mut evidence)?;
        self.walk_fsm()?;
        let final_answer = extract_synthesis(&results, user_input);
        self.evidence = evidence;

        Ok(RunOutcome {
            result: final_answer,
            session_id: self.session_id.clone(),
            blocked: false,
        })
    }

    /// Execute a full pipeline pass with the configured provider driving
    /// the cognitive phases.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Provider`] when a provider call fails; the
    /// evidence recorded before the failure is kept in `self.evidence`.
    pub async fn run_async(&mut self, user_input: &str) -> Result<RunOutcome, PipelineError> {
        let ctx = ContextBuilder::new().build(
            user_input,
            Some(&self.session_id),
            self.memory.as_ref(),
            &self.guard,
        );
        let mut evidence = ctx.evidence;

        if !ctx.guard_result.allowed {
            return Ok(self.finish_blocked(evidence, &ctx.guard_result));
        }

        let run = self
            .pipeline
            .run_with_provider(user_input, &mut evidence, Arc::clone(&self.provider))
            .await;
        // Keep whatever evidence accumulated, success or not.
        let results = match run {
            Ok(results) => results,
            Err(error) => {
                self.evidence = evidence;
                return Err(error);
            }
        };
        self.walk_fsm()?;
        let final_answer = extract_synthesis(&results, user_input);
        self.evidence = evidence;

        Ok(RunOutcome {
            result: final_answer,
            session_id: self.session_id.clone(),
            blocked: false,
        })
    }

    /// Execute a deterministic pipeline pass over a compiled working
    /// context, reporting budget use.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] only on an internal FSM violation.
    pub fn run_compiled(
        &mut self,
        user_input: &str,
        budget: usize,
        system_prompt: Option<&str>,
        artifact_store: Option<Arc<dyn ArtifactStore>>,
    ) -> Result<CompiledOutcome, PipelineError> {
        let mut session = Session::with_id(self.session_id.clone());
        let token_est = crate::context::budget::estimate_tokens(user_input);
        session.record(
            EventKind::UserInput,
            serde_json::json!({"text": user_input}),
            token_est,
        );

        let guard_result = self.guard.evaluate(user_input);
        session.record(
            EventKind::GuardDecision,
            serde_json::json!({
                "allowed": guard_result.allowed,
                "threat_level": guard_result.threat_level.as_str(),
            }),
            5,
        );
        if !guard_result.allowed {
            self.evidence = session.into_evidence_pack();
            return Ok(CompiledOutcome {
                result: format!("Blocked: {}", guard_result.reason),
                session_id: self.session_id.clone(),
                blocked: true,
                budget_used: 0,
                within_budget: true,
            });
        }

        let working = self.compile_context(&mut session, budget, system_prompt, artifact_store);

        let mut evidence = session.into_evidence_pack();
        let results = self.pipeline.run(user_input, &mut evidence)?;
        self.walk_fsm()?;
        let final_answer = extract_synthesis(&results, user_input);
        self.evidence = evidence;

        Ok(CompiledOutcome {
            result: final_answer,
            session_id: self.session_id.clone(),
            blocked: false,
            budget_used: working.token_count,
            within_budget: working.is_within_budget(),
        })
    }

    /// Build the processor chain and compile the session.
    fn compile_context(
        &self,
        session: &mut Session,
        budget: usize,
        system_prompt: Option<&str>,
        artifact_store: Option<Arc<dyn ArtifactStore>>,
    ) -> WorkingContext {
        let mut processors: Vec<Box<dyn Processor>> =
            vec![Box::new(HistorySelector::default()), Box::new(Compactor)];
        if let Some(ref memory) = self.memory {
            processors.push(Box::new(MemoryPreloader::new(Arc::clone(memory), 5)));
        }
        if let Some(store) = artifact_store {
            processors.push(Box::new(ArtifactAttacher::new(store, 1024)));
        }
        let compiler = ContextCompiler::with_processors(processors);
        compiler.compile(
            session,
            budget,
            system_prompt.unwrap_or(DEFAULT_SYSTEM_PROMPT),
        )
    }

    fn finish_blocked(
        &mut self,
        mut evidence: EvidencePack,
        guard_result: &crate::guard::GuardResult,
    ) -> RunOutcome {
        evidence.add(
            "guard",
            EvidenceKind::Decision,
            serde_json::json!({
                "blocked": true,
                "threat_level": guard_result.threat_level.as_str(),
                "reason": guard_result.reason,
            }),
        );
        self.evidence = evidence;
        RunOutcome {
            result: format!("Blocked: {}", guard_result.reason),
            session_id: self.session_id.clone(),
            blocked: true,
        }
    }

    /// Walk the FSM through the full seven-phase cycle back to idle.
    fn walk_fsm(&mut self) -> Result<(), PipelineError> {
        let mut state = FsmState::new();
        for phase in [
            Phase::Diagnosis,
            Phase::Analysis,
            Phase::Planning,
            Phase::Execution,
            Phase::Validation,
            Phase::Synthesis,
            Phase::Complete,
        ] {
            state = state.transition(phase)?;
        }
        self.state = state;
        Ok(())
    }
}

/// Pull the synthesis phase's final answer, with a fallback echo.
fn extract_synthesis(results: &[PhaseResult], user_input: &str) -> String {
    results
        .iter()
        .find(|r| r.phase == Phase::Synthesis)
        .and_then(|r| r.data.get("final").and_then(|v| v.as_str()))
        .map_or_else(|| format!("Processed: {user_input}"), str::to_owned)
}
