#![allow(missing_docs)] // TODO: drop once the public surface is fully documented

//! Straylight -- cognitive control plane for an agentic LLM runtime.
//!
//! A user request enters the [`orchestrator::Orchestrator`], passes the
//! [`guard`] pipeline, is enriched with [`memory`] recall and a compiled
//! [`context`], and is driven through the seven-phase HiveMind
//! [`pipeline`]. Tool invocations go out through the [`mcp`] client, swarm
//! execution modes live in [`swarm`], iterative refinement in [`harness`],
//! and every step lands in a hash-chained, Merkle-committed
//! [`evidence::EvidencePack`].

pub mod artifact;
pub mod config;
pub mod context;
pub mod evidence;
pub mod fsm;
pub mod guard;
pub mod harness;
pub mod ids;
pub mod logging;
pub mod mcp;
pub mod memory;
pub mod orchestrator;
pub mod pipeline;
pub mod providers;
pub mod swarm;
pub mod teaming;
pub mod uacp;

pub use artifact::{ArtifactHandle, ArtifactStore, FsArtifactStore, SqliteArtifactStore};
pub use context::builder::{ContextBuilder, ExecutionContext};
pub use context::session::{EventLog, Session, SessionEvent};
pub use context::working::WorkingContext;
pub use evidence::{EvidenceEntry, EvidenceKind, EvidencePack, EvidenceSigner};
pub use fsm::{FsmError, FsmState, Phase};
pub use guard::{
    ClassifierGuard, GuardBackend, GuardPipeline, GuardResult, RegexGuard, StubClassifierGuard,
    ThreatLevel, ToolInvocationGuard,
};
pub use harness::{
    Candidate, ConsensusSelector, DefaultPolicy, Feedback, HarnessConfig, HarnessResult,
    RefinementHarness, TextVerifier,
};
pub use mcp::client::{McpClient, McpError};
pub use memory::{
    InMemoryBackend, MemoryCategory, MemoryEntry, MemoryService, MemoryTier, TieredMemoryService,
};
pub use orchestrator::{CompiledOutcome, Orchestrator, RunOutcome};
pub use pipeline::{HiveMindPipeline, PhaseResult, PhaseStatus};
pub use providers::{
    ChatMessage, ChatRequest, ChatResponse, ChatRole, LlmProvider, ProviderError, StubProvider,
};
pub use swarm::{SwarmEngine, SwarmMode, SwarmResult, TaskAnalyzer, TaskComplexity};
pub use teaming::{AgentProfile, FlowController, FlowPolicy, TeamBuilder, TeamFormation};
pub use uacp::{UacpCodec, UacpError, UacpMessage, UacpVerb};
