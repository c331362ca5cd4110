//! Hybrid swarm engine -- multi-agent execution modes.
//!
//! [`TaskAnalyzer`] derives complexity and domain tags from the input text
//! and suggests an execution mode; [`SwarmEngine`] dispatches to canned
//! executors synchronously or to provider-backed mode implementations
//! asynchronously. The adversarial red-blue mode lives in [`red_blue`].

pub mod red_blue;

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};

pub use red_blue::RedBlueExecutor;

use crate::providers::{ChatMessage, ChatRequest, LlmProvider, ProviderError};

// ── Types ───────────────────────────────────────────────────────

/// Multi-agent execution patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwarmMode {
    /// Fan-out across domains, join outputs.
    Parallel,
    /// Chained understand → plan → execute steps.
    Sequential,
    /// Adversarial attacker/defender evaluation.
    RedBlue,
    /// Two agents alternating.
    PingPong,
    /// One lead agent with supporters.
    LeadSupport,
    /// Single expert prompt across detected domains.
    Specialist,
}

impl SwarmMode {
    /// Stable snake_case label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Parallel => "parallel",
            Self::Sequential => "sequential",
            Self::RedBlue => "red_blue",
            Self::PingPong => "ping_pong",
            Self::LeadSupport => "lead_support",
            Self::Specialist => "specialist",
        }
    }
}

/// Task difficulty classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskComplexity {
    /// A few words.
    Trivial,
    /// Short single-domain request.
    Simple,
    /// Default middle ground.
    Moderate,
    /// Multi-domain or long request.
    Complex,
    /// Many domains or very long request.
    Expert,
}

impl TaskComplexity {
    /// Stable lowercase label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trivial => "trivial",
            Self::Simple => "simple",
            Self::Moderate => "moderate",
            Self::Complex => "complex",
            Self::Expert => "expert",
        }
    }
}

/// Result of analyzing a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskAnalysis {
    /// Assessed complexity.
    pub complexity: TaskComplexity,
    /// Detected domain labels, `general` when nothing matches.
    pub domains: Vec<String>,
    /// Execution mode suggested for this task.
    pub suggested_mode: SwarmMode,
}

/// Output from a swarm execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmResult {
    /// Mode that ran.
    pub mode: SwarmMode,
    /// Combined output text.
    pub output: String,
    /// Mode-specific details.
    pub metadata: serde_json::Value,
}

// ── Task analysis ───────────────────────────────────────────────

/// Domain keyword table.
const DOMAIN_KEYWORDS: &[(&str, &[&str])] = &[
    ("code", &["code", "function", "class", "debug", "refactor", "implement", "program"]),
    ("math", &["calculate", "equation", "formula", "prove", "theorem", "math"]),
    ("writing", &["write", "essay", "article", "draft", "summarize", "story"]),
    ("research", &["research", "analyze", "compare", "investigate", "study", "review"]),
    ("data", &["data", "dataset", "csv", "json", "database", "query", "sql"]),
    ("design", &["design", "architecture", "ui", "ux", "layout", "wireframe"]),
];

/// Analyzes input to suggest complexity and swarm mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct TaskAnalyzer;

impl TaskAnalyzer {
    /// Determine task complexity, domains, and suggested mode.
    pub fn analyze(&self, user_input: &str) -> TaskAnalysis {
        let lower = user_input.to_lowercase();
        let word_count = lower.split_whitespace().count();

        let mut domains: Vec<String> = DOMAIN_KEYWORDS
            .iter()
            .filter(|(_, keywords)| keywords.iter().any(|kw| lower.contains(kw)))
            .map(|(domain, _)| (*domain).to_owned())
            .collect();
        if domains.is_empty() {
            domains.push("general".to_owned());
        }

        let complexity = Self::assess_complexity(word_count, domains.len());
        let suggested_mode = Self::suggest_mode(complexity, domains.len());

        TaskAnalysis {
            complexity,
            domains,
            suggested_mode,
        }
    }

    fn assess_complexity(word_count: usize, domain_count: usize) -> TaskComplexity {
        if word_count <= 3 {
            return TaskComplexity::Trivial;
        }
        if word_count <= 10 && domain_count <= 1 {
            return TaskComplexity::Simple;
        }
        if domain_count >= 3 || word_count > 50 {
            return TaskComplexity::Expert;
        }
        if domain_count >= 2 || word_count > 25 {
            return TaskComplexity::Complex;
        }
        TaskComplexity::Moderate
    }

    fn suggest_mode(complexity: TaskComplexity, domain_count: usize) -> SwarmMode {
        match complexity {
            TaskComplexity::Trivial | TaskComplexity::Simple => SwarmMode::Sequential,
            TaskComplexity::Moderate => SwarmMode::LeadSupport,
            TaskComplexity::Expert => SwarmMode::Specialist,
            TaskComplexity::Complex => {
                if domain_count >= 2 {
                    SwarmMode::Parallel
                } else {
                    SwarmMode::RedBlue
                }
            }
        }
    }
}

// ── Executors ───────────────────────────────────────────────────

/// Context handed to a synchronous executor.
#[derive(Debug, Clone)]
pub struct SwarmContext {
    /// Original task text.
    pub user_input: String,
    /// Analysis outcome.
    pub analysis: TaskAnalysis,
}

/// A synchronous mode executor.
pub trait SwarmExecutor: Send + Sync {
    /// Execute the task in a specific swarm mode.
    fn execute(&self, context: &SwarmContext) -> SwarmResult;
}

/// Canned parallel execution for testing and offline paths.
#[derive(Debug, Default, Clone, Copy)]
pub struct ParallelExecutor;

impl SwarmExecutor for ParallelExecutor {
    fn execute(&self, context: &SwarmContext) -> SwarmResult {
        SwarmResult {
            mode: SwarmMode::Parallel,
            output: format!("[parallel] Processed: {}", context.user_input),
            metadata: serde_json::json!({"agents": 3, "strategy": "fan-out-fan-in"}),
        }
    }
}

/// Canned sequential execution.
#[derive(Debug, Default, Clone, Copy)]
pub struct SequentialExecutor;

impl SwarmExecutor for SequentialExecutor {
    fn execute(&self, context: &SwarmContext) -> SwarmResult {
        SwarmResult {
            mode: SwarmMode::Sequential,
            output: format!("[sequential] Processed: {}", context.user_input),
            metadata: serde_json::json!({"agents": 1, "strategy": "chain"}),
        }
    }
}

/// Canned specialist execution.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpecialistExecutor;

impl SwarmExecutor for SpecialistExecutor {
    fn execute(&self, context: &SwarmContext) -> SwarmResult {
        SwarmResult {
            mode: SwarmMode::Specialist,
            output: format!("[specialist] Processed: {}", context.user_input),
            metadata: serde_json::json!({
                "agents": context.analysis.domains.len(),
                "domains": context.analysis.domains,
                "strategy": "expert-routing",
            }),
        }
    }
}

// ── Engine ──────────────────────────────────────────────────────

/// Routes tasks to the right executor based on analysis.
pub struct SwarmEngine {
    executors: HashMap<SwarmMode, Box<dyn SwarmExecutor>>,
    analyzer: TaskAnalyzer,
    fallback: SequentialExecutor,
}

impl Default for SwarmEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SwarmEngine {
    /// Engine with the default executor set (parallel, sequential,
    /// specialist, red-blue light mode over a fresh guard pipeline).
    pub fn new() -> Self {
        let mut executors: HashMap<SwarmMode, Box<dyn SwarmExecutor>> = HashMap::new();
        executors.insert(SwarmMode::Parallel, Box::new(ParallelExecutor));
        executors.insert(SwarmMode::Sequential, Box::new(SequentialExecutor));
        executors.insert(SwarmMode::Specialist, Box::new(SpecialistExecutor));
        executors.insert(SwarmMode::RedBlue, Box::new(RedBlueExecutor::default()));
        Self {
            executors,
            analyzer: TaskAnalyzer,
            fallback: SequentialExecutor,
        }
    }

    /// Engine over an explicit executor map; unmapped modes fall back to
    /// sequential.
    pub fn with_executors(executors: HashMap<SwarmMode, Box<dyn SwarmExecutor>>) -> Self {
        Self {
            executors,
            analyzer: TaskAnalyzer,
            fallback: SequentialExecutor,
        }
    }

    /// Analyze a task without executing it.
    pub fn analyze(&self, user_input: &str) -> TaskAnalysis {
        self.analyzer.analyze(user_input)
    }

    /// Analyze then execute synchronously.
    pub fn run(&self, user_input: &str) -> SwarmResult {
        let analysis = self.analyzer.analyze(user_input);
        let context = SwarmContext {
            user_input: user_input.to_owned(),
            analysis: analysis.clone(),
        };
        match self.executors.get(&analysis.suggested_mode) {
            Some(executor) => executor.execute(&context),
            None => self.fallback.execute(&context),
        }
    }

    /// Execute a task against a real provider, using mode-specific dispatch:
    /// parallel fans out per domain, sequential chains three steps,
    /// specialist makes one expert call, everything else falls back to a
    /// single call.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] when any underlying provider call fails.
    pub async fn execute_with_provider(
        &self,
        task: &str,
        provider: Arc<dyn LlmProvider>,
    ) -> Result<SwarmResult, ProviderError> {
        let analysis = self.analyzer.analyze(task);
        match analysis.suggested_mode {
            SwarmMode::Parallel => run_parallel(task, &analysis, provider).await,
            SwarmMode::Sequential => run_sequential(task, provider).await,
            SwarmMode::Specialist => run_specialist(task, &analysis, provider).await,
            other => run_single(task, other, provider).await,
        }
    }
}

// ── Provider-backed mode implementations ────────────────────────

async fn run_parallel(
    task: &str,
    analysis: &TaskAnalysis,
    provider: Arc<dyn LlmProvider>,
) -> Result<SwarmResult, ProviderError> {
    let model = provider.model().to_owned();
    let prompts: Vec<String> = analysis
        .domains
        .iter()
        .map(|domain| format!("As a {domain} specialist, address the following task:\n{task}"))
        .collect();

    let calls = prompts.iter().map(|prompt| {
        let provider = Arc::clone(&provider);
        let model = model.clone();
        let prompt = prompt.clone();
        async move {
            provider
                .chat(ChatRequest::new(
                    model,
                    vec![
                        ChatMessage::system("You are a specialist agent."),
                        ChatMessage::user(prompt),
                    ],
                ))
                .await
        }
    });

    let responses = join_all(calls).await;
    let mut outputs = Vec::with_capacity(responses.len());
    for response in responses {
        outputs.push(response?.content);
    }

    Ok(SwarmResult {
        mode: SwarmMode::Parallel,
        output: outputs.join("\n---\n"),
        metadata: serde_json::json!({
            "agents": prompts.len(),
            "domains": analysis.domains,
            "strategy": "fan-out-fan-in",
        }),
    })
}

async fn run_sequential(
    task: &str,
    provider: Arc<dyn LlmProvider>,
) -> Result<SwarmResult, ProviderError> {
    let model = provider.model().to_owned();
    let steps = ["understand", "plan", "execute"];
    let mut current = task.to_owned();
    for step in steps {
        let response = provider
            .chat(ChatRequest::new(
                model.clone(),
                vec![
                    ChatMessage::system(format!(
                        "You are performing step '{step}' in a sequential pipeline."
                    )),
                    ChatMessage::user(current.clone()),
                ],
            ))
            .await?;
        current = response.content;
    }
    Ok(SwarmResult {
        mode: SwarmMode::Sequential,
        output: current,
        metadata: serde_json::json!({
            "agents": 1,
            "steps": steps,
            "strategy": "chain",
        }),
    })
}

async fn run_specialist(
    task: &str,
    analysis: &TaskAnalysis,
    provider: Arc<dyn LlmProvider>,
) -> Result<SwarmResult, ProviderError> {
    let model = provider.model().to_owned();
    let domain_list = analysis.domains.join(", ");
    let response = provider
        .chat(ChatRequest::new(
            model,
            vec![
                ChatMessage::system(format!(
                    "You are an expert specialist in: {domain_list}. \
                     Provide a thorough, expert-level response."
                )),
                ChatMessage::user(task),
            ],
        ))
        .await?;
    Ok(SwarmResult {
        mode: SwarmMode::Specialist,
        output: response.content,
        metadata: serde_json::json!({
            "agents": analysis.domains.len(),
            "domains": analysis.domains,
            "strategy": "expert-routing",
        }),
    })
}

async fn run_single(
    task: &str,
    mode: SwarmMode,
    provider: Arc<dyn LlmProvider>,
) -> Result<SwarmResult, ProviderError> {
    let model = provider.model().to_owned();
    let response = provider
        .chat(ChatRequest::new(
            model,
            vec![
                ChatMessage::system(format!("You are operating in '{}' mode.", mode.as_str())),
                ChatMessage::user(task),
            ],
        ))
        .await?;
    Ok(SwarmResult {
        mode,
        output: response.content,
        metadata: serde_json::json!({"agents": 1, "strategy": mode.as_str()}),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::StubProvider;

    #[test]
    fn test_trivial_complexity() {
        let analysis = TaskAnalyzer.analyze("hello there");
        assert_eq!(analysis.complexity, TaskComplexity::Trivial);
        assert_eq!(analysis.suggested_mode, SwarmMode::Sequential);
        assert_eq!(analysis.domains, vec!["general"]);
    }

    #[test]
    fn test_simple_complexity() {
        let analysis = TaskAnalyzer.analyze("please write a short haiku");
        assert_eq!(analysis.complexity, TaskComplexity::Simple);
        assert_eq!(analysis.domains, vec!["writing"]);
        assert_eq!(analysis.suggested_mode, SwarmMode::Sequential);
    }

    #[test]
    fn test_moderate_complexity() {
        // 12 words, one domain -> moderate -> lead_support.
        let analysis =
            TaskAnalyzer.analyze("please write a detailed story about a robot who learns to paint");
        assert_eq!(analysis.complexity, TaskComplexity::Moderate);
        assert_eq!(analysis.suggested_mode, SwarmMode::LeadSupport);
    }

    #[test]
    fn test_complex_multi_domain_goes_parallel() {
        // Two domains, > 10 words.
        let analysis = TaskAnalyzer
            .analyze("write an essay and implement a function that demonstrates the argument");
        assert_eq!(analysis.complexity, TaskComplexity::Complex);
        assert!(analysis.domains.len() >= 2);
        assert_eq!(analysis.suggested_mode, SwarmMode::Parallel);
    }

    #[test]
    fn test_complex_single_domain_goes_red_blue() {
        // One domain, > 25 words.
        let input = "please debug the authentication flow carefully because intermittent \
                     failures keep appearing for some of our users during peak load and we \
                     cannot reproduce them locally at all";
        let analysis = TaskAnalyzer.analyze(input);
        assert_eq!(analysis.complexity, TaskComplexity::Complex);
        assert_eq!(analysis.domains.len(), 1);
        assert_eq!(analysis.suggested_mode, SwarmMode::RedBlue);
    }

    #[test]
    fn test_expert_three_domains() {
        let analysis = TaskAnalyzer
            .analyze("research the data and write code to analyze the csv query results");
        assert_eq!(analysis.complexity, TaskComplexity::Expert);
        assert_eq!(analysis.suggested_mode, SwarmMode::Specialist);
    }

    #[test]
    fn test_expert_long_input() {
        let input = "word ".repeat(60);
        let analysis = TaskAnalyzer.analyze(&input);
        assert_eq!(analysis.complexity, TaskComplexity::Expert);
    }

    #[test]
    fn test_sync_run_dispatches_by_mode() {
        let engine = SwarmEngine::new();
        let result = engine.run("hi");
        assert_eq!(result.mode, SwarmMode::Sequential);
        assert!(result.output.contains("Processed: hi"));
    }

    #[test]
    fn test_sync_run_falls_back_for_unmapped_mode() {
        // lead_support has no executor in the default map.
        let engine = SwarmEngine::new();
        let input = "please write a detailed story about a robot who learns to paint";
        assert_eq!(engine.analyze(input).suggested_mode, SwarmMode::LeadSupport);
        let result = engine.run(input);
        assert_eq!(result.mode, SwarmMode::Sequential);
    }

    #[tokio::test]
    async fn test_parallel_mode_joins_outputs() {
        let engine = SwarmEngine::new();
        let provider = Arc::new(StubProvider::new());
        let input = "write an essay and implement a function that demonstrates the argument";
        let result = engine
            .execute_with_provider(input, provider)
            .await
            .expect("swarm");
        assert_eq!(result.mode, SwarmMode::Parallel);
        assert!(result.output.contains("\n---\n"));
        assert_eq!(result.metadata["strategy"], "fan-out-fan-in");
    }

    #[tokio::test]
    async fn test_sequential_mode_chains() {
        let engine = SwarmEngine::new();
        let provider = Arc::new(StubProvider::new());
        let result = engine
            .execute_with_provider("hi", provider)
            .await
            .expect("swarm");
        assert_eq!(result.mode, SwarmMode::Sequential);
        assert_eq!(result.metadata["steps"][2], "execute");
        assert!(result.output.contains("stub response"));
    }

    #[tokio::test]
    async fn test_specialist_mode() {
        let engine = SwarmEngine::new();
        let provider = Arc::new(StubProvider::new());
        let input = "research the data and write code to analyze the csv query results";
        let result = engine
            .execute_with_provider(input, provider)
            .await
            .expect("swarm");
        assert_eq!(result.mode, SwarmMode::Specialist);
        assert_eq!(result.metadata["strategy"], "expert-routing");
    }

    #[tokio::test]
    async fn test_unmapped_mode_single_call() {
        let engine = SwarmEngine::new();
        let provider = Arc::new(StubProvider::new());
        let input = "please write a detailed story about a robot who learns to paint";
        let result = engine
            .execute_with_provider(input, provider)
            .await
            .expect("swarm");
        assert_eq!(result.mode, SwarmMode::LeadSupport);
        assert_eq!(result.metadata["agents"], 1);
    }
}
