//! Context compiler -- named, composable processors over a session.
//!
//! Each processor maps one [`WorkingContext`] to another; the compiler runs
//! them in order. Order matters: history selection before compaction,
//! compaction before memory preload, artifact externalization last.

use std::sync::Arc;

use crate::artifact::ArtifactStore;
use crate::memory::MemoryService;

use super::budget::estimate_tokens;
use super::session::{EventKind, Session};
use super::working::{ArtifactRef, ContextMessage, MemoryHit, WorkingContext};

/// A named, composable context processor.
pub trait Processor: Send + Sync {
    /// Processor name for logs and diagnostics.
    fn name(&self) -> &str;

    /// Transform the working context, possibly recording session events.
    fn process(&self, session: &mut Session, ctx: WorkingContext, budget: usize)
        -> WorkingContext;
}

/// Sum of estimated tokens across history messages plus the system prompt.
fn history_tokens(system_prompt: &str, history: &[ContextMessage]) -> usize {
    history
        .iter()
        .fold(estimate_tokens(system_prompt), |acc, m| {
            acc.saturating_add(estimate_tokens(&m.content))
        })
}

// ── HistorySelector ─────────────────────────────────────────────

/// Select conversation events, keeping the first N and last M when the log
/// is longer than N+M.
pub struct HistorySelector {
    keep_first: usize,
    keep_last: usize,
}

impl Default for HistorySelector {
    fn default() -> Self {
        Self::new(2, 5)
    }
}

impl HistorySelector {
    /// Keep the first `keep_first` and last `keep_last` conversation turns.
    pub fn new(keep_first: usize, keep_last: usize) -> Self {
        Self {
            keep_first,
            keep_last,
        }
    }
}

impl Processor for HistorySelector {
    fn name(&self) -> &str {
        "history_selector"
    }

    fn process(
        &self,
        session: &mut Session,
        ctx: WorkingContext,
        budget: usize,
    ) -> WorkingContext {
        let history: Vec<ContextMessage> = session
            .event_log
            .filter(&[EventKind::UserInput, EventKind::PhaseResult])
            .iter()
            .map(|event| {
                let role = event
                    .data
                    .get("role")
                    .and_then(|v| v.as_str())
                    .unwrap_or("user")
                    .to_owned();
                let content = event
                    .data
                    .get("content")
                    .or_else(|| event.data.get("text"))
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_owned();
                ContextMessage { role, content }
            })
            .collect();

        if history.is_empty() {
            return ctx;
        }

        let total = history.len();
        let keep = self.keep_first.saturating_add(self.keep_last);
        let selected: Vec<ContextMessage> = if total <= keep {
            history
        } else {
            let mut selected: Vec<ContextMessage> =
                history.iter().take(self.keep_first).cloned().collect();
            selected.extend(
                history
                    .iter()
                    .skip(total.saturating_sub(self.keep_last))
                    .cloned(),
            );
            selected
        };

        let token_count = history_tokens(&ctx.system_prompt, &selected);
        WorkingContext {
            history: selected,
            token_count,
            budget,
            ..ctx
        }
    }
}

// ── Compactor ───────────────────────────────────────────────────

/// Merge consecutive same-role messages and trim whitespace.
#[derive(Debug, Default, Clone, Copy)]
pub struct Compactor;

impl Processor for Compactor {
    fn name(&self) -> &str {
        "compactor"
    }

    fn process(
        &self,
        _session: &mut Session,
        ctx: WorkingContext,
        budget: usize,
    ) -> WorkingContext {
        if ctx.history.is_empty() {
            return ctx;
        }

        let mut merged: Vec<ContextMessage> = Vec::new();
        for msg in &ctx.history {
            let content = msg.content.trim().to_owned();
            match merged.last_mut() {
                Some(last) if last.role == msg.role => {
                    last.content.push('\n');
                    last.content.push_str(&content);
                }
                _ => merged.push(ContextMessage {
                    role: msg.role.clone(),
                    content,
                }),
            }
        }

        let token_count = history_tokens(&ctx.system_prompt, &merged);
        WorkingContext {
            history: merged,
            token_count,
            budget,
            ..ctx
        }
    }
}

// ── MemoryPreloader ─────────────────────────────────────────────

/// Pull top-K memories keyed on the latest user input.
pub struct MemoryPreloader {
    memory: Arc<dyn MemoryService>,
    top_k: usize,
}

impl MemoryPreloader {
    /// Preload up to `top_k` memories from `memory`.
    pub fn new(memory: Arc<dyn MemoryService>, top_k: usize) -> Self {
        Self { memory, top_k }
    }
}

impl Processor for MemoryPreloader {
    fn name(&self) -> &str {
        "memory_preloader"
    }

    fn process(
        &self,
        session: &mut Session,
        ctx: WorkingContext,
        budget: usize,
    ) -> WorkingContext {
        let query = session
            .event_log
            .filter(&[EventKind::UserInput])
            .last()
            .and_then(|event| {
                event
                    .data
                    .get("text")
                    .or_else(|| event.data.get("content"))
                    .and_then(|v| v.as_str())
                    .map(str::to_owned)
            });
        let Some(query) = query.filter(|q| !q.is_empty()) else {
            return ctx;
        };

        let hits: Vec<MemoryHit> = self
            .memory
            .recall(&query, self.top_k, None)
            .into_iter()
            .map(|entry| MemoryHit {
                key: entry.key,
                content: entry.content,
                category: entry.category.as_str().to_owned(),
            })
            .collect();

        let extra_tokens = hits.iter().fold(0usize, |acc, h| {
            acc.saturating_add(estimate_tokens(&h.content))
        });
        let token_count = ctx.token_count.saturating_add(extra_tokens);
        WorkingContext {
            memory_hits: hits,
            token_count,
            budget,
            ..ctx
        }
    }
}

// ── ArtifactAttacher ────────────────────────────────────────────

/// Externalize large tool results into the artifact store, replacing them
/// with compact handle references.
pub struct ArtifactAttacher {
    store: Arc<dyn ArtifactStore>,
    threshold_bytes: usize,
}

impl ArtifactAttacher {
    /// Externalize tool results whose encoded length is at least
    /// `threshold_bytes`.
    pub fn new(store: Arc<dyn ArtifactStore>, threshold_bytes: usize) -> Self {
        Self {
            store,
            threshold_bytes,
        }
    }
}

impl Processor for ArtifactAttacher {
    fn name(&self) -> &str {
        "artifact_attacher"
    }

    fn process(
        &self,
        session: &mut Session,
        ctx: WorkingContext,
        budget: usize,
    ) -> WorkingContext {
        let mut remaining = Vec::new();
        let mut refs = ctx.artifact_refs.clone();
        let mut saved_tokens = 0usize;

        for tool_result in &ctx.tool_results {
            let bytes = tool_result.result.as_bytes();
            if bytes.len() < self.threshold_bytes {
                remaining.push(tool_result.clone());
                continue;
            }
            let stored = self.store.store(
                bytes,
                &format!("tool:{}", tool_result.tool),
                "text/plain",
            );
            match stored {
                Ok(handle) => {
                    saved_tokens =
                        saved_tokens.saturating_add(estimate_tokens(&tool_result.result));
                    session.record(
                        EventKind::ArtifactStored,
                        serde_json::json!({
                            "handle": handle.artifact_id,
                            "source": handle.source,
                            "size_bytes": handle.size_bytes,
                        }),
                        10,
                    );
                    refs.push(ArtifactRef {
                        handle: handle.artifact_id,
                        summary: handle.summary,
                        size_bytes: handle.size_bytes,
                        source: handle.source,
                    });
                }
                Err(error) => {
                    tracing::warn!(%error, tool = %tool_result.tool, "artifact store failed, keeping inline");
                    remaining.push(tool_result.clone());
                }
            }
        }

        let ref_tokens = refs.iter().fold(0usize, |acc, r| {
            acc.saturating_add(estimate_tokens(&r.summary))
        });
        let token_count = ctx
            .token_count
            .saturating_sub(saved_tokens)
            .saturating_add(ref_tokens);
        WorkingContext {
            artifact_refs: refs,
            tool_results: remaining,
            token_count,
            budget,
            ..ctx
        }
    }
}

// ── ContextCompiler ─────────────────────────────────────────────

/// Runs processors in order to produce a [`WorkingContext`] from a session.
#[derive(Default)]
pub struct ContextCompiler {
    processors: Vec<Box<dyn Processor>>,
}

impl ContextCompiler {
    /// Compiler with no processors.
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiler over an explicit processor chain.
    pub fn with_processors(processors: Vec<Box<dyn Processor>>) -> Self {
        Self { processors }
    }

    /// Append a processor to the chain.
    pub fn add_processor(&mut self, processor: Box<dyn Processor>) {
        self.processors.push(processor);
    }

    /// Run the chain against a session under a token budget.
    pub fn compile(
        &self,
        session: &mut Session,
        budget: usize,
        system_prompt: &str,
    ) -> WorkingContext {
        let mut ctx = WorkingContext::empty(system_prompt, budget);
        for processor in &self.processors {
            tracing::debug!(processor = processor.name(), "running context processor");
            ctx = processor.process(session, ctx, budget);
        }
        ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::SqliteArtifactStore;
    use crate::memory::{InMemoryBackend, MemoryCategory};

    fn conversation_session(turns: usize) -> Session {
        let mut session = Session::with_id("compile-test");
        for i in 0..turns {
            let (kind, role) = if i % 2 == 0 {
                (EventKind::UserInput, "user")
            } else {
                (EventKind::PhaseResult, "assistant")
            };
            session.record(
                kind,
                serde_json::json!({"role": role, "content": format!("turn {i}")}),
                3,
            );
        }
        session
    }

    #[test]
    fn test_history_selector_keeps_all_when_short() {
        let mut session = conversation_session(4);
        let compiler =
            ContextCompiler::with_processors(vec![Box::new(HistorySelector::new(2, 5))]);
        let ctx = compiler.compile(&mut session, 500, "sys");
        assert_eq!(ctx.history.len(), 4);
    }

    #[test]
    fn test_history_selector_keeps_first_and_last() {
        let mut session = conversation_session(20);
        let compiler =
            ContextCompiler::with_processors(vec![Box::new(HistorySelector::new(2, 3))]);
        let ctx = compiler.compile(&mut session, 500, "sys");
        assert_eq!(ctx.history.len(), 5);
        assert_eq!(ctx.history[0].content, "turn 0");
        assert_eq!(ctx.history[1].content, "turn 1");
        assert_eq!(ctx.history[4].content, "turn 19");
    }

    #[test]
    fn test_compactor_merges_consecutive_roles() {
        let mut session = Session::with_id("compact");
        for content in ["first", "second"] {
            session.record(
                EventKind::UserInput,
                serde_json::json!({"role": "user", "content": content}),
                2,
            );
        }
        session.record(
            EventKind::PhaseResult,
            serde_json::json!({"role": "assistant", "content": "  reply  "}),
            2,
        );
        let compiler = ContextCompiler::with_processors(vec![
            Box::new(HistorySelector::new(2, 5)),
            Box::new(Compactor),
        ]);
        let ctx = compiler.compile(&mut session, 500, "sys");
        assert_eq!(ctx.history.len(), 2);
        assert_eq!(ctx.history[0].content, "first\nsecond");
        assert_eq!(ctx.history[1].content, "reply");
    }

    #[test]
    fn test_memory_preloader_attaches_hits() {
        let memory = Arc::new(InMemoryBackend::new());
        memory.store(
            "pref",
            "user enjoys systems programming",
            MemoryCategory::Core,
            None,
            &[],
        );
        let mut session = Session::with_id("mem");
        session.record(
            EventKind::UserInput,
            serde_json::json!({"text": "tell me about systems programming"}),
            5,
        );
        let compiler = ContextCompiler::with_processors(vec![Box::new(MemoryPreloader::new(
            memory, 5,
        ))]);
        let ctx = compiler.compile(&mut session, 500, "sys");
        assert_eq!(ctx.memory_hits.len(), 1);
        assert_eq!(ctx.memory_hits[0].key, "pref");
        assert!(ctx.token_count > estimate_tokens("sys"));
    }

    #[test]
    fn test_memory_preloader_no_user_input() {
        let memory = Arc::new(InMemoryBackend::new());
        let mut session = Session::with_id("mem-none");
        let compiler = ContextCompiler::with_processors(vec![Box::new(MemoryPreloader::new(
            memory, 5,
        ))]);
        let ctx = compiler.compile(&mut session, 500, "sys");
        assert!(ctx.memory_hits.is_empty());
    }

    #[test]
    fn test_artifact_attacher_externalizes_large_results() {
        let store = Arc::new(SqliteArtifactStore::open_in_memory().expect("store"));
        let mut session = Session::with_id("attach");
        let big = "error ".repeat(2000);
        let compiler = ContextCompiler::new();
        let mut ctx = compiler.compile(&mut session, 10_000, "sys");
        ctx.tool_results.push(super::super::working::ToolResultEntry {
            tool: "shell".to_owned(),
            result: big.clone(),
        });
        ctx.token_count = ctx.token_count.saturating_add(estimate_tokens(&big));

        let attacher = ArtifactAttacher::new(Arc::clone(&store) as Arc<dyn ArtifactStore>, 1024);
        let ctx = attacher.process(&mut session, ctx, 10_000);

        assert!(ctx.tool_results.is_empty());
        assert_eq!(ctx.artifact_refs.len(), 1);
        assert_eq!(ctx.artifact_refs[0].size_bytes, big.len());

        let stored = store
            .retrieve(&ctx.artifact_refs[0].handle)
            .expect("retrieve")
            .expect("present");
        assert_eq!(stored, big.as_bytes());

        // The session gained an artifact_stored event.
        assert_eq!(
            session.event_log.filter(&[EventKind::ArtifactStored]).len(),
            1
        );
    }

    #[test]
    fn test_artifact_attacher_keeps_small_results() {
        let store = Arc::new(SqliteArtifactStore::open_in_memory().expect("store"));
        let mut session = Session::with_id("small");
        let compiler = ContextCompiler::new();
        let mut ctx = compiler.compile(&mut session, 1000, "sys");
        ctx.tool_results.push(super::super::working::ToolResultEntry {
            tool: "calc".to_owned(),
            result: "short".to_owned(),
        });

        let attacher = ArtifactAttacher::new(store, 1024);
        let ctx = attacher.process(&mut session, ctx, 1000);
        assert_eq!(ctx.tool_results.len(), 1);
        assert!(ctx.artifact_refs.is_empty());
    }

    #[test]
    fn test_empty_compiler_returns_baseline() {
        let mut session = Session::with_id("empty");
        let ctx = ContextCompiler::new().compile(&mut session, 50, "prompt here");
        assert_eq!(ctx.token_count, estimate_tokens("prompt here"));
        assert_eq!(ctx.budget, 50);
        assert!(ctx.history.is_empty());
    }
}
