//! Stateful per-session guard over tool invocations.
//!
//! Checks `name:args` call strings against an allowed tool set, a
//! per-session call cap, and the Log-To-Leak heuristic: arguments that
//! quote a previously recorded message verbatim (longer than 20 chars)
//! indicate an attempt to smuggle conversation content out through a tool.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use super::{GuardBackend, GuardResult, ThreatLevel};

/// Messages shorter than this are too generic to count as leaks.
const LEAK_MIN_CHARS: usize = 20;

#[derive(Debug, Default)]
struct SessionState {
    call_count: u32,
    messages: Vec<String>,
}

/// Per-session tool invocation guard.
pub struct ToolInvocationGuard {
    allowed_tools: HashSet<String>,
    max_calls_per_session: u32,
    sessions: Mutex<HashMap<String, SessionState>>,
}

impl ToolInvocationGuard {
    /// Build a guard over an allowed tool set with a per-session call cap.
    pub fn new(allowed_tools: impl IntoIterator<Item = String>, max_calls_per_session: u32) -> Self {
        Self {
            allowed_tools: allowed_tools.into_iter().collect(),
            max_calls_per_session,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Record a message observed in a session; later tool arguments that
    /// contain it verbatim trip the Log-To-Leak heuristic.
    pub fn record_message(&self, session_id: &str, message: &str) {
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions
                .entry(session_id.to_owned())
                .or_default()
                .messages
                .push(message.to_owned());
        }
    }

    /// Calls made so far in a session.
    pub fn call_count(&self, session_id: &str) -> u32 {
        self.sessions
            .lock()
            .ok()
            .and_then(|s| s.get(session_id).map(|st| st.call_count))
            .unwrap_or(0)
    }

    /// Check a `name:args` call string for a session. Rules in order:
    /// unknown tool (CRITICAL), call cap exceeded (HIGH), Log-To-Leak
    /// (HIGH); an allowed call is counted against the session cap.
    pub fn check_call(&self, session_id: &str, call: &str) -> GuardResult {
        let (name, args) = call.split_once(':').unwrap_or((call, ""));
        let name = name.trim();

        if !self.allowed_tools.contains(name) {
            return GuardResult::block(
                ThreatLevel::Critical,
                100.0,
                format!("Unknown tool: {name}"),
            );
        }

        let Ok(mut sessions) = self.sessions.lock() else {
            return GuardResult::block(ThreatLevel::High, 75.0, "Guard state unavailable");
        };
        let state = sessions.entry(session_id.to_owned()).or_default();

        if state.call_count >= self.max_calls_per_session {
            return GuardResult::block(
                ThreatLevel::High,
                75.0,
                format!(
                    "Tool call cap exceeded: {} calls allowed per session",
                    self.max_calls_per_session
                ),
            );
        }

        for message in &state.messages {
            if message.chars().count() > LEAK_MIN_CHARS && args.contains(message.as_str()) {
                return GuardResult::block(
                    ThreatLevel::High,
                    75.0,
                    "Log-to-leak detected: tool arguments quote a prior message",
                );
            }
        }

        state.call_count = state.call_count.saturating_add(1);
        GuardResult::pass(format!("Tool call allowed: {name}"))
    }
}

impl GuardBackend for ToolInvocationGuard {
    fn name(&self) -> &str {
        "tool-invocation"
    }

    /// Backend surface over the anonymous session, for use inside a
    /// [`super::GuardPipeline`] that sees bare call strings.
    fn check(&self, text: &str) -> GuardResult {
        self.check_call("", text)
    }
}
