//! Session and event log -- ground truth for one execution.
//!
//! Events are immutable once appended. Each recorded event is mirrored
//! into the session's evidence pack under a fixed kind mapping, so the
//! audit trail and the working-context source never diverge.

use serde::{Deserialize, Serialize};

use crate::evidence::{EvidenceKind, EvidencePack};
use crate::ids::{now_epoch, short_id, time_sortable_id};

/// Session event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A user request entered the session.
    UserInput,
    /// A memory recall produced hits.
    MemoryHit,
    /// A tool was invoked.
    ToolCall,
    /// A tool returned successfully.
    ToolSuccess,
    /// A tool returned an error.
    ToolError,
    /// A tool timed out.
    ToolTimeout,
    /// The guard pipeline decided.
    GuardDecision,
    /// A pipeline phase produced a result.
    PhaseResult,
    /// A payload was externalized into the artifact store.
    ArtifactStored,
}

impl EventKind {
    /// Stable snake_case label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UserInput => "user_input",
            Self::MemoryHit => "memory_hit",
            Self::ToolCall => "tool_call",
            Self::ToolSuccess => "tool_success",
            Self::ToolError => "tool_error",
            Self::ToolTimeout => "tool_timeout",
            Self::GuardDecision => "guard_decision",
            Self::PhaseResult => "phase_result",
            Self::ArtifactStored => "artifact_stored",
        }
    }

    /// Evidence classification this event kind maps to.
    fn evidence_kind(self) -> EvidenceKind {
        match self {
            Self::UserInput => EvidenceKind::Input,
            Self::MemoryHit => EvidenceKind::Source,
            Self::ToolCall => EvidenceKind::ToolCall,
            Self::ToolError | Self::ToolTimeout => EvidenceKind::Error,
            Self::GuardDecision => EvidenceKind::Decision,
            Self::ToolSuccess | Self::PhaseResult | Self::ArtifactStored => EvidenceKind::Output,
        }
    }
}

/// Typed event in the session timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    /// Time-sortable event id.
    pub event_id: String,
    /// Epoch seconds at append time.
    pub timestamp: f64,
    /// Event classification.
    pub kind: EventKind,
    /// Structured payload.
    pub data: serde_json::Value,
    /// Estimated token cost of including this event in a context.
    pub token_estimate: usize,
}

/// Append-only ordered log of session events.
#[derive(Debug, Default)]
pub struct EventLog {
    /// The ordered events.
    pub events: Vec<SessionEvent>,
}

impl EventLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event, returning a clone of the stored record.
    pub fn append(
        &mut self,
        kind: EventKind,
        data: serde_json::Value,
        token_estimate: usize,
    ) -> SessionEvent {
        let event = SessionEvent {
            event_id: time_sortable_id(),
            timestamp: now_epoch(),
            kind,
            data,
            token_estimate,
        };
        self.events.push(event.clone());
        event
    }

    /// Events of the given kinds, in log order.
    pub fn filter(&self, kinds: &[EventKind]) -> Vec<&SessionEvent> {
        self.events
            .iter()
            .filter(|e| kinds.contains(&e.kind))
            .collect()
    }

    /// Sum of all token estimates.
    pub fn total_tokens(&self) -> usize {
        self.events
            .iter()
            .fold(0usize, |acc, e| acc.saturating_add(e.token_estimate))
    }

    /// Events at or after a timestamp.
    pub fn since(&self, timestamp: f64) -> Vec<&SessionEvent> {
        self.events
            .iter()
            .filter(|e| e.timestamp >= timestamp)
            .collect()
    }
}

/// A unit of work: event log plus evidence pack under one session id.
pub struct Session {
    /// Short opaque session identifier.
    pub session_id: String,
    /// Append-only event log.
    pub event_log: EventLog,
    /// Evidence pack mirroring the log.
    pub evidence: EvidencePack,
}

impl Session {
    /// Create a session with a fresh id.
    pub fn new() -> Self {
        Self::with_id(short_id())
    }

    /// Create a session with a caller-supplied id.
    pub fn with_id(session_id: impl Into<String>) -> Self {
        let session_id = session_id.into();
        Self {
            evidence: EvidencePack::new(session_id.clone()),
            session_id,
            event_log: EventLog::new(),
        }
    }

    /// Append an event and mirror it into the evidence pack.
    pub fn record(
        &mut self,
        kind: EventKind,
        data: serde_json::Value,
        token_estimate: usize,
    ) -> SessionEvent {
        let event = self.event_log.append(kind, data.clone(), token_estimate);
        self.evidence.add(kind.as_str(), kind.evidence_kind(), data);
        event
    }

    /// Consume the session, yielding its evidence pack.
    pub fn into_evidence_pack(self) -> EvidencePack {
        self.evidence
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_preserves_order() {
        let mut log = EventLog::new();
        log.append(EventKind::UserInput, serde_json::json!({"text": "a"}), 2);
        log.append(EventKind::PhaseResult, serde_json::json!({"phase": "x"}), 3);
        assert_eq!(log.events.len(), 2);
        assert_eq!(log.events[0].kind, EventKind::UserInput);
        assert_eq!(log.events[1].kind, EventKind::PhaseResult);
        assert!(log.events[0].timestamp <= log.events[1].timestamp);
    }

    #[test]
    fn test_filter_by_kinds() {
        let mut log = EventLog::new();
        log.append(EventKind::UserInput, serde_json::json!({}), 0);
        log.append(EventKind::ToolCall, serde_json::json!({}), 0);
        log.append(EventKind::PhaseResult, serde_json::json!({}), 0);
        let picked = log.filter(&[EventKind::UserInput, EventKind::PhaseResult]);
        assert_eq!(picked.len(), 2);
    }

    #[test]
    fn test_total_tokens() {
        let mut log = EventLog::new();
        log.append(EventKind::UserInput, serde_json::json!({}), 5);
        log.append(EventKind::ToolCall, serde_json::json!({}), 7);
        assert_eq!(log.total_tokens(), 12);
    }

    #[test]
    fn test_since() {
        let mut log = EventLog::new();
        log.append(EventKind::UserInput, serde_json::json!({}), 0);
        let cutoff = log.events[0].timestamp;
        assert_eq!(log.since(cutoff).len(), 1);
        assert_eq!(log.since(cutoff + 10.0).len(), 0);
    }

    #[test]
    fn test_session_mirrors_events_into_evidence() {
        let mut session = Session::with_id("mirror-test");
        session.record(EventKind::UserInput, serde_json::json!({"text": "hi"}), 2);
        session.record(EventKind::GuardDecision, serde_json::json!({"allowed": true}), 1);
        session.record(EventKind::ToolError, serde_json::json!({"error": "boom"}), 1);

        assert_eq!(session.evidence.len(), 3);
        assert_eq!(session.evidence.entries[0].phase, "user_input");
        assert_eq!(session.evidence.entries[0].kind, EvidenceKind::Input);
        assert_eq!(session.evidence.entries[1].kind, EvidenceKind::Decision);
        assert_eq!(session.evidence.entries[2].kind, EvidenceKind::Error);
        assert!(session.evidence.verify());
    }

    #[test]
    fn test_session_ids_match() {
        let session = Session::new();
        assert_eq!(session.session_id, session.evidence.session_id);
        assert_eq!(session.session_id.len(), 12);
    }
}
