//! Tool interrupt handling -- typed events around every tool call.
//!
//! Each call is recorded into the session before it runs, executed under a
//! per-invocation timeout, normalized through the perception aligner, and
//! externalized into the artifact store when the raw output crosses the
//! threshold.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::artifact::ArtifactStore;
use crate::context::session::{EventKind, Session};
use crate::ids::{now_epoch, time_sortable_id};

use super::bridge::ToolBridge;
use super::normalizer::{NormalizedOutput, PerceptionAligner};

/// Default per-invocation timeout.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// Default externalization threshold in bytes.
const DEFAULT_EXTERNALIZE_THRESHOLD: usize = 1024;

/// Classification of a tool interaction event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolEventKind {
    /// The call was issued.
    Call,
    /// The tool returned successfully.
    Success,
    /// The tool returned an error.
    Error,
    /// The tool hit its deadline.
    Timeout,
}

/// Typed tool interaction event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolEvent {
    /// Time-sortable event id.
    pub event_id: String,
    /// Epoch seconds at creation.
    pub timestamp: f64,
    /// Event classification.
    pub kind: ToolEventKind,
    /// Tool that was invoked.
    pub tool_name: String,
    /// Arguments passed.
    pub arguments: serde_json::Value,
    /// Raw result text on success.
    pub result: Option<String>,
    /// Error description on failure or timeout.
    pub error: Option<String>,
    /// Wall-clock call duration.
    pub latency_ms: f64,
    /// Normalized output on success.
    pub normalized: Option<NormalizedOutput>,
}

impl ToolEvent {
    fn new(kind: ToolEventKind, tool_name: &str, arguments: serde_json::Value) -> Self {
        Self {
            event_id: time_sortable_id(),
            timestamp: now_epoch(),
            kind,
            tool_name: tool_name.to_owned(),
            arguments,
            result: None,
            error: None,
            latency_ms: 0.0,
            normalized: None,
        }
    }
}

/// Wraps a tool bridge with event emission, normalization, and artifact
/// externalization.
pub struct ToolInterruptHandler {
    bridge: Arc<dyn ToolBridge>,
    normalizer: PerceptionAligner,
    artifact_store: Option<Arc<dyn ArtifactStore>>,
    externalize_threshold: usize,
}

impl ToolInterruptHandler {
    /// Handler over a bridge and aligner, without externalization.
    pub fn new(bridge: Arc<dyn ToolBridge>, normalizer: PerceptionAligner) -> Self {
        Self {
            bridge,
            normalizer,
            artifact_store: None,
            externalize_threshold: DEFAULT_EXTERNALIZE_THRESHOLD,
        }
    }

    /// Attach an artifact store; raw outputs at or past `threshold_bytes`
    /// are stored out-of-band instead of inlined.
    pub fn with_artifact_store(
        mut self,
        store: Arc<dyn ArtifactStore>,
        threshold_bytes: usize,
    ) -> Self {
        self.artifact_store = Some(store);
        self.externalize_threshold = threshold_bytes;
        self
    }

    /// Execute a tool call with full event bookkeeping in the session.
    pub async fn call(
        &self,
        session: &mut Session,
        tool_name: &str,
        arguments: serde_json::Value,
        timeout: Duration,
    ) -> ToolEvent {
        session.record(
            EventKind::ToolCall,
            serde_json::json!({"tool_name": tool_name, "arguments": arguments}),
            10,
        );

        let started = Instant::now();
        let outcome = tokio::time::timeout(
            timeout,
            self.bridge.execute(tool_name, arguments.clone()),
        )
        .await;
        let latency_ms = elapsed_ms(started);

        match outcome {
            Ok(Ok(result)) => {
                let normalized = self.normalizer.normalize(tool_name, &result);

                if let Some(ref store) = self.artifact_store {
                    if result.len() >= self.externalize_threshold {
                        match store.store(
                            result.as_bytes(),
                            &format!("tool:{tool_name}"),
                            "text/plain",
                        ) {
                            Ok(handle) => {
                                session.record(
                                    EventKind::ArtifactStored,
                                    serde_json::json!({
                                        "handle": handle.artifact_id,
                                        "source": handle.source,
                                        "size_bytes": handle.size_bytes,
                                    }),
                                    10,
                                );
                            }
                            Err(error) => {
                                tracing::warn!(%error, tool = tool_name, "artifact externalization failed");
                            }
                        }
                    }
                }

                session.record(
                    EventKind::ToolSuccess,
                    serde_json::json!({"tool_name": tool_name, "latency_ms": latency_ms}),
                    5,
                );

                let mut event = ToolEvent::new(ToolEventKind::Success, tool_name, arguments);
                event.result = Some(result);
                event.latency_ms = latency_ms;
                event.normalized = Some(normalized);
                event
            }
            Ok(Err(error)) => {
                session.record(
                    EventKind::ToolError,
                    serde_json::json!({"tool_name": tool_name, "error": error.to_string()}),
                    5,
                );
                let mut event = ToolEvent::new(ToolEventKind::Error, tool_name, arguments);
                event.error = Some(error.to_string());
                event.latency_ms = latency_ms;
                event
            }
            Err(_) => {
                session.record(
                    EventKind::ToolTimeout,
                    serde_json::json!({
                        "tool_name": tool_name,
                        "timeout_sec": timeout.as_secs_f64(),
                    }),
                    5,
                );
                let mut event = ToolEvent::new(ToolEventKind::Timeout, tool_name, arguments);
                event.error = Some(format!(
                    "Tool '{tool_name}' timed out after {}s",
                    timeout.as_secs_f64()
                ));
                event.latency_ms = latency_ms;
                event
            }
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_micros() as f64 / 1000.0
}
