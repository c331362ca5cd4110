//! Classifier-based guard backends.
//!
//! [`ClassifierGuard`] is the contract for ML classifiers (prompt-injection
//! detectors) layered above the regex tier to close its documented gaps.
//! The provided [`ClassifierGuard::check_classified`] maps a verdict onto a
//! [`GuardResult`]: unsafe at score >= 75 is CRITICAL, below is HIGH.
//! Concrete ONNX or remote chat-completion classifiers implement
//! `classify` and wire [`GuardBackend`] through the provided mapping, as
//! [`StubClassifierGuard`] does.

use super::{GuardBackend, GuardResult, ThreatLevel};

/// Threshold above which an unsafe verdict escalates to CRITICAL.
const CRITICAL_SCORE_THRESHOLD: f64 = 75.0;

/// Contract for classifier guard backends.
pub trait ClassifierGuard: Send + Sync {
    /// Classifier name for logs and diagnostics.
    fn classifier_name(&self) -> &str;

    /// Classify text, returning `(is_safe, threat_score)` with the score in
    /// 0–100.
    fn classify(&self, text: &str) -> (bool, f64);

    /// Map a classification onto a guard verdict.
    fn check_classified(&self, text: &str) -> GuardResult {
        let (is_safe, score) = self.classify(text);
        if is_safe {
            return GuardResult {
                allowed: true,
                threat_level: ThreatLevel::None,
                reason: format!("{}: safe (score={score:.1})", self.classifier_name()),
                score,
            };
        }
        let threat = if score >= CRITICAL_SCORE_THRESHOLD {
            ThreatLevel::Critical
        } else {
            ThreatLevel::High
        };
        GuardResult::block(
            threat,
            score,
            format!("{}: unsafe (score={score:.1})", self.classifier_name()),
        )
    }
}

/// Always-passing classifier for tests and offline development.
#[derive(Debug, Default, Clone, Copy)]
pub struct StubClassifierGuard;

impl ClassifierGuard for StubClassifierGuard {
    fn classifier_name(&self) -> &str {
        "stub-classifier"
    }

    fn classify(&self, _text: &str) -> (bool, f64) {
        (true, 0.0)
    }
}

impl GuardBackend for StubClassifierGuard {
    fn name(&self) -> &str {
        self.classifier_name()
    }

    fn check(&self, text: &str) -> GuardResult {
        self.check_classified(text)
    }
}
