//! Candidate selection strategies.

use std::collections::{HashMap, HashSet};

use super::{Candidate, Feedback};

/// Normalized-prefix length used for consensus grouping.
const CONSENSUS_PREFIX_CHARS: usize = 200;

/// Pick the best candidate from a scored pool.
pub trait Selector: Send + Sync {
    /// Return the winning candidate. `None` only for an empty pool.
    fn select<'a>(&self, candidates: &'a [(Candidate, Feedback)]) -> Option<&'a Candidate>;
}

/// Select by score plus a consensus bonus.
///
/// Candidates whose normalized output (trimmed, lowercased, first 200
/// chars) matches at least one other candidate gain `bonus` on top of
/// their feedback score. Ties break toward lower latency.
#[derive(Debug, Clone, Copy)]
pub struct ConsensusSelector {
    bonus: f64,
}

impl Default for ConsensusSelector {
    fn default() -> Self {
        Self { bonus: 0.15 }
    }
}

impl ConsensusSelector {
    /// Selector with an explicit consensus bonus.
    pub fn new(bonus: f64) -> Self {
        Self { bonus }
    }

    fn normalize(output: &str) -> String {
        output
            .trim()
            .to_lowercase()
            .chars()
            .take(CONSENSUS_PREFIX_CHARS)
            .collect()
    }
}

impl Selector for ConsensusSelector {
    fn select<'a>(&self, candidates: &'a [(Candidate, Feedback)]) -> Option<&'a Candidate> {
        if candidates.is_empty() {
            return None;
        }

        let mut groups: HashMap<String, Vec<&str>> = HashMap::new();
        for (candidate, _) in candidates {
            groups
                .entry(Self::normalize(&candidate.output))
                .or_default()
                .push(candidate.id.as_str());
        }

        let consensus_ids: HashSet<&str> = groups
            .values()
            .filter(|ids| ids.len() >= 2)
            .flatten()
            .copied()
            .collect();

        candidates
            .iter()
            .max_by(|(a, fa), (b, fb)| {
                let ea = fa.score
                    + if consensus_ids.contains(a.id.as_str()) {
                        self.bonus
                    } else {
                        0.0
                    };
                let eb = fb.score
                    + if consensus_ids.contains(b.id.as_str()) {
                        self.bonus
                    } else {
                        0.0
                    };
                ea.partial_cmp(&eb)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    // Lower latency wins ties: reverse-compare latency.
                    .then_with(|| {
                        b.latency_ms
                            .partial_cmp(&a.latency_ms)
                            .unwrap_or(std::cmp::Ordering::Equal)
                    })
            })
            .map(|(candidate, _)| candidate)
    }
}
