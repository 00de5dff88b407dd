//! The comparator abstraction.
//!
//! A comparator decides whether a predicted command accomplishes what any of
//! the still-incomplete alternatives of the current step would accomplish.
//! The engine only ever offers incomplete leaves as candidates, so a verdict
//! can be applied to the alternative tree without re-checking state.

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::challenge::LeafId;

use super::agent::Prediction;
use super::error::ComparatorResult;

/// An incomplete leaf offered to the comparator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateLeaf {
    /// Identity of the leaf inside the step's alternative tree.
    pub id: LeafId,
    /// The expected command recorded by the walkthrough.
    pub command: String,
}

impl CandidateLeaf {
    pub fn new(id: LeafId, command: impl Into<String>) -> Self {
        Self {
            id,
            command: command.into(),
        }
    }
}

/// A positive judgement for one candidate leaf.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    /// The agent text that satisfied the leaf, recorded on the tree.
    pub matched_text: String,
    /// Judge-reported confidence, when available.
    pub confidence: Option<f64>,
    /// Judge-reported reasoning, when available.
    pub explanation: Option<String>,
}

impl Verdict {
    /// A plain match carrying only the agent text.
    pub fn of(matched_text: impl Into<String>) -> Self {
        Self {
            matched_text: matched_text.into(),
            confidence: None,
            explanation: None,
        }
    }
}

/// Matched leaves keyed by identity. An empty map means nothing matched.
///
/// Ordered so that verdict application and snapshots are deterministic.
pub type VerdictMap = BTreeMap<LeafId, Verdict>;

/// Trait for prediction judges.
#[async_trait]
pub trait Comparator: Send + Sync {
    /// Short name used in logs and reports.
    fn name(&self) -> &str;

    /// Judge `prediction` against the candidate leaves of a step.
    ///
    /// `goal` is the step description, given so semantic judges can weigh
    /// intent and not just the literal command text.
    async fn compare(
        &self,
        goal: &str,
        prediction: &Prediction,
        candidates: &[CandidateLeaf],
    ) -> ComparatorResult<VerdictMap>;
}

/// Offline comparator using normalized string equality.
///
/// Commands match when they are identical after trimming, lowercasing, and
/// collapsing whitespace runs. Strict, but deterministic and free, which
/// makes it the judge of choice for smoke runs and tests.
#[derive(Debug, Default)]
pub struct ExactComparator;

impl ExactComparator {
    pub fn new() -> Self {
        Self
    }
}

fn normalize(command: &str) -> String {
    command.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

#[async_trait]
impl Comparator for ExactComparator {
    fn name(&self) -> &str {
        "exact"
    }

    async fn compare(
        &self,
        _goal: &str,
        prediction: &Prediction,
        candidates: &[CandidateLeaf],
    ) -> ComparatorResult<VerdictMap> {
        let predicted = normalize(&prediction.command);
        let mut verdicts = VerdictMap::new();

        if predicted.is_empty() {
            return Ok(verdicts);
        }

        for candidate in candidates {
            if normalize(&candidate.command) == predicted {
                let mut verdict = Verdict::of(prediction.command.clone());
                verdict.confidence = Some(1.0);
                verdicts.insert(candidate.id, verdict);
            }
        }

        Ok(verdicts)
    }
}
