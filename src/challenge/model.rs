//! Immutable challenge and step data, loaded once per run.

use crate::challenge::tree::AlternativeNode;

/// One point in a walkthrough requiring a single next action.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    /// Context text given to the agent: what the walkthrough is trying to
    /// achieve at this point.
    pub description: String,
    /// Root of the alternative tree describing every accepted next action.
    pub alternatives: AlternativeNode,
}

impl Step {
    pub fn new(description: impl Into<String>, alternatives: AlternativeNode) -> Self {
        Self {
            description: description.into(),
            alternatives,
        }
    }
}

/// A named walkthrough: an ordered sequence of steps.
///
/// Owned read-only by the orchestrator for the duration of a run. Per-step
/// evaluation always works on a deep copy of the step's tree, never on this
/// template.
#[derive(Debug, Clone, PartialEq)]
pub struct Challenge {
    pub name: String,
    pub steps: Vec<Step>,
}

impl Challenge {
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            steps,
        }
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }
}
