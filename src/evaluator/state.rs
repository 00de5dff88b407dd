//! Per-step evaluation state.
//!
//! Each step is evaluated against a private, deep copy of its alternative
//! tree. Sibling steps never share tree instances, so a run can mutate
//! freely and a batch can replay the same challenge concurrently. When a
//! step reaches a terminal outcome its state is frozen into an immutable
//! [`StepResult`].

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::capability::{CandidateLeaf, Prediction, VerdictMap};
use crate::challenge::{AlternativeNode, Step};
use crate::config::WeightConfig;

/// Terminal outcome of a step evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    /// The step's alternative tree was satisfied.
    Success,
    /// The iteration budget ran out, or the agent conceded.
    Exhausted,
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepOutcome::Success => write!(f, "success"),
            StepOutcome::Exhausted => write!(f, "exhausted"),
        }
    }
}

/// Record of one Prompt/Evaluate cycle.
#[derive(Debug, Clone)]
pub struct Turn {
    /// One-based iteration this turn belongs to.
    pub iteration: u32,
    /// What the agent predicted. `None` when the agent never answered.
    pub prediction: Option<Prediction>,
    /// Leaves the comparator judged matched. Empty when nothing matched.
    pub verdicts: VerdictMap,
    /// Whether the agent conceded instead of predicting.
    pub gave_up: bool,
    /// Whether a capability failed past its retry budget this turn.
    pub degraded: bool,
}

impl Turn {
    /// A normal turn: the agent answered and the comparator judged it.
    pub fn answered(iteration: u32, prediction: Prediction, verdicts: VerdictMap) -> Self {
        Self {
            iteration,
            prediction: Some(prediction),
            verdicts,
            gave_up: false,
            degraded: false,
        }
    }

    /// The agent conceded the step.
    pub fn conceded(iteration: u32, prediction: Prediction) -> Self {
        Self {
            iteration,
            prediction: Some(prediction),
            verdicts: VerdictMap::new(),
            gave_up: true,
            degraded: false,
        }
    }

    /// A capability failed past its retry budget. The prediction is present
    /// when the agent answered but the comparator never did.
    pub fn degraded(iteration: u32, prediction: Option<Prediction>) -> Self {
        Self {
            iteration,
            prediction,
            verdicts: VerdictMap::new(),
            gave_up: false,
            degraded: true,
        }
    }

    /// Whether this turn completed at least one leaf.
    pub fn matched(&self) -> bool {
        !self.verdicts.is_empty()
    }
}

/// Mutable state owned by one step evaluation.
#[derive(Debug)]
pub struct StepState {
    step_index: usize,
    description: String,
    tree: AlternativeNode,
    iteration: u32,
    turns: Vec<Turn>,
}

impl StepState {
    /// Start evaluating `step` with a fresh tree copy and iteration 1.
    pub fn new(step_index: usize, step: &Step) -> Self {
        Self {
            step_index,
            description: step.description.clone(),
            tree: step.alternatives.clone(),
            iteration: 1,
            turns: Vec::new(),
        }
    }

    pub fn step_index(&self) -> usize {
        self.step_index
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Current one-based iteration.
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Whether the alternative tree is satisfied.
    pub fn is_satisfied(&self) -> bool {
        self.tree.is_satisfied()
    }

    /// The still-incomplete leaves, as comparator candidates.
    pub fn candidates(&self) -> Vec<CandidateLeaf> {
        self.tree
            .incomplete_leaves()
            .into_iter()
            .map(|leaf| CandidateLeaf::new(leaf.id, leaf.original_command.clone()))
            .collect()
    }

    /// Commands already predicted and judged non-matching this step.
    pub fn rejected_predictions(&self) -> Vec<String> {
        self.turns
            .iter()
            .filter(|turn| !turn.matched() && !turn.gave_up)
            .filter_map(|turn| turn.prediction.as_ref())
            .map(|prediction| prediction.command.clone())
            .collect()
    }

    /// Apply a verdict set to the tree. Returns how many leaves were newly
    /// completed; repeated verdicts for already-completed leaves count zero.
    pub fn apply_verdicts(&mut self, verdicts: &VerdictMap) -> usize {
        let mut newly_completed = 0;
        for (leaf_id, verdict) in verdicts {
            if self.tree.apply_match(*leaf_id, &verdict.matched_text) {
                newly_completed += 1;
            }
        }
        newly_completed
    }

    /// Append a turn to the history.
    pub fn record(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Move on to the next iteration.
    pub fn advance(&mut self) {
        self.iteration += 1;
    }

    /// Freeze this state into an immutable result.
    pub fn into_result(self, outcome: StepOutcome) -> StepResult {
        StepResult {
            step_index: self.step_index,
            description: self.description,
            outcome,
            iterations: self.iteration,
            tree: self.tree,
            turns: self.turns,
        }
    }
}

/// Immutable snapshot of a finished step evaluation.
#[derive(Debug, Clone)]
pub struct StepResult {
    /// Zero-based index of the step within the challenge.
    pub step_index: usize,
    /// Goal description of the step.
    pub description: String,
    /// How the step ended.
    pub outcome: StepOutcome,
    /// Iterations consumed, between 1 and the configured maximum.
    pub iterations: u32,
    /// Final alternative tree, with completion and matched commands baked in.
    pub tree: AlternativeNode,
    /// Ordered history of every turn taken.
    pub turns: Vec<Turn>,
}

impl StepResult {
    /// Score contribution of this step under the given weight rules.
    pub fn weight(&self, weights: &WeightConfig) -> f64 {
        self.tree.weight(weights)
    }

    pub fn is_success(&self) -> bool {
        self.outcome == StepOutcome::Success
    }
}
