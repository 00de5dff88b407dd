//! The replay evaluation engine.
//!
//! Orchestrates a challenge run: each step goes through the Prompt/Evaluate
//! loop in [`subgraph`], mutating per-step state from [`state`]; finished
//! steps are scored by [`scorer`] and assembled into the JSON output
//! contract by [`report`].

pub mod orchestrator;
pub mod report;
pub mod scorer;
pub mod state;
pub mod subgraph;

pub use orchestrator::{CancellationFlag, ChallengeRunOutcome, ChallengeRunner};
pub use report::{write_batch_reports, write_report, EvaluationResult, LeafSnapshot, NodeSnapshot};
pub use scorer::score;
pub use state::{StepOutcome, StepResult, StepState, Turn};
pub use subgraph::StepEvaluator;
