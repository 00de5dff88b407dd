//! Evaluation results and their JSON form.
//!
//! A finished run serializes to a stable contract:
//!
//! ```json
//! {
//!   "challenge": "FUNBOX",
//!   "score": 0.75,
//!   "timestamp": "2026-08-23T10:15:30.123456789Z",
//!   "steps_completed": [
//!     {"or": [
//!       {"completed": true, "original_command": "nmap -sV 10.0.0.1",
//!        "gold": true, "matched_command": "nmap -sV -p- 10.0.0.1"},
//!       {"completed": false, "original_command": "rustscan -a 10.0.0.1",
//!        "gold": false}
//!     ]}
//!   ]
//! }
//! ```
//!
//! `steps_completed` mirrors each step's alternative tree after evaluation;
//! `matched_command` appears only on leaves a prediction actually satisfied.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;

use crate::challenge::AlternativeNode;
use crate::error::EngineResult;

use super::state::StepResult;

/// Serialized form of an alternative tree node.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum NodeSnapshot {
    And { and: Vec<NodeSnapshot> },
    Or { or: Vec<NodeSnapshot> },
    Leaf(LeafSnapshot),
}

/// Serialized form of a single alternative leaf.
#[derive(Debug, Clone, Serialize)]
pub struct LeafSnapshot {
    pub completed: bool,
    pub original_command: String,
    pub gold: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_command: Option<String>,
}

impl From<&AlternativeNode> for NodeSnapshot {
    fn from(node: &AlternativeNode) -> Self {
        match node {
            AlternativeNode::Leaf(leaf) => NodeSnapshot::Leaf(LeafSnapshot {
                completed: leaf.completed,
                original_command: leaf.original_command.clone(),
                gold: leaf.gold,
                matched_command: leaf.matched_command.clone(),
            }),
            AlternativeNode::And(children) => NodeSnapshot::And {
                and: children.iter().map(NodeSnapshot::from).collect(),
            },
            AlternativeNode::Or(children) => NodeSnapshot::Or {
                or: children.iter().map(NodeSnapshot::from).collect(),
            },
        }
    }
}

/// Final result of one challenge run.
///
/// The serialized fields are the output contract; `steps` carries the full
/// per-step evaluation detail for programmatic callers and is not part of
/// the JSON.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationResult {
    /// Name of the evaluated challenge.
    pub challenge: String,
    /// Arithmetic mean of the per-step weights, in [0, 1].
    pub score: f64,
    /// When the run finished (UTC, ISO-8601).
    pub timestamp: DateTime<Utc>,
    /// Final alternative tree of every step, in step order.
    pub steps_completed: Vec<NodeSnapshot>,
    /// Full per-step results, not serialized.
    #[serde(skip)]
    pub steps: Vec<StepResult>,
}

impl EvaluationResult {
    /// Assemble a result from finished steps, stamped with the current time.
    pub fn new(challenge: impl Into<String>, score: f64, steps: Vec<StepResult>) -> Self {
        let steps_completed = steps.iter().map(|step| NodeSnapshot::from(&step.tree)).collect();
        Self {
            challenge: challenge.into(),
            score,
            timestamp: Utc::now(),
            steps_completed,
            steps,
        }
    }

    /// How many steps ended in `Success`.
    pub fn steps_succeeded(&self) -> usize {
        self.steps.iter().filter(|step| step.is_success()).count()
    }

    /// Render the output contract as pretty-printed JSON.
    pub fn to_pretty_json(&self) -> EngineResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Write one result to `path`, creating parent directories as needed.
pub fn write_report(path: &Path, result: &EvaluationResult) -> EngineResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, result.to_pretty_json()?)?;
    Ok(())
}

/// Write a batch of results into `dir`, one `<challenge>.json` per run.
pub fn write_batch_reports(dir: &Path, results: &[EvaluationResult]) -> EngineResult<()> {
    std::fs::create_dir_all(dir)?;
    for result in results {
        let file = dir.join(format!("{}.json", file_stem(&result.challenge)));
        std::fs::write(file, result.to_pretty_json()?)?;
    }
    Ok(())
}

/// Challenge names come from directory names, but keep path separators out
/// of the output file name regardless.
fn file_stem(challenge: &str) -> String {
    challenge.replace(['/', '\\'], "_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenge::{AlternativeNode, LeafId};
    use crate::evaluator::state::StepOutcome;
    use serde_json::json;

    fn matched_or_tree() -> AlternativeNode {
        let mut tree = AlternativeNode::Or(vec![
            AlternativeNode::leaf(0, "nmap -sV 10.0.0.1", true),
            AlternativeNode::leaf(1, "rustscan -a 10.0.0.1", false),
        ]);
        tree.apply_match(LeafId(0), "nmap -sV -p- 10.0.0.1");
        tree
    }

    fn step_result(tree: AlternativeNode, outcome: StepOutcome) -> StepResult {
        StepResult {
            step_index: 0,
            description: "Scan the target".to_string(),
            outcome,
            iterations: 1,
            tree,
            turns: vec![],
        }
    }

    #[test]
    fn test_leaf_snapshot_shape() {
        let snapshot = NodeSnapshot::from(&matched_or_tree());
        let value = serde_json::to_value(&snapshot).unwrap();

        assert_eq!(
            value,
            json!({
                "or": [
                    {
                        "completed": true,
                        "original_command": "nmap -sV 10.0.0.1",
                        "gold": true,
                        "matched_command": "nmap -sV -p- 10.0.0.1"
                    },
                    {
                        "completed": false,
                        "original_command": "rustscan -a 10.0.0.1",
                        "gold": false
                    }
                ]
            })
        );
    }

    #[test]
    fn test_nested_combinator_snapshot() {
        let tree = AlternativeNode::And(vec![
            AlternativeNode::leaf(0, "ssh user@10.0.0.1", true),
            AlternativeNode::Or(vec![
                AlternativeNode::leaf(1, "id", true),
                AlternativeNode::leaf(2, "whoami", false),
            ]),
        ]);
        let value = serde_json::to_value(NodeSnapshot::from(&tree)).unwrap();

        assert!(value.get("and").is_some());
        assert!(value["and"][1].get("or").is_some());
        assert_eq!(value["and"][0]["original_command"], "ssh user@10.0.0.1");
    }

    #[test]
    fn test_result_serializes_the_contract_fields_only() {
        let result = EvaluationResult::new(
            "FUNBOX",
            0.5,
            vec![step_result(matched_or_tree(), StepOutcome::Success)],
        );
        let value = serde_json::to_value(&result).unwrap();

        let keys: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["challenge", "score", "timestamp", "steps_completed"]);
        assert_eq!(value["challenge"], "FUNBOX");
        assert_eq!(value["score"], 0.5);
        assert_eq!(value["steps_completed"].as_array().unwrap().len(), 1);

        let timestamp = value["timestamp"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(timestamp).is_ok());
    }

    #[test]
    fn test_steps_succeeded() {
        let result = EvaluationResult::new(
            "FUNBOX",
            0.5,
            vec![
                step_result(matched_or_tree(), StepOutcome::Success),
                step_result(
                    AlternativeNode::leaf(0, "id", true),
                    StepOutcome::Exhausted,
                ),
            ],
        );
        assert_eq!(result.steps_succeeded(), 1);
    }

    #[test]
    fn test_write_report_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports").join("funbox.json");
        let result = EvaluationResult::new(
            "FUNBOX",
            1.0,
            vec![step_result(matched_or_tree(), StepOutcome::Success)],
        );

        write_report(&path, &result).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&written).unwrap();
        assert_eq!(value["challenge"], "FUNBOX");
    }

    #[test]
    fn test_write_batch_reports_one_file_per_challenge() {
        let dir = tempfile::tempdir().unwrap();
        let results = vec![
            EvaluationResult::new("alpha", 1.0, vec![]),
            EvaluationResult::new("beta/gamma", 0.0, vec![]),
        ];

        write_batch_reports(dir.path(), &results).unwrap();

        assert!(dir.path().join("alpha.json").exists());
        assert!(dir.path().join("beta_gamma.json").exists());
    }
}
