//! The alternative tree: AND/OR composition of valid next actions.
//!
//! Each walkthrough step records every action accepted as a correct "next
//! move" at that point. A step may be satisfiable through several
//! independent actions (`or`), or require several actions together (`and`),
//! nested arbitrarily. Leaves carry the recorded command text and whether it
//! is the walkthrough's primary ("gold") action.
//!
//! Tree shape and leaf identities are fixed at load time. During a step's
//! evaluation only two leaf fields mutate, and only monotonically:
//! `completed` goes false to true exactly once, and `matched_command` is set
//! alongside it. Everything else on the tree is read-only.

use serde::{Deserialize, Serialize};

use crate::config::WeightConfig;

/// Stable identity of a leaf within one step's tree.
///
/// Assigned in depth-first pre-order at load time, starting at 0 for each
/// step. Comparator verdicts refer back to leaves by this id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeafId(pub u32);

impl std::fmt::Display for LeafId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "leaf#{}", self.0)
    }
}

/// A single recorded valid action.
#[derive(Debug, Clone, PartialEq)]
pub struct Alternative {
    /// Identity within the step's tree.
    pub id: LeafId,
    /// The walkthrough's recorded command text.
    pub original_command: String,
    /// Whether this is the walkthrough's primary intended action.
    pub gold: bool,
    /// Whether the agent has satisfied this alternative.
    pub completed: bool,
    /// The agent's text that satisfied it, once completed.
    pub matched_command: Option<String>,
}

impl Alternative {
    /// A fresh, incomplete alternative.
    pub fn new(id: LeafId, original_command: impl Into<String>, gold: bool) -> Self {
        Self {
            id,
            original_command: original_command.into(),
            gold,
            completed: false,
            matched_command: None,
        }
    }
}

/// A node in a step's alternative tree.
///
/// Closed set of shapes: adding a combinator means touching
/// [`AlternativeNode::is_satisfied`] and [`AlternativeNode::weight`] and
/// nothing else.
#[derive(Debug, Clone, PartialEq)]
pub enum AlternativeNode {
    /// One recorded valid action.
    Leaf(Alternative),
    /// Satisfied iff every child is satisfied.
    And(Vec<AlternativeNode>),
    /// Satisfied iff at least one child is satisfied.
    Or(Vec<AlternativeNode>),
}

impl AlternativeNode {
    /// Convenience constructor for a leaf node.
    pub fn leaf(id: u32, command: impl Into<String>, gold: bool) -> Self {
        AlternativeNode::Leaf(Alternative::new(LeafId(id), command, gold))
    }

    /// Whether the subtree rooted here is satisfied.
    pub fn is_satisfied(&self) -> bool {
        match self {
            AlternativeNode::Leaf(alt) => alt.completed,
            AlternativeNode::And(children) => children.iter().all(AlternativeNode::is_satisfied),
            AlternativeNode::Or(children) => children.iter().any(AlternativeNode::is_satisfied),
        }
    }

    /// Mark the leaf `id` completed with the text that satisfied it.
    ///
    /// Returns true when the leaf was newly completed. Idempotent: a leaf
    /// that is already completed keeps its first `matched_command`, so
    /// completion is monotonic within a step. Returns false when `id` is not
    /// in this subtree.
    pub fn apply_match(&mut self, id: LeafId, matched_text: &str) -> bool {
        match self {
            AlternativeNode::Leaf(alt) => {
                if alt.id != id || alt.completed {
                    return false;
                }
                alt.completed = true;
                alt.matched_command = Some(matched_text.to_string());
                true
            }
            AlternativeNode::And(children) | AlternativeNode::Or(children) => children
                .iter_mut()
                .any(|child| child.apply_match(id, matched_text)),
        }
    }

    /// Best credit obtainable at this node given current completion,
    /// in [0, 1]. Pure: never mutates the tree.
    ///
    /// A completed gold leaf is worth 1.0, a completed non-gold leaf
    /// `weights.nongold_credit`, an incomplete leaf 0.0. Combinators fold
    /// child weights with their configured rule (min for `and`, max for
    /// `or` by default).
    pub fn weight(&self, weights: &WeightConfig) -> f64 {
        match self {
            AlternativeNode::Leaf(alt) => {
                if !alt.completed {
                    0.0
                } else if alt.gold {
                    1.0
                } else {
                    weights.nongold_credit
                }
            }
            AlternativeNode::And(children) => weights
                .and_rule
                .combine(children.iter().map(|c| c.weight(weights))),
            AlternativeNode::Or(children) => weights
                .or_rule
                .combine(children.iter().map(|c| c.weight(weights))),
        }
    }

    /// All leaves not yet completed, in pre-order.
    ///
    /// These are the candidates submitted to the comparator; completed
    /// leaves are never re-submitted.
    pub fn incomplete_leaves(&self) -> Vec<&Alternative> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out, false);
        out
    }

    /// All leaves, in pre-order.
    pub fn leaves(&self) -> Vec<&Alternative> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out, true);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a Alternative>, include_completed: bool) {
        match self {
            AlternativeNode::Leaf(alt) => {
                if include_completed || !alt.completed {
                    out.push(alt);
                }
            }
            AlternativeNode::And(children) | AlternativeNode::Or(children) => {
                for child in children {
                    child.collect_leaves(out, include_completed);
                }
            }
        }
    }

    /// The command text a transcript should record for this step.
    ///
    /// Preference order: the matched text of a completed gold leaf, then the
    /// matched text of any completed leaf, then the recorded gold command,
    /// then the first recorded command. Used to carry context forward to
    /// later steps even when this step was never solved.
    pub fn resolved_command(&self) -> Option<&str> {
        let leaves = self.leaves();
        leaves
            .iter()
            .find(|alt| alt.completed && alt.gold)
            .and_then(|alt| alt.matched_command.as_deref())
            .or_else(|| {
                leaves
                    .iter()
                    .find(|alt| alt.completed)
                    .and_then(|alt| alt.matched_command.as_deref())
            })
            .or_else(|| {
                leaves
                    .iter()
                    .find(|alt| alt.gold)
                    .map(|alt| alt.original_command.as_str())
            })
            .or_else(|| leaves.first().map(|alt| alt.original_command.as_str()))
    }

    /// Whether any leaf in the subtree is marked gold.
    pub fn has_gold(&self) -> bool {
        self.leaves().iter().any(|alt| alt.gold)
    }

    /// Total number of leaves in the subtree.
    pub fn leaf_count(&self) -> usize {
        self.leaves().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn or2(a: AlternativeNode, b: AlternativeNode) -> AlternativeNode {
        AlternativeNode::Or(vec![a, b])
    }

    fn and2(a: AlternativeNode, b: AlternativeNode) -> AlternativeNode {
        AlternativeNode::And(vec![a, b])
    }

    #[test]
    fn test_leaf_satisfaction_follows_completed() {
        let mut node = AlternativeNode::leaf(0, "nmap -sV 10.0.0.1", true);
        assert!(!node.is_satisfied());
        assert!(node.apply_match(LeafId(0), "nmap -sV -p- 10.0.0.1"));
        assert!(node.is_satisfied());
    }

    #[test]
    fn test_and_requires_all_children() {
        let mut tree = and2(
            AlternativeNode::leaf(0, "cmd a", true),
            AlternativeNode::leaf(1, "cmd b", true),
        );
        assert!(!tree.is_satisfied());
        tree.apply_match(LeafId(0), "a");
        assert!(!tree.is_satisfied());
        tree.apply_match(LeafId(1), "b");
        assert!(tree.is_satisfied());
    }

    #[test]
    fn test_or_requires_any_child() {
        let mut tree = or2(
            AlternativeNode::leaf(0, "cmd a", true),
            AlternativeNode::leaf(1, "cmd b", false),
        );
        assert!(!tree.is_satisfied());
        tree.apply_match(LeafId(1), "b");
        assert!(tree.is_satisfied());
    }

    #[test]
    fn test_nested_composition() {
        // or(and(l0, l1), l2)
        let mut tree = or2(
            and2(
                AlternativeNode::leaf(0, "a", true),
                AlternativeNode::leaf(1, "b", true),
            ),
            AlternativeNode::leaf(2, "c", false),
        );
        tree.apply_match(LeafId(0), "a");
        assert!(!tree.is_satisfied());
        tree.apply_match(LeafId(2), "c");
        assert!(tree.is_satisfied());
    }

    #[test]
    fn test_apply_match_is_idempotent() {
        let mut node = AlternativeNode::leaf(0, "cmd", true);
        assert!(node.apply_match(LeafId(0), "first"));
        assert!(!node.apply_match(LeafId(0), "second"));
        match &node {
            AlternativeNode::Leaf(alt) => {
                assert!(alt.completed);
                assert_eq!(alt.matched_command.as_deref(), Some("first"));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_apply_match_unknown_id_is_noop() {
        let mut tree = or2(
            AlternativeNode::leaf(0, "a", true),
            AlternativeNode::leaf(1, "b", false),
        );
        assert!(!tree.apply_match(LeafId(99), "x"));
        assert!(!tree.is_satisfied());
    }

    #[test]
    fn test_completion_is_monotonic_across_matches() {
        let mut tree = and2(
            AlternativeNode::leaf(0, "a", true),
            AlternativeNode::leaf(1, "b", true),
        );
        tree.apply_match(LeafId(0), "a");
        // Later matches against other leaves never reset earlier ones.
        tree.apply_match(LeafId(1), "b");
        tree.apply_match(LeafId(0), "again");
        let leaves = tree.leaves();
        assert!(leaves.iter().all(|alt| alt.completed));
        assert_eq!(leaves[0].matched_command.as_deref(), Some("a"));
    }

    #[test]
    fn test_weight_gold_vs_nongold_leaf() {
        let weights = WeightConfig::default();
        let mut gold = AlternativeNode::leaf(0, "a", true);
        let mut nongold = AlternativeNode::leaf(1, "b", false);
        assert_eq!(gold.weight(&weights), 0.0);
        assert_eq!(nongold.weight(&weights), 0.0);
        gold.apply_match(LeafId(0), "a");
        nongold.apply_match(LeafId(1), "b");
        assert_eq!(gold.weight(&weights), 1.0);
        assert_eq!(nongold.weight(&weights), weights.nongold_credit);
    }

    #[test]
    fn test_weight_and_is_min_or_is_max() {
        let weights = WeightConfig::default();
        let mut tree = and2(
            AlternativeNode::leaf(0, "a", true),
            AlternativeNode::leaf(1, "b", false),
        );
        tree.apply_match(LeafId(0), "a");
        tree.apply_match(LeafId(1), "b");
        // and(1.0, 0.5) capped by weakest
        assert_eq!(tree.weight(&weights), weights.nongold_credit);

        let mut tree = or2(
            AlternativeNode::leaf(0, "a", true),
            AlternativeNode::leaf(1, "b", false),
        );
        tree.apply_match(LeafId(0), "a");
        tree.apply_match(LeafId(1), "b");
        // or(1.0, 0.5) takes the best
        assert_eq!(tree.weight(&weights), 1.0);
    }

    #[test]
    fn test_weight_is_pure() {
        let weights = WeightConfig::default();
        let tree = or2(
            AlternativeNode::leaf(0, "a", true),
            AlternativeNode::leaf(1, "b", false),
        );
        let before = tree.clone();
        let _ = tree.weight(&weights);
        assert_eq!(tree, before);
    }

    #[test]
    fn test_incomplete_leaves_shrink_in_preorder() {
        let mut tree = or2(
            and2(
                AlternativeNode::leaf(0, "a", true),
                AlternativeNode::leaf(1, "b", true),
            ),
            AlternativeNode::leaf(2, "c", false),
        );
        let ids: Vec<u32> = tree.incomplete_leaves().iter().map(|l| l.id.0).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        tree.apply_match(LeafId(1), "b");
        let ids: Vec<u32> = tree.incomplete_leaves().iter().map(|l| l.id.0).collect();
        assert_eq!(ids, vec![0, 2]);
    }

    #[test]
    fn test_resolved_command_preference_order() {
        // Unsolved: falls back to the gold recorded command.
        let mut tree = or2(
            AlternativeNode::leaf(0, "nongold cmd", false),
            AlternativeNode::leaf(1, "gold cmd", true),
        );
        assert_eq!(tree.resolved_command(), Some("gold cmd"));

        // Non-gold match beats recorded commands.
        tree.apply_match(LeafId(0), "agent nongold");
        assert_eq!(tree.resolved_command(), Some("agent nongold"));

        // Gold match beats everything.
        tree.apply_match(LeafId(1), "agent gold");
        assert_eq!(tree.resolved_command(), Some("agent gold"));
    }

    #[test]
    fn test_resolved_command_without_gold_uses_first_leaf() {
        let tree = or2(
            AlternativeNode::leaf(0, "first", false),
            AlternativeNode::leaf(1, "second", false),
        );
        assert_eq!(tree.resolved_command(), Some("first"));
        assert!(!tree.has_gold());
    }
}
