//! Challenge discovery and loading.
//!
//! Challenges live under a data directory, one subdirectory per challenge,
//! each containing a `steps_enriched.json` walkthrough file:
//!
//! ```json
//! {
//!   "name": "funbox",
//!   "steps": [
//!     {
//!       "description": "Identify open ports on the target",
//!       "alternatives": [
//!         { "original_command": "nmap -sV 10.10.10.5", "gold": true },
//!         [
//!           { "original_command": "masscan -p1-65535 10.10.10.5", "gold": false },
//!           { "original_command": "nmap -sV -p 22,80 10.10.10.5", "gold": false }
//!         ]
//!       ]
//!     }
//!   ]
//! }
//! ```
//!
//! A step's `alternatives` is either a list (any listed entry satisfies the
//! step; an entry that is itself a list is a multi-step sequence that must
//! be satisfied in full) or an explicit `{"and": [...]}` / `{"or": [...]}`
//! combinator object, nested arbitrarily. Leaves also accept `command` as an
//! alias for `original_command`, matching older walkthrough exports.
//!
//! Leaf identities are assigned in depth-first pre-order per step, starting
//! at 0. The loader never mutates files; the engine never writes back.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::warn;

use crate::challenge::model::{Challenge, Step};
use crate::challenge::tree::{Alternative, AlternativeNode, LeafId};
use crate::error::DataError;

/// Walkthrough file expected inside each challenge directory.
pub const STEPS_FILE: &str = "steps_enriched.json";

/// Which challenges a run should cover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChallengeSelector {
    /// Every challenge discoverable under the data directory.
    All,
    /// An explicit list of challenge names.
    Named(Vec<String>),
}

impl ChallengeSelector {
    /// Parse the CLI selector syntax: `all`, a single name, or a
    /// comma-separated list of names.
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        if trimmed.eq_ignore_ascii_case("all") {
            return ChallengeSelector::All;
        }
        let names: Vec<String> = trimmed
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        ChallengeSelector::Named(names)
    }
}

// ============================================================================
// Raw file representation
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawChallenge {
    #[serde(default)]
    name: Option<String>,
    steps: Vec<RawStep>,
}

#[derive(Debug, Deserialize)]
struct RawStep {
    #[serde(alias = "goal")]
    description: String,
    alternatives: RawAlternatives,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawAlternatives {
    /// Explicit combinator or single leaf at the root.
    Node(RawNode),
    /// Walkthrough-export style: a list of alternatives, any one of which
    /// satisfies the step.
    List(Vec<RawNode>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawNode {
    And { and: Vec<RawNode> },
    Or { or: Vec<RawNode> },
    Leaf(RawLeaf),
    /// A bare list inside an alternatives list: a multi-step sequence that
    /// must be completed in full.
    Sequence(Vec<RawNode>),
}

#[derive(Debug, Deserialize)]
struct RawLeaf {
    #[serde(alias = "command")]
    original_command: String,
    #[serde(default)]
    gold: bool,
}

// ============================================================================
// Loading
// ============================================================================

/// List the names of all challenges under `data_dir`, sorted.
///
/// A challenge is any subdirectory containing a [`STEPS_FILE`]. Unreadable
/// directory entries are skipped with a warning.
pub fn discover_challenges(data_dir: &Path) -> Result<Vec<String>, DataError> {
    if !data_dir.is_dir() {
        return Err(DataError::DirectoryNotFound(
            data_dir.display().to_string(),
        ));
    }

    let mut names = Vec::new();
    for entry in fs::read_dir(data_dir)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(dir = %data_dir.display(), error = %err, "Skipping unreadable directory entry");
                continue;
            }
        };
        let path = entry.path();
        if path.is_dir() && path.join(STEPS_FILE).is_file() {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

/// Load a single challenge by directory name.
pub fn load_challenge(data_dir: &Path, name: &str) -> Result<Challenge, DataError> {
    let steps_path = data_dir.join(name).join(STEPS_FILE);
    if !steps_path.is_file() {
        return Err(DataError::ChallengeNotFound(name.to_string()));
    }

    let content = fs::read_to_string(&steps_path)?;
    let raw: RawChallenge =
        serde_json::from_str(&content).map_err(|err| DataError::ParseError {
            path: steps_path.display().to_string(),
            message: err.to_string(),
        })?;

    let challenge_name = raw.name.unwrap_or_else(|| name.to_string());
    let mut steps = Vec::with_capacity(raw.steps.len());
    for (index, raw_step) in raw.steps.into_iter().enumerate() {
        steps.push(build_step(&challenge_name, index, raw_step)?);
    }

    Ok(Challenge::new(challenge_name, steps))
}

/// Load the challenges a selector names.
///
/// With [`ChallengeSelector::All`], challenges that fail to load are skipped
/// with a warning so one broken walkthrough cannot sink a batch; an empty
/// result is still an error. Explicitly named challenges are loaded
/// strictly: any failure is fatal.
pub fn load_challenges(
    data_dir: &Path,
    selector: &ChallengeSelector,
) -> Result<Vec<Challenge>, DataError> {
    match selector {
        ChallengeSelector::All => {
            let names = discover_challenges(data_dir)?;
            let mut challenges = Vec::new();
            for name in &names {
                match load_challenge(data_dir, name) {
                    Ok(challenge) => challenges.push(challenge),
                    Err(err) => {
                        warn!(challenge = %name, error = %err, "Failed to load challenge, skipping");
                    }
                }
            }
            if challenges.is_empty() {
                return Err(DataError::NoChallenges(data_dir.display().to_string()));
            }
            Ok(challenges)
        }
        ChallengeSelector::Named(names) => {
            if names.is_empty() {
                return Err(DataError::NoChallenges(data_dir.display().to_string()));
            }
            names
                .iter()
                .map(|name| load_challenge(data_dir, name))
                .collect()
        }
    }
}

fn build_step(challenge: &str, index: usize, raw: RawStep) -> Result<Step, DataError> {
    let mut next_id = 0u32;
    let tree = match raw.alternatives {
        RawAlternatives::Node(node) => build_node(challenge, index, node, &mut next_id)?,
        RawAlternatives::List(items) => {
            if items.is_empty() {
                return Err(DataError::EmptyStep {
                    challenge: challenge.to_string(),
                    step: index,
                });
            }
            let children = items
                .into_iter()
                .map(|item| build_node(challenge, index, item, &mut next_id))
                .collect::<Result<Vec<_>, _>>()?;
            AlternativeNode::Or(children)
        }
    };

    if !tree.has_gold() {
        // Older exports occasionally miss the gold marker; scoring then tops
        // out at the non-gold credit for this step.
        warn!(
            challenge = %challenge,
            step = index,
            "No gold alternative recorded for step"
        );
    }

    Ok(Step::new(raw.description, tree))
}

fn build_node(
    challenge: &str,
    step: usize,
    raw: RawNode,
    next_id: &mut u32,
) -> Result<AlternativeNode, DataError> {
    match raw {
        RawNode::Leaf(leaf) => {
            let id = LeafId(*next_id);
            *next_id += 1;
            Ok(AlternativeNode::Leaf(Alternative::new(
                id,
                leaf.original_command,
                leaf.gold,
            )))
        }
        RawNode::And { and } => {
            build_children(challenge, step, "and", and, next_id).map(AlternativeNode::And)
        }
        RawNode::Or { or } => {
            build_children(challenge, step, "or", or, next_id).map(AlternativeNode::Or)
        }
        RawNode::Sequence(items) => {
            build_children(challenge, step, "sequence", items, next_id).map(AlternativeNode::And)
        }
    }
}

fn build_children(
    challenge: &str,
    step: usize,
    kind: &'static str,
    items: Vec<RawNode>,
    next_id: &mut u32,
) -> Result<Vec<AlternativeNode>, DataError> {
    if items.is_empty() {
        return Err(DataError::EmptyCombinator {
            challenge: challenge.to_string(),
            step,
            kind,
        });
    }
    items
        .into_iter()
        .map(|item| build_node(challenge, step, item, next_id))
        .collect()
}
