//! The agent-under-test abstraction.
//!
//! An [`Agent`] is asked, once per iteration, what command it would run next
//! given everything the walkthrough has established so far. Implementations
//! range from a scripted [`MockAgent`] for dry runs and tests to model-backed
//! and remote HTTP agents.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::error::AgentResult;

/// Marker phrase an agent uses to concede a step.
const GIVE_UP_MARKER: &str = "i don't know";

/// Everything an agent is told before predicting the next command.
///
/// The context is serializable because remote agents receive it verbatim as
/// the body of an HTTP request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentContext {
    /// Name of the challenge being replayed.
    pub challenge: String,
    /// Zero-based index of the current step.
    pub step_index: usize,
    /// Goal description of the current step.
    pub description: String,
    /// Commands established by the walkthrough for the preceding steps.
    pub prior_commands: Vec<String>,
    /// Predictions already judged non-matching for this step.
    pub rejected: Vec<String>,
}

impl AgentContext {
    /// One-based step number for prompts and logs.
    pub fn step_number(&self) -> usize {
        self.step_index + 1
    }
}

/// A single predicted command, with optional free-form reasoning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// The shell command the agent would run next.
    pub command: String,
    /// Explanation the agent volunteered alongside the command, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

impl Prediction {
    /// Create a prediction with no rationale.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            rationale: None,
        }
    }

    /// Attach a rationale to this prediction.
    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = Some(rationale.into());
        self
    }

    /// Whether the agent conceded instead of predicting a command.
    ///
    /// Agents signal this by answering "I don't know" (optionally followed by
    /// elaboration). A concession ends the step immediately instead of
    /// burning the remaining iterations.
    pub fn is_give_up(&self) -> bool {
        self.command.trim().to_lowercase().starts_with(GIVE_UP_MARKER)
    }
}

/// Trait for agents under evaluation.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Short name used in logs and reports.
    fn name(&self) -> &str;

    /// Predict the next command for the given step context.
    async fn predict(&self, context: &AgentContext) -> AgentResult<Prediction>;
}

/// A scripted agent for tests and offline dry runs.
///
/// Answers from a fixed script first, then falls back to a default reply.
/// The default construction answers "I don't know" forever, which drives a
/// full pipeline pass without any model traffic.
pub struct MockAgent {
    script: Mutex<Vec<String>>,
    default_reply: String,
    call_count: AtomicUsize,
}

impl MockAgent {
    /// Create a mock that always answers `reply`.
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            script: Mutex::new(Vec::new()),
            default_reply: reply.into(),
            call_count: AtomicUsize::new(0),
        }
    }

    /// Create a mock that answers from `replies` in order, then `fallback`.
    pub fn with_script(replies: Vec<String>, fallback: impl Into<String>) -> Self {
        Self {
            script: Mutex::new(replies),
            default_reply: fallback.into(),
            call_count: AtomicUsize::new(0),
        }
    }

    /// Number of predictions served so far.
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

impl Default for MockAgent {
    fn default() -> Self {
        Self::new("I don't know")
    }
}

#[async_trait]
impl Agent for MockAgent {
    fn name(&self) -> &str {
        "mock"
    }

    async fn predict(&self, _context: &AgentContext) -> AgentResult<Prediction> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        let reply = {
            let mut script = self.script.lock().unwrap_or_else(|e| e.into_inner());
            if script.is_empty() {
                self.default_reply.clone()
            } else {
                script.remove(0)
            }
        };
        Ok(Prediction::new(reply))
    }
}
