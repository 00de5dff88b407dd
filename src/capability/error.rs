//! Error types for the pluggable capabilities.
//!
//! Agent and comparator failures are treated as transient: the step
//! evaluator retries them a bounded number of times and then degrades the
//! iteration to a non-match. Nothing in this module escapes a challenge run.

use thiserror::Error;

/// Errors that can occur while asking an agent for a prediction.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The agent could not be reached or refused to answer.
    #[error("Agent unavailable: {0}")]
    Unavailable(String),

    /// Error from the LLM provider backing a model agent.
    #[error("LLM error: {0}")]
    Llm(String),

    /// The agent did not answer within the configured budget.
    #[error("Agent timed out after {seconds} seconds")]
    Timeout { seconds: u64 },
}

impl From<crate::error::LlmError> for AgentError {
    fn from(err: crate::error::LlmError) -> Self {
        AgentError::Llm(err.to_string())
    }
}

/// Errors that can occur while judging a prediction.
#[derive(Debug, Error)]
pub enum ComparatorError {
    /// Error from the LLM provider backing the judge.
    #[error("LLM error: {0}")]
    Llm(String),

    /// The judge replied, but nothing usable could be parsed out of it.
    #[error("Unusable judge verdict: {0}")]
    InvalidVerdict(String),

    /// The judge did not answer within the configured budget.
    #[error("Comparator timed out after {seconds} seconds")]
    Timeout { seconds: u64 },
}

impl From<crate::error::LlmError> for ComparatorError {
    fn from(err: crate::error::LlmError) -> Self {
        ComparatorError::Llm(err.to_string())
    }
}

/// Result type alias for agent operations.
pub type AgentResult<T> = Result<T, AgentError>;

/// Result type alias for comparator operations.
pub type ComparatorResult<T> = Result<T, ComparatorError>;
