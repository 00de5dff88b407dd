//! Error types for ctf-replay operations.
//!
//! Defines error types for the major subsystems:
//! - Challenge data loading and validation
//! - Engine configuration
//! - LLM API interactions
//! - Run-level orchestration
//!
//! Capability failures (agent and comparator) live in
//! [`crate::capability::error`] because they are absorbed inside the
//! per-step evaluation loop and never propagate to run callers.

use thiserror::Error;

/// Errors raised while loading or validating challenge walkthrough data.
///
/// These are fatal: a malformed challenge aborts the run before any step
/// executes.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("Challenge '{0}' not found")]
    ChallengeNotFound(String),

    #[error("Challenge data directory does not exist: {0}")]
    DirectoryNotFound(String),

    #[error("No challenges found under {0}")]
    NoChallenges(String),

    #[error("Failed to parse challenge file '{path}': {message}")]
    ParseError { path: String, message: String },

    #[error("Step {step} of challenge '{challenge}' has an empty '{kind}' group")]
    EmptyCombinator {
        challenge: String,
        step: usize,
        kind: &'static str,
    },

    #[error("Step {step} of challenge '{challenge}' has no alternatives")]
    EmptyStep { challenge: String, step: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by invalid engine configuration.
///
/// Fatal at startup: the engine refuses to run with a configuration that
/// would make its guarantees meaningless.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Iteration budget must be at least 1")]
    ZeroIterationBudget,

    #[error("Non-gold credit must be strictly between 0 and 1, got {0}")]
    NongoldCreditOutOfRange(f64),

    #[error("Batch concurrency must be at least 1")]
    ZeroConcurrency,

    #[error("Capability timeout must be non-zero")]
    ZeroTimeout,

    #[error("Cannot score a challenge with zero steps")]
    NoSteps,
}

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API key: LITELLM_API_KEY environment variable not set")]
    MissingApiKey,

    #[error("Missing API base URL: LITELLM_API_BASE environment variable not set")]
    MissingApiBase,

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },
}

/// Run-level errors surfaced by the orchestrator.
///
/// Only `Data` and `Config` (and an explicit caller `Cancelled`) ever reach
/// the caller of a run; transient capability failures are handled inside the
/// step loop and degrade the score instead.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Run cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for run-level operations.
pub type EngineResult<T> = Result<T, EngineError>;
