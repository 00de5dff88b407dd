//! ctf-replay: Walkthrough replay evaluator for CTF security assessments.
//!
//! This library replays recorded challenge walkthroughs step-by-step against
//! an agent under test, judges each predicted command against the recorded
//! alternatives, and scores the run.

// Core modules
pub mod capability;
pub mod challenge;
pub mod cli;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod llm;

// Re-export commonly used error types
pub use error::{ConfigError, DataError, EngineError, LlmError};
