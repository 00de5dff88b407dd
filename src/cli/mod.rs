//! Command-line interface for ctf-replay.
//!
//! Provides commands for replaying challenge walkthroughs against an agent
//! and for listing the available challenge data.

mod commands;

pub use commands::{parse_cli, run, run_with_cli};
