//! Challenge data model: walkthroughs, steps, and their alternative trees.

pub mod loader;
pub mod model;
pub mod tree;

pub use loader::{discover_challenges, load_challenge, load_challenges, ChallengeSelector, STEPS_FILE};
pub use model::{Challenge, Step};
pub use tree::{Alternative, AlternativeNode, LeafId};
