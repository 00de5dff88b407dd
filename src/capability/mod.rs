//! Pluggable capabilities: the agent under test and the prediction judge.
//!
//! The replay engine is written against the [`Agent`] and [`Comparator`]
//! traits and never against a concrete backend. Production runs wire a
//! model-backed or remote agent together with the LLM judge; tests and dry
//! runs wire mocks and the exact-match judge. Capability failures are
//! transient to the engine: they are retried a bounded number of times and
//! then degrade the current iteration to a non-match.

pub mod agent;
pub mod cache;
pub mod comparator;
pub mod error;
pub mod llm_comparator;
pub mod model_agent;
pub mod remote_agent;

pub use agent::{Agent, AgentContext, MockAgent, Prediction};
pub use cache::{CacheStats, CachedComparator};
pub use comparator::{CandidateLeaf, Comparator, ExactComparator, Verdict, VerdictMap};
pub use error::{AgentError, AgentResult, ComparatorError, ComparatorResult};
pub use llm_comparator::{LlmComparator, LlmComparatorConfig};
pub use model_agent::{ModelAgent, ModelAgentConfig};
pub use remote_agent::RemoteAgent;
