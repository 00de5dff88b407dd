//! LLM integration for the replay engine.
//!
//! Two capabilities sit on top of this module: the model-backed agent that
//! predicts commands, and the judge comparator that decides whether a
//! prediction matches an expected alternative. Both talk to an
//! OpenAI-compatible chat-completions endpoint through [`LlmProvider`], so
//! tests can swap in scripted providers without touching the network.
//!
//! ```ignore
//! use ctf_replay::llm::{GenerationRequest, LiteLlmClient, LlmProvider, Message};
//!
//! let client = LiteLlmClient::from_env()?;
//! let request = GenerationRequest::new(
//!     "anthropic/claude-opus-4.5",
//!     vec![Message::system("You are a penetration tester."),
//!          Message::user("What is the next command?")],
//! );
//! let response = client.generate(request).await?;
//! ```

pub mod json;
pub mod litellm;

pub use json::extract_json_object;
pub use litellm::{
    Choice, GenerationRequest, GenerationResponse, LiteLlmClient, LlmProvider, Message, Usage,
};
