//! Dual-stage conversational answering for AgentBrain.
//!
//! A knowledge-grounded primary stage answers first; a constrained second
//! stage rephrases that answer. When the second stage cannot reach the
//! generation service, the answer to the most similar past question is
//! returned instead.

pub mod error;
pub mod fallback;
pub mod generation;
pub mod orchestrator;
pub mod pairs;
pub mod prompt;

pub use error::ChatError;
pub use fallback::{FallbackMatch, FallbackRetriever, FALLBACK_APOLOGY};
pub use generation::{
    GenerationError, GenerationRequest, GenerationService, MockGeneration, OpenAiGenerationService,
};
pub use orchestrator::{DualStageOrchestrator, TurnSettings, PRIMARY_UNAVAILABLE};
pub use pairs::{extract_pairs, PairingPolicy};
