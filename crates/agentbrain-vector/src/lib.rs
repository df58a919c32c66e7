//! AgentBrain vector crate - sentence embeddings and cosine similarity.
//!
//! Provides an embedding service trait with an ONNX Runtime backend and a
//! deterministic mock, plus the similarity helpers used by fallback retrieval.

pub mod embedding;
pub mod similarity;

pub use embedding::{DynEmbeddingService, EmbeddingService, MockEmbedding, OnnxEmbeddingService};
pub use similarity::{cosine_similarity, nearest};
