//! Abstract ports to external collaborators.
//!
//! The engine consumes providers and the vector index through these traits
//! only; concrete implementations (HTTP providers, hosted vector stores)
//! live outside the core.

mod embedding;
mod llm;
mod reranker;
mod vector;

pub use embedding::{EmbeddingProvider, cosine_similarity};
pub use llm::{Completion, CompletionRequest, LlmProvider, estimate_tokens};
pub use reranker::{RerankCandidate, Reranker};
pub use vector::{VectorFilter, VectorIndex, VectorMatch, VectorPayload, normalize_cosine};
