//! Cross-encoder reranker port.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One candidate handed to the reranker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankCandidate {
    /// Memory identifier
    pub id: Uuid,
    /// Candidate text (memory content)
    pub text: String,
    /// Original retrieval score; used for tie-breaking
    pub score: f64,
}

/// Cross-encoder relevance reranker.
///
/// Returns the top-k candidates in descending relevance, preserving
/// candidate metadata. Ties are broken by the candidate's original score.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Rerank `candidates` against `query` and return the top `k`.
    async fn rerank(
        &self,
        query: &str,
        candidates: Vec<RerankCandidate>,
        k: usize,
    ) -> Result<Vec<RerankCandidate>>;
}
