//! Vector index port.

use crate::error::Result;
use crate::types::{MemoryLayer, Scope};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Payload stored alongside each vector to permit pre-filtering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorPayload {
    /// Layer of the backing memory
    pub layer: MemoryLayer,
    /// Tags of the backing memory
    pub tags: Vec<String>,
    /// Creation time of the backing memory
    pub created_at: DateTime<Utc>,
}

/// Pre-filter applied inside the index before scoring.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VectorFilter {
    /// Restrict to these layers (empty = all)
    pub layers: Vec<MemoryLayer>,
    /// Require all of these tags
    pub tags: Vec<String>,
}

impl VectorFilter {
    /// Whether a payload passes this filter.
    #[must_use]
    pub fn matches(&self, payload: &VectorPayload) -> bool {
        if !self.layers.is_empty() && !self.layers.contains(&payload.layer) {
            return false;
        }
        self.tags.iter().all(|t| payload.tags.contains(t))
    }
}

/// One similarity match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorMatch {
    /// Memory identifier
    pub id: Uuid,
    /// Cosine similarity in [-1, 1]
    pub score: f64,
    /// Echoed payload
    pub payload: VectorPayload,
}

/// Similarity search plus persistence of embeddings.
///
/// Results are returned in descending score; ties are broken by
/// `created_at DESC`.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace the vector for `id`.
    async fn upsert(
        &self,
        scope: &Scope,
        id: Uuid,
        vector: &[f32],
        payload: &VectorPayload,
    ) -> Result<()>;

    /// Return the `k` nearest vectors passing `filter`.
    async fn search(
        &self,
        scope: &Scope,
        query: &[f32],
        k: usize,
        filter: &VectorFilter,
    ) -> Result<Vec<VectorMatch>>;

    /// Delete the vector for `id`. Returns `true` when a vector existed.
    async fn delete(&self, scope: &Scope, id: Uuid) -> Result<bool>;

    /// Cheap connectivity check used by readiness probes.
    async fn probe(&self) -> Result<()>;
}

/// Normalize a cosine similarity from [-1, 1] into [0, 1].
#[must_use]
pub fn normalize_cosine(score: f64) -> f64 {
    ((score + 1.0) / 2.0).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_cosine_range() {
        assert!((normalize_cosine(1.0) - 1.0).abs() < 1e-9);
        assert!((normalize_cosine(-1.0)).abs() < 1e-9);
        assert!((normalize_cosine(0.0) - 0.5).abs() < 1e-9);
        assert!((normalize_cosine(7.0) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_filter_matches_layers_and_tags() {
        let payload = VectorPayload {
            layer: MemoryLayer::Episodic,
            tags: vec!["ui".to_string(), "prefs".to_string()],
            created_at: Utc::now(),
        };
        let mut filter = VectorFilter::default();
        assert!(filter.matches(&payload));

        filter.layers = vec![MemoryLayer::Semantic];
        assert!(!filter.matches(&payload));

        filter.layers = vec![MemoryLayer::Episodic];
        filter.tags = vec!["prefs".to_string()];
        assert!(filter.matches(&payload));

        filter.tags = vec!["missing".to_string()];
        assert!(!filter.matches(&payload));
    }
}
