//! Importance scoring.
//!
//! Computes the unified importance scalar that drives ranking and eviction.
//! Six weighted factors contribute: recency, access frequency, graph
//! centrality, similarity to recent queries, the user override, and a
//! consolidation boost. The decay schedule in [`decay`] erodes importance
//! for memories that stop being accessed.

pub mod decay;

pub use decay::{DecayAction, daily_decay_factor, recency_factor, recency_half_life_days};

use crate::ports::cosine_similarity;
use crate::types::{ConsolidationStatus, Memory, ScoringConfig, Scope};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

/// Signals about a memory that live outside the memory row itself.
#[derive(Debug, Clone, Default)]
pub struct ScoringContext {
    /// Normalized PageRank of the memory's primary entity, when one exists
    pub centrality: Option<f64>,
    /// Max normalized similarity to recent query embeddings
    pub query_relevance: Option<f64>,
}

/// Weighted-factor importance computation.
#[derive(Debug, Clone)]
pub struct ImportanceScorer {
    config: ScoringConfig,
}

impl ImportanceScorer {
    /// Create a scorer with the given weights.
    #[must_use]
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    /// Compute importance for a memory, clamped into [0, 1].
    #[must_use]
    pub fn compute(&self, memory: &Memory, ctx: &ScoringContext, now: DateTime<Utc>) -> f64 {
        let c = &self.config;

        let recency = decay::recency_factor(memory, now);
        let frequency = 1.0 - (-(memory.usage_count as f64) / c.frequency_saturation).exp();
        let centrality = ctx.centrality.unwrap_or(0.0);
        let relevance = ctx.query_relevance.unwrap_or(0.0);
        let user = memory.user_importance_override.unwrap_or(0.5);
        let consolidation = if memory.consolidation_status == ConsolidationStatus::Consolidated {
            1.0
        } else {
            0.0
        };

        let score = c.recency_weight * recency
            + c.frequency_weight * frequency
            + c.centrality_weight * centrality
            + c.relevance_weight * relevance
            + c.override_weight * user
            + c.consolidation_weight * consolidation;
        score.clamp(0.0, 1.0)
    }
}

/// Ring buffer of recent query embeddings per scope.
///
/// Feeds the query-relevance factor: a memory similar to what the tenant
/// has been asking about lately scores higher.
#[derive(Debug, Default)]
pub struct QueryHistory {
    capacity: usize,
    entries: Mutex<HashMap<Scope, VecDeque<Vec<f32>>>>,
}

impl QueryHistory {
    /// Create a history retaining `capacity` embeddings per scope.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Record a query embedding for a scope.
    pub fn record(&self, scope: &Scope, embedding: Vec<f32>) {
        let mut entries = self.entries.lock();
        let queue = entries.entry(scope.clone()).or_default();
        if queue.len() >= self.capacity {
            queue.pop_front();
        }
        queue.push_back(embedding);
    }

    /// Max similarity of `embedding` to the scope's recent queries,
    /// normalized into [0, 1]. `None` when no history exists.
    #[must_use]
    pub fn max_similarity(&self, scope: &Scope, embedding: &[f32]) -> Option<f64> {
        let entries = self.entries.lock();
        let queue = entries.get(scope)?;
        queue
            .iter()
            .map(|q| f64::from((cosine_similarity(q, embedding) + 1.0) / 2.0))
            .fold(None, |best, s| Some(best.map_or(s, |b: f64| b.max(s))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MemoryDraft;

    fn base_memory() -> Memory {
        MemoryDraft::episodic(Scope::new("t1", "p1"), "content").into_memory(Utc::now())
    }

    #[test]
    fn test_importance_stays_in_unit_interval() {
        let scorer = ImportanceScorer::new(ScoringConfig::default());
        let now = Utc::now();

        let mut memory = base_memory();
        memory.usage_count = 10_000;
        memory.user_importance_override = Some(1.0);
        memory.consolidation_status = ConsolidationStatus::Consolidated;
        let ctx = ScoringContext {
            centrality: Some(1.0),
            query_relevance: Some(1.0),
        };
        let score = scorer.compute(&memory, &ctx, now);
        assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn test_frequency_factor_saturates() {
        let scorer = ImportanceScorer::new(ScoringConfig::default());
        let now = Utc::now();
        let ctx = ScoringContext::default();

        let mut cold = base_memory();
        cold.usage_count = 0;
        let mut warm = base_memory();
        warm.usage_count = 5;
        let mut hot = base_memory();
        hot.usage_count = 500;

        let s_cold = scorer.compute(&cold, &ctx, now);
        let s_warm = scorer.compute(&warm, &ctx, now);
        let s_hot = scorer.compute(&hot, &ctx, now);
        assert!(s_warm > s_cold);
        assert!(s_hot > s_warm);
        // Saturation: the jump from 5 to 500 uses is smaller than 0 to 5.
        assert!(s_hot - s_warm < s_warm - s_cold);
    }

    #[test]
    fn test_consolidation_boost() {
        let scorer = ImportanceScorer::new(ScoringConfig::default());
        let now = Utc::now();
        let ctx = ScoringContext::default();

        let raw = base_memory();
        let mut consolidated = base_memory();
        consolidated.consolidation_status = ConsolidationStatus::Consolidated;
        assert!(scorer.compute(&consolidated, &ctx, now) > scorer.compute(&raw, &ctx, now));
    }

    #[test]
    fn test_query_history_ring() {
        let history = QueryHistory::new(2);
        let scope = Scope::new("t1", "p1");
        history.record(&scope, vec![1.0, 0.0]);
        history.record(&scope, vec![0.0, 1.0]);
        history.record(&scope, vec![-1.0, 0.0]); // evicts the first

        let sim = history.max_similarity(&scope, &[1.0, 0.0]).unwrap();
        // Best remaining match is orthogonal -> normalized 0.5.
        assert!((sim - 0.5).abs() < 1e-6);

        assert!(
            history
                .max_similarity(&Scope::new("t2", "p1"), &[1.0, 0.0])
                .is_none()
        );
    }
}
