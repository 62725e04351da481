//! Score normalization, fusion, and deterministic ranking.

use super::types::{Strategy, StrategyWeights};
use crate::scoring;
use crate::types::Memory;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// Raw candidates from one strategy.
#[derive(Debug, Clone)]
pub struct CandidateSet {
    /// The producing strategy
    pub strategy: Strategy,
    /// `(memory_id, raw_score)` pairs; higher raw scores are better
    pub scored: Vec<(Uuid, f64)>,
}

/// Per-memory fused score with strategy breakdown.
#[derive(Debug, Clone, Default)]
pub struct FusedScore {
    /// Weighted sum of normalized strategy scores
    pub fused: f64,
    /// Normalized score per contributing strategy
    pub per_strategy: BTreeMap<String, f64>,
}

/// Min-max normalize raw scores within one candidate set into [0, 1].
///
/// A set with one candidate, or with all scores equal, normalizes to 1.0
/// for each member. Empty sets stay empty.
#[must_use]
pub fn normalize(scored: &[(Uuid, f64)]) -> Vec<(Uuid, f64)> {
    if scored.is_empty() {
        return Vec::new();
    }
    let min = scored.iter().map(|(_, s)| *s).fold(f64::INFINITY, f64::min);
    let max = scored
        .iter()
        .map(|(_, s)| *s)
        .fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    scored
        .iter()
        .map(|(id, s)| {
            let normalized = if range <= f64::EPSILON {
                1.0
            } else {
                (s - min) / range
            };
            (*id, normalized)
        })
        .collect()
}

/// Fuse per-strategy candidates into one score per memory.
///
/// `fused = Σ_s weights[s] * normalized[s, memory]`; a strategy that did
/// not return a memory contributes 0. If the same strategy scored a memory
/// more than once, the highest score wins.
#[must_use]
pub fn fuse(candidates: &[CandidateSet], weights: &StrategyWeights) -> HashMap<Uuid, FusedScore> {
    let mut fused: HashMap<Uuid, FusedScore> = HashMap::new();
    for set in candidates {
        let weight = weights.for_strategy(set.strategy);
        for (id, normalized) in normalize(&set.scored) {
            let entry = fused.entry(id).or_default();
            let slot = entry
                .per_strategy
                .entry(set.strategy.name().to_string())
                .or_insert(0.0);
            if normalized > *slot {
                entry.fused += weight * (normalized - *slot);
                *slot = normalized;
            }
        }
    }
    fused
}

/// Final ranking score: `alpha * fused + beta * importance +
/// gamma * recency_factor`.
#[must_use]
pub fn modulate(
    fused: f64,
    memory: &Memory,
    now: DateTime<Utc>,
    alpha: f64,
    beta: f64,
    gamma: f64,
) -> f64 {
    alpha * fused + beta * memory.importance + gamma * scoring::recency_factor(memory, now)
}

/// Sort ranked results best-first with the deterministic tie-break:
/// higher final score, then higher importance, then newer `created_at`,
/// then lexicographic id.
pub fn rank(results: &mut [(Memory, f64, FusedScore)]) {
    results.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                b.0.importance
                    .partial_cmp(&a.0.importance)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| b.0.created_at.cmp(&a.0.created_at))
            .then_with(|| a.0.id.to_string().cmp(&b.0.id.to_string()))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MemoryDraft, Scope};

    fn memory_with(importance: f64, created_offset_secs: i64, id: Uuid) -> Memory {
        let now = Utc::now();
        let mut draft = MemoryDraft::episodic(Scope::new("t1", "p1"), "content");
        draft.id = Some(id);
        let mut memory = draft.into_memory(now);
        memory.importance = importance;
        memory.created_at = now - chrono::Duration::seconds(created_offset_secs);
        memory
    }

    #[test]
    fn test_normalize_min_max() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let normalized = normalize(&[(a, 10.0), (b, 20.0), (c, 15.0)]);
        let by_id: HashMap<Uuid, f64> = normalized.into_iter().collect();
        assert!(by_id[&a].abs() < 1e-9);
        assert!((by_id[&b] - 1.0).abs() < 1e-9);
        assert!((by_id[&c] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_normalize_uniform_scores() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let normalized = normalize(&[(a, 0.3), (b, 0.3)]);
        assert!(normalized.iter().all(|(_, s)| (s - 1.0).abs() < 1e-9));
    }

    #[test]
    fn test_fuse_weights_missing_strategy_as_zero() {
        let shared = Uuid::new_v4();
        let vector_only = Uuid::new_v4();
        let weights = StrategyWeights::new(0.5, 0.0, 0.0, 0.5);
        let candidates = vec![
            CandidateSet {
                strategy: Strategy::Vector,
                scored: vec![(shared, 1.0), (vector_only, 0.0)],
            },
            CandidateSet {
                strategy: Strategy::Fulltext,
                scored: vec![(shared, 5.0)],
            },
        ];

        let fused = fuse(&candidates, &weights);
        // shared: 0.5 * 1.0 (vector max) + 0.5 * 1.0 (single fulltext candidate)
        assert!((fused[&shared].fused - 1.0).abs() < 1e-9);
        // vector_only: min of the vector set -> normalized 0, no fulltext
        assert!(fused[&vector_only].fused.abs() < 1e-9);
        assert_eq!(fused[&shared].per_strategy.len(), 2);
    }

    #[test]
    fn test_rank_tie_breaks() {
        let id_a = Uuid::parse_str("aaaaaaaa-0000-0000-0000-000000000000").unwrap();
        let id_b = Uuid::parse_str("bbbbbbbb-0000-0000-0000-000000000000").unwrap();

        // Same score, same importance, same created_at: id order decides.
        let m1 = memory_with(0.5, 100, id_b);
        let mut m2 = memory_with(0.5, 100, id_a);
        m2.created_at = m1.created_at;

        let mut results = vec![
            (m1, 0.9, FusedScore::default()),
            (m2, 0.9, FusedScore::default()),
        ];
        rank(&mut results);
        assert_eq!(results[0].0.id, id_a);

        // Higher importance wins at equal score.
        let mut results = vec![
            (memory_with(0.2, 100, id_a), 0.9, FusedScore::default()),
            (memory_with(0.8, 100, id_b), 0.9, FusedScore::default()),
        ];
        rank(&mut results);
        assert_eq!(results[0].0.id, id_b);

        // Newer creation wins at equal score and importance.
        let mut results = vec![
            (memory_with(0.5, 1_000, id_a), 0.9, FusedScore::default()),
            (memory_with(0.5, 10, id_b), 0.9, FusedScore::default()),
        ];
        rank(&mut results);
        assert_eq!(results[0].0.id, id_b);
    }

    #[test]
    fn test_modulate_combines_components() {
        let memory = memory_with(1.0, 0, Uuid::new_v4());
        let now = Utc::now();
        let score = modulate(1.0, &memory, now, 0.7, 0.2, 0.1);
        // Fresh memory: recency factor ~= 1.0.
        assert!((score - 1.0).abs() < 0.01);
    }
}
