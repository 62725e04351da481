//! Time-decay schedule and recency factors.

use crate::types::{ConsolidationStatus, Memory, ScoringConfig};
use chrono::{DateTime, Utc};

/// Recency half-life in days for a memory, by access staleness.
///
/// Memories accessed recently decay on a 30-day half-life; after 30 days
/// without access the half-life tightens to 7 days, and after 60 days to 3.
#[must_use]
pub fn recency_half_life_days(days_since_access: f64) -> f64 {
    if days_since_access > 60.0 {
        3.0
    } else if days_since_access > 30.0 {
        7.0
    } else {
        30.0
    }
}

/// Recency factor `exp(-age_days / half_life)` in (0, 1].
#[must_use]
pub fn recency_factor(memory: &Memory, now: DateTime<Utc>) -> f64 {
    let half_life = recency_half_life_days(memory.days_since_access(now));
    (-memory.age_days(now) / half_life).exp()
}

/// Per-day multiplicative decay factor for a memory's importance, by days
/// since last access. `None` means no decay applies.
#[must_use]
pub fn daily_decay_factor(days_since_access: f64) -> Option<f64> {
    if days_since_access <= 7.0 {
        None
    } else if days_since_access <= 30.0 {
        Some(0.995)
    } else if days_since_access <= 60.0 {
        Some(0.99)
    } else {
        Some(0.98)
    }
}

/// Outcome of one decay evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum DecayAction {
    /// Leave the memory untouched
    None,
    /// Write this importance value
    Decay(f64),
    /// Mark the memory archived
    Archive,
}

/// Evaluate the decay schedule for one memory.
///
/// `days_elapsed` is the time since the previous sweep, so intermittent
/// sweeps apply the per-day factor the right number of times. A
/// user-provided importance override disables decay entirely. Memories
/// whose importance has fallen below the archive threshold and whose age
/// exceeds the archive age are archived instead of decayed further.
#[must_use]
pub fn evaluate(
    memory: &Memory,
    now: DateTime<Utc>,
    days_elapsed: f64,
    config: &ScoringConfig,
) -> DecayAction {
    if memory.user_importance_override.is_some()
        || memory.consolidation_status == ConsolidationStatus::Archived
    {
        return DecayAction::None;
    }

    if memory.importance < config.archive_importance_threshold
        && memory.age_days(now) > config.archive_age_days
    {
        return DecayAction::Archive;
    }

    match daily_decay_factor(memory.days_since_access(now)) {
        None => DecayAction::None,
        Some(factor) => {
            let decayed = memory.importance * factor.powf(days_elapsed.max(0.0));
            if (memory.importance - decayed).abs() < 1e-12 {
                DecayAction::None
            } else {
                DecayAction::Decay(decayed.clamp(0.0, 1.0))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MemoryDraft, Scope};

    fn memory(age_days: i64, access_days: i64, importance: f64) -> Memory {
        let now = Utc::now();
        let mut memory =
            MemoryDraft::episodic(Scope::new("t1", "p1"), "content").into_memory(now);
        memory.created_at = now - chrono::Duration::days(age_days);
        memory.last_accessed_at = now - chrono::Duration::days(access_days);
        memory.importance = importance;
        memory
    }

    #[test]
    fn test_half_life_ladder() {
        assert!((recency_half_life_days(1.0) - 30.0).abs() < f64::EPSILON);
        assert!((recency_half_life_days(45.0) - 7.0).abs() < f64::EPSILON);
        assert!((recency_half_life_days(90.0) - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_no_decay_within_seven_days() {
        let config = ScoringConfig::default();
        let m = memory(20, 3, 0.8);
        assert_eq!(evaluate(&m, Utc::now(), 1.0, &config), DecayAction::None);
    }

    #[test]
    fn test_decay_bands() {
        let config = ScoringConfig::default();
        let now = Utc::now();

        let m = memory(20, 10, 0.8);
        match evaluate(&m, now, 1.0, &config) {
            DecayAction::Decay(v) => assert!((v - 0.8 * 0.995).abs() < 1e-9),
            other => panic!("expected decay, got {other:?}"),
        }

        let m = memory(90, 45, 0.8);
        match evaluate(&m, now, 2.0, &config) {
            DecayAction::Decay(v) => assert!((v - 0.8 * 0.99f64.powi(2)).abs() < 1e-9),
            other => panic!("expected decay, got {other:?}"),
        }

        let m = memory(120, 70, 0.8);
        match evaluate(&m, now, 1.0, &config) {
            DecayAction::Decay(v) => assert!((v - 0.8 * 0.98).abs() < 1e-9),
            other => panic!("expected decay, got {other:?}"),
        }
    }

    #[test]
    fn test_override_disables_decay() {
        let config = ScoringConfig::default();
        let mut m = memory(120, 70, 0.8);
        m.user_importance_override = Some(0.9);
        assert_eq!(evaluate(&m, Utc::now(), 1.0, &config), DecayAction::None);
    }

    #[test]
    fn test_archive_rule() {
        let config = ScoringConfig::default();
        let m = memory(100, 95, 0.01);
        assert_eq!(evaluate(&m, Utc::now(), 1.0, &config), DecayAction::Archive);

        // Young memories stay even at low importance.
        let m = memory(10, 9, 0.01);
        assert_ne!(evaluate(&m, Utc::now(), 1.0, &config), DecayAction::Archive);
    }

    #[test]
    fn test_recency_factor_monotone_in_age() {
        let now = Utc::now();
        let young = memory(1, 0, 0.5);
        let old = memory(40, 0, 0.5);
        assert!(recency_factor(&young, now) > recency_factor(&old, now));
    }
}
