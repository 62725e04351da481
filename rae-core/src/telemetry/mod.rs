//! In-process metrics.
//!
//! Lightweight counters and gauges the engine bumps on cache hits,
//! extraction failures, sweeper runs, and orchestrated tasks. Snapshots are
//! point-in-time copies suitable for logging or export by an enclosing
//! service.
//!
//! ## Example
//!
//! ```
//! use rae_core::telemetry::Telemetry;
//!
//! let telemetry = Telemetry::new();
//! telemetry.counter("search_cache_hits").increment();
//! telemetry.gauge("cache_size").set(42);
//!
//! let summary = telemetry.summary();
//! assert_eq!(summary.counters["search_cache_hits"], 1);
//! ```

mod counter;
mod gauge;

pub use counter::Counter;
pub use gauge::Gauge;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Point-in-time copy of all metrics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetrySummary {
    /// Counter values by name
    pub counters: BTreeMap<String, u64>,
    /// Gauge values by name
    pub gauges: BTreeMap<String, i64>,
}

/// Thread-safe metric registry.
#[derive(Clone, Default)]
pub struct Telemetry {
    counters: Arc<RwLock<HashMap<String, Arc<Counter>>>>,
    gauges: Arc<RwLock<HashMap<String, Arc<Gauge>>>>,
}

impl Telemetry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create a counter.
    #[must_use]
    pub fn counter(&self, name: &str) -> Arc<Counter> {
        if let Some(counter) = self.counters.read().get(name) {
            return Arc::clone(counter);
        }
        let mut counters = self.counters.write();
        Arc::clone(
            counters
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Counter::new())),
        )
    }

    /// Get or create a gauge.
    #[must_use]
    pub fn gauge(&self, name: &str) -> Arc<Gauge> {
        if let Some(gauge) = self.gauges.read().get(name) {
            return Arc::clone(gauge);
        }
        let mut gauges = self.gauges.write();
        Arc::clone(
            gauges
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Gauge::new())),
        )
    }

    /// Snapshot every metric.
    #[must_use]
    pub fn summary(&self) -> TelemetrySummary {
        let counters = self
            .counters
            .read()
            .iter()
            .map(|(name, counter)| (name.clone(), counter.get()))
            .collect();
        let gauges = self
            .gauges
            .read()
            .iter()
            .map(|(name, gauge)| (name.clone(), gauge.get()))
            .collect();
        TelemetrySummary { counters, gauges }
    }
}

impl std::fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Telemetry")
            .field("counters", &self.counters.read().len())
            .field("gauges", &self.gauges.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_registry_shares_instances() {
        let telemetry = Telemetry::new();
        telemetry.counter("ops").increment();
        telemetry.counter("ops").increment_by(2);
        assert_eq!(telemetry.counter("ops").get(), 3);
    }

    #[test]
    fn test_summary_snapshot() {
        let telemetry = Telemetry::new();
        telemetry.counter("hits").increment();
        telemetry.gauge("size").set(7);

        let summary = telemetry.summary();
        assert_eq!(summary.counters["hits"], 1);
        assert_eq!(summary.gauges["size"], 7);
    }
}
