use std::sync::atomic::{AtomicI64, Ordering};

/// Gauge metric for point-in-time values.
#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicI64,
}

impl Gauge {
    /// Create a new gauge with value 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the gauge to a specific value.
    pub fn set(&self, value: i64) {
        self.value.store(value, Ordering::Relaxed);
    }

    /// Add to the gauge (may be negative).
    pub fn add(&self, delta: i64) {
        self.value.fetch_add(delta, Ordering::Relaxed);
    }

    /// Get the current gauge value.
    #[must_use]
    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_add() {
        let gauge = Gauge::new();
        gauge.set(10);
        gauge.add(-3);
        assert_eq!(gauge.get(), 7);
    }
}
