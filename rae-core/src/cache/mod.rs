//! Context cache for retrieval results.
//!
//! Memoizes expensive retrieval pipelines per fingerprint with LRU eviction
//! and TTL expiry. Entries are tenant-scoped for invalidation, and the
//! cache never fails a request: callers treat any anomaly as a miss.
//!
//! ## Example
//!
//! ```
//! use rae_core::cache::{ContextCache, fingerprint};
//! use rae_core::types::{CacheConfig, Scope, SearchFilters};
//!
//! let cache: ContextCache<String> = ContextCache::new(CacheConfig::default());
//! let scope = Scope::new("t1", "p1");
//! let key = fingerprint::fingerprint(&scope, "dark mode", &SearchFilters::default(), 0, 1);
//!
//! assert!(cache.get(&key).is_none());
//! cache.put_if_absent(key, &scope, "result".to_string(), None);
//! assert_eq!(cache.get(&key).as_deref(), Some("result"));
//!
//! cache.invalidate(&scope.tenant_id, Some(&scope.project_id));
//! assert!(cache.get(&key).is_none());
//! ```

pub mod fingerprint;

pub use fingerprint::{Fingerprint, TIME_BUCKET_SECS};

use crate::types::{CacheConfig, Scope};
use lru::LruCache;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

/// Cached value with scope and expiry.
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    scope: Scope,
    value: V,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Cache statistics for monitoring.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    /// Total cache hits
    pub hits: u64,
    /// Total cache misses
    pub misses: u64,
    /// Entries removed by LRU pressure or expiry
    pub evictions: u64,
    /// Entries removed by scoped invalidation
    pub invalidations: u64,
    /// Current entry count
    pub size: usize,
    /// Configured capacity
    pub capacity: usize,
}

impl CacheStats {
    /// Hit rate in [0, 1].
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Estimated spend avoided by cache hits, given the mean cost of an LLM
    /// call over the same window.
    #[must_use]
    pub fn savings_usd(&self, avg_cost_per_llm_call: f64) -> f64 {
        self.hits as f64 * avg_cost_per_llm_call.max(0.0)
    }
}

/// Fingerprint-keyed cache with LRU eviction, TTL expiry, and tenant-scoped
/// invalidation.
pub struct ContextCache<V> {
    entries: RwLock<LruCache<Fingerprint, CacheEntry<V>>>,
    stats: RwLock<CacheStats>,
    config: CacheConfig,
}

impl<V: Clone> ContextCache<V> {
    /// Create a cache with the given configuration.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.capacity.max(1))
            .unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: RwLock::new(LruCache::new(capacity)),
            stats: RwLock::new(CacheStats {
                capacity: capacity.get(),
                ..CacheStats::default()
            }),
            config,
        }
    }

    /// Fetch a live entry. Expired entries are removed on access and count
    /// as misses.
    #[must_use]
    pub fn get(&self, key: &Fingerprint) -> Option<V> {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let mut stats = self.stats.write();

        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.pop(key);
                stats.misses += 1;
                stats.evictions += 1;
                stats.size = entries.len();
                None
            }
            Some(entry) => {
                stats.hits += 1;
                Some(entry.value.clone())
            }
            None => {
                stats.misses += 1;
                None
            }
        }
    }

    /// Store a value unless a live entry already exists.
    ///
    /// A second identical request racing the first does not double-store.
    /// Returns `true` when the value was stored.
    pub fn put_if_absent(
        &self,
        key: Fingerprint,
        scope: &Scope,
        value: V,
        ttl: Option<Duration>,
    ) -> bool {
        let now = Instant::now();
        let ttl = ttl.unwrap_or(self.config.default_ttl);
        let mut entries = self.entries.write();
        let mut stats = self.stats.write();

        if let Some(existing) = entries.peek(&key) {
            if !existing.is_expired(now) {
                return false;
            }
        }

        if entries.len() >= stats.capacity && !entries.contains(&key) {
            stats.evictions += 1;
        }
        entries.put(
            key,
            CacheEntry {
                scope: scope.clone(),
                value,
                expires_at: now + ttl,
            },
        );
        stats.size = entries.len();
        true
    }

    /// TTL used for empty (negative) results.
    #[must_use]
    pub fn negative_ttl(&self) -> Duration {
        self.config.negative_ttl
    }

    /// Pipeline version mixed into fingerprints.
    #[must_use]
    pub fn pipeline_version(&self) -> u32 {
        self.config.pipeline_version
    }

    /// Remove all entries for a tenant, or for one project within it.
    ///
    /// Synchronous: when this returns, no subsequent `get` can observe a
    /// removed entry. Returns the number of entries removed.
    pub fn invalidate(&self, tenant_id: &str, project_id: Option<&str>) -> usize {
        let mut entries = self.entries.write();
        let mut stats = self.stats.write();

        let doomed: Vec<Fingerprint> = entries
            .iter()
            .filter(|(_, entry)| {
                entry.scope.tenant_id == tenant_id
                    && project_id.is_none_or(|p| entry.scope.project_id == p)
            })
            .map(|(key, _)| *key)
            .collect();
        for key in &doomed {
            entries.pop(key);
        }
        stats.invalidations += doomed.len() as u64;
        stats.size = entries.len();
        doomed.len()
    }

    /// Drop every entry regardless of scope. Used by full cache rebuilds.
    pub fn clear(&self) -> usize {
        let mut entries = self.entries.write();
        let mut stats = self.stats.write();
        let removed = entries.len();
        entries.clear();
        stats.invalidations += removed as u64;
        stats.size = 0;
        removed
    }

    /// Remove every expired entry. Called by the cache sweeper; expiry also
    /// happens lazily on access. Returns the number removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let mut stats = self.stats.write();

        let doomed: Vec<Fingerprint> = entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| *key)
            .collect();
        for key in &doomed {
            entries.pop(key);
        }
        stats.evictions += doomed.len() as u64;
        stats.size = entries.len();
        doomed.len()
    }

    /// Current statistics snapshot.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.stats.read().clone()
    }

    /// Current entry count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SearchFilters;

    fn cache() -> ContextCache<String> {
        ContextCache::new(CacheConfig::default())
    }

    fn key_for(scope: &Scope, query: &str, bucket: i64) -> Fingerprint {
        fingerprint::fingerprint(scope, query, &SearchFilters::default(), bucket * 60, 1)
    }

    #[test]
    fn test_hit_and_miss_accounting() {
        let cache = cache();
        let scope = Scope::new("t1", "p1");
        let key = key_for(&scope, "q", 0);

        assert!(cache.get(&key).is_none());
        assert!(cache.put_if_absent(key, &scope, "v".to_string(), None));
        assert_eq!(cache.get(&key).as_deref(), Some("v"));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_put_if_absent_does_not_overwrite_live_entry() {
        let cache = cache();
        let scope = Scope::new("t1", "p1");
        let key = key_for(&scope, "q", 0);

        assert!(cache.put_if_absent(key, &scope, "first".to_string(), None));
        assert!(!cache.put_if_absent(key, &scope, "second".to_string(), None));
        assert_eq!(cache.get(&key).as_deref(), Some("first"));
    }

    #[test]
    fn test_expired_entry_is_a_miss() {
        let cache = cache();
        let scope = Scope::new("t1", "p1");
        let key = key_for(&scope, "q", 0);

        cache.put_if_absent(key, &scope, "v".to_string(), Some(Duration::ZERO));
        assert!(cache.get(&key).is_none());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_scoped_invalidation() {
        let cache = cache();
        let p1 = Scope::new("t1", "p1");
        let p2 = Scope::new("t1", "p2");
        let other = Scope::new("t2", "p1");
        let k1 = key_for(&p1, "q", 0);
        let k2 = key_for(&p2, "q", 0);
        let k3 = key_for(&other, "q", 0);

        cache.put_if_absent(k1, &p1, "a".to_string(), None);
        cache.put_if_absent(k2, &p2, "b".to_string(), None);
        cache.put_if_absent(k3, &other, "c".to_string(), None);

        assert_eq!(cache.invalidate("t1", Some("p1")), 1);
        assert!(cache.get(&k1).is_none());
        assert!(cache.get(&k2).is_some());

        assert_eq!(cache.invalidate("t1", None), 1);
        assert!(cache.get(&k2).is_none());
        assert!(cache.get(&k3).is_some());
    }

    #[test]
    fn test_sweep_expired_removes_only_dead_entries() {
        let cache = cache();
        let scope = Scope::new("t1", "p1");
        let dead = key_for(&scope, "dead", 0);
        let live = key_for(&scope, "live", 0);

        cache.put_if_absent(dead, &scope, "x".to_string(), Some(Duration::ZERO));
        cache.put_if_absent(live, &scope, "y".to_string(), None);

        assert_eq!(cache.sweep_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&live).is_some());
    }

    #[test]
    fn test_savings_accounting() {
        let stats = CacheStats {
            hits: 10,
            ..CacheStats::default()
        };
        assert!((stats.savings_usd(0.02) - 0.2).abs() < 1e-9);
        assert!(stats.savings_usd(-1.0).abs() < f64::EPSILON);
    }
}
