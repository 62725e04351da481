//! Retrieval filters shared by search requests and cache fingerprints.

use super::memory::MemoryLayer;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Filters attached to a retrieval request.
///
/// Canonicalization (sorting, dropping empties) happens at fingerprint
/// time; callers may pass tags and metadata in any order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilters {
    /// Require all of these tags
    pub tags: Vec<String>,
    /// Restrict to these layers (empty = all)
    pub layers: Vec<MemoryLayer>,
    /// Restrict to this source tag
    pub source: Option<String>,
    /// Free-form key/value constraints
    pub metadata: BTreeMap<String, String>,
}

impl SearchFilters {
    /// Whether no filter dimension is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
            && self.layers.is_empty()
            && self.source.is_none()
            && self.metadata.is_empty()
    }

    /// Deterministic rendering used by the cache fingerprint: tags sorted,
    /// map keys sorted, null/empty values dropped.
    #[must_use]
    pub fn canonical(&self) -> String {
        let mut tags: Vec<&str> = self
            .tags
            .iter()
            .map(String::as_str)
            .filter(|t| !t.trim().is_empty())
            .collect();
        tags.sort_unstable();
        tags.dedup();

        let mut layers: Vec<String> = self.layers.iter().map(ToString::to_string).collect();
        layers.sort_unstable();
        layers.dedup();

        let mut parts = Vec::new();
        if !tags.is_empty() {
            parts.push(format!("tags={}", tags.join(",")));
        }
        if !layers.is_empty() {
            parts.push(format!("layers={}", layers.join(",")));
        }
        if let Some(source) = self.source.as_deref() {
            if !source.trim().is_empty() {
                parts.push(format!("source={source}"));
            }
        }
        for (key, value) in &self.metadata {
            if !key.trim().is_empty() && !value.trim().is_empty() {
                parts.push(format!("meta.{key}={value}"));
            }
        }
        parts.join(";")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_sorts_and_dedups_tags() {
        let a = SearchFilters {
            tags: vec!["b".to_string(), "a".to_string(), "a".to_string()],
            ..SearchFilters::default()
        };
        let b = SearchFilters {
            tags: vec!["a".to_string(), "b".to_string()],
            ..SearchFilters::default()
        };
        assert_eq!(a.canonical(), b.canonical());
    }

    #[test]
    fn test_canonical_drops_empty_values() {
        let mut filters = SearchFilters::default();
        filters.tags.push(String::new());
        filters.source = Some("  ".to_string());
        filters
            .metadata
            .insert("env".to_string(), String::new());
        assert_eq!(filters.canonical(), "");
    }

    #[test]
    fn test_canonical_includes_metadata_sorted() {
        let mut filters = SearchFilters::default();
        filters.metadata.insert("z".to_string(), "1".to_string());
        filters.metadata.insert("a".to_string(), "2".to_string());
        assert_eq!(filters.canonical(), "meta.a=2;meta.z=1");
    }
}
