//! Deterministic cache fingerprints.
//!
//! Two requests that differ only in query whitespace, tag order, or by less
//! than the 60-second time bucket produce the same fingerprint. The
//! fingerprint is SHA-256 over a length-prefixed rendering of
//! `(tenant_id, project_id, canonical_query, canonical_filters,
//! time_bucket, pipeline_version)`.

use crate::types::{Scope, SearchFilters};
use sha2::{Digest, Sha256};

/// Width of the time bucket in seconds.
pub const TIME_BUCKET_SECS: i64 = 60;

/// A computed cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Raw digest bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Canonicalize query text: trim, collapse internal whitespace, lowercase.
#[must_use]
pub fn canonical_query(query: &str) -> String {
    query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// The time bucket a unix timestamp falls into.
#[must_use]
pub fn time_bucket(now_unix: i64) -> i64 {
    now_unix.div_euclid(TIME_BUCKET_SECS)
}

fn write_field(hasher: &mut Sha256, field: &[u8]) {
    hasher.update(u32::try_from(field.len()).unwrap_or(u32::MAX).to_be_bytes());
    hasher.update(field);
}

/// Compute the fingerprint for a retrieval request.
#[must_use]
pub fn fingerprint(
    scope: &Scope,
    query: &str,
    filters: &SearchFilters,
    now_unix: i64,
    pipeline_version: u32,
) -> Fingerprint {
    let mut hasher = Sha256::new();
    write_field(&mut hasher, scope.tenant_id.as_bytes());
    write_field(&mut hasher, scope.project_id.as_bytes());
    write_field(&mut hasher, canonical_query(query).as_bytes());
    write_field(&mut hasher, filters.canonical().as_bytes());
    write_field(&mut hasher, time_bucket(now_unix).to_string().as_bytes());
    write_field(&mut hasher, pipeline_version.to_string().as_bytes());
    Fingerprint(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> Scope {
        Scope::new("t1", "p1")
    }

    #[test]
    fn test_whitespace_insensitive() {
        let a = fingerprint(&scope(), "  Dark   Mode ", &SearchFilters::default(), 120, 1);
        let b = fingerprint(&scope(), "dark mode", &SearchFilters::default(), 120, 1);
        assert_eq!(a, b);
    }

    #[test]
    fn test_tag_order_insensitive() {
        let mut f1 = SearchFilters::default();
        f1.tags = vec!["ui".to_string(), "prefs".to_string()];
        let mut f2 = SearchFilters::default();
        f2.tags = vec!["prefs".to_string(), "ui".to_string()];

        let a = fingerprint(&scope(), "q", &f1, 0, 1);
        let b = fingerprint(&scope(), "q", &f2, 0, 1);
        assert_eq!(a, b);
    }

    #[test]
    fn test_same_bucket_same_fingerprint() {
        let a = fingerprint(&scope(), "q", &SearchFilters::default(), 600, 1);
        let b = fingerprint(&scope(), "q", &SearchFilters::default(), 659, 1);
        let c = fingerprint(&scope(), "q", &SearchFilters::default(), 660, 1);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_tenant_separates_keys() {
        let a = fingerprint(&scope(), "q", &SearchFilters::default(), 0, 1);
        let b = fingerprint(
            &Scope::new("t2", "p1"),
            "q",
            &SearchFilters::default(),
            0,
            1,
        );
        assert_ne!(a, b);
    }

    #[test]
    fn test_pipeline_version_separates_keys() {
        let a = fingerprint(&scope(), "q", &SearchFilters::default(), 0, 1);
        let b = fingerprint(&scope(), "q", &SearchFilters::default(), 0, 2);
        assert_ne!(a, b);
    }

    #[test]
    fn test_length_prefix_prevents_field_bleed() {
        // ("ab", "c") and ("a", "bc") must not collide.
        let a = fingerprint(
            &Scope::new("ab", "c"),
            "q",
            &SearchFilters::default(),
            0,
            1,
        );
        let b = fingerprint(
            &Scope::new("a", "bc"),
            "q",
            &SearchFilters::default(),
            0,
            1,
        );
        assert_ne!(a, b);
    }
}
