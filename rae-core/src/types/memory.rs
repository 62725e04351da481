//! Memory records, layers, and tenant scoping.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tenant/project scope attached to every stored entity.
///
/// Tenant isolation is an invariant of the engine: no operation may return a
/// row whose tenant differs from the caller's tenant. The project is a
/// sub-scope within a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    /// Isolation boundary for all data access
    pub tenant_id: String,
    /// Sub-scope within the tenant
    pub project_id: String,
}

impl Scope {
    /// Create a new scope.
    pub fn new(tenant_id: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            project_id: project_id.into(),
        }
    }

    /// Validate that neither component is empty.
    pub fn validate(&self) -> Result<()> {
        if self.tenant_id.trim().is_empty() {
            return Err(Error::validation("tenant_id", "must not be empty"));
        }
        if self.project_id.trim().is_empty() {
            return Err(Error::validation("project_id", "must not be empty"));
        }
        Ok(())
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.tenant_id, self.project_id)
    }
}

/// Memory layer classification.
///
/// Layers separate raw events from distilled knowledge and generated
/// insight, and retrieval strategies weight them differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryLayer {
    /// Raw event records written by agents
    Episodic,
    /// Distilled facts and knowledge
    Semantic,
    /// Summaries and insights produced by the reflection pipeline
    Reflective,
}

impl std::fmt::Display for MemoryLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemoryLayer::Episodic => write!(f, "episodic"),
            MemoryLayer::Semantic => write!(f, "semantic"),
            MemoryLayer::Reflective => write!(f, "reflective"),
        }
    }
}

impl std::str::FromStr for MemoryLayer {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "episodic" => Ok(MemoryLayer::Episodic),
            "semantic" => Ok(MemoryLayer::Semantic),
            "reflective" => Ok(MemoryLayer::Reflective),
            other => Err(Error::validation(
                "layer",
                format!("unknown layer `{other}`"),
            )),
        }
    }
}

/// Lifecycle marker for reflection and archival.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsolidationStatus {
    /// Not yet summarized into a reflective memory
    Raw,
    /// Consumed by the reflection pipeline
    Consolidated,
    /// Decayed below the retention threshold; excluded from retrieval
    Archived,
}

impl std::fmt::Display for ConsolidationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConsolidationStatus::Raw => write!(f, "raw"),
            ConsolidationStatus::Consolidated => write!(f, "consolidated"),
            ConsolidationStatus::Archived => write!(f, "archived"),
        }
    }
}

impl std::str::FromStr for ConsolidationStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "raw" => Ok(ConsolidationStatus::Raw),
            "consolidated" => Ok(ConsolidationStatus::Consolidated),
            "archived" => Ok(ConsolidationStatus::Archived),
            other => Err(Error::validation(
                "consolidation_status",
                format!("unknown status `{other}`"),
            )),
        }
    }
}

/// One unit of stored knowledge.
///
/// Content is immutable after creation; metadata (importance, access stats,
/// consolidation status) is mutated by retrieval, scoring, and reflection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    /// Stable unique identifier
    pub id: Uuid,
    /// Tenant/project scoping
    pub scope: Scope,
    /// Memory layer
    pub layer: MemoryLayer,
    /// Opaque text payload
    pub content: String,
    /// Free-form origin tag (e.g. "user_preference", "agent_output")
    pub source: String,
    /// Tag set for pre-filtering
    pub tags: Vec<String>,
    /// Current importance score in [0, 1]
    pub importance: f64,
    /// User-provided importance; disables decay when present
    pub user_importance_override: Option<f64>,
    /// Identifier of the vector in the vector index (one-to-one with `id`)
    pub embedding_ref: Option<String>,
    /// Creation time (UTC)
    pub created_at: DateTime<Utc>,
    /// Updated on every successful retrieval that returns this memory
    pub last_accessed_at: DateTime<Utc>,
    /// Incremented on every successful retrieval; never decreases
    pub usage_count: u64,
    /// Lifecycle marker for reflection/archival
    pub consolidation_status: ConsolidationStatus,
    /// For reflective memories: the source memory IDs they summarize
    pub parent_ids: Vec<Uuid>,
}

impl Memory {
    /// Age in fractional days at `now`, measured from creation.
    #[must_use]
    pub fn age_days(&self, now: DateTime<Utc>) -> f64 {
        (now - self.created_at).num_seconds().max(0) as f64 / 86_400.0
    }

    /// Fractional days since the last successful retrieval at `now`.
    #[must_use]
    pub fn days_since_access(&self, now: DateTime<Utc>) -> f64 {
        (now - self.last_accessed_at).num_seconds().max(0) as f64 / 86_400.0
    }

    /// Whether this memory participates in retrieval.
    #[must_use]
    pub fn is_retrievable(&self) -> bool {
        self.consolidation_status != ConsolidationStatus::Archived
    }
}

/// Input payload for creating a memory.
///
/// The repository assigns the ID (unless provided), stamps `created_at`,
/// and zeroes the access statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryDraft {
    /// Explicit ID; assigned when absent
    pub id: Option<Uuid>,
    /// Tenant/project scoping
    pub scope: Scope,
    /// Memory layer
    pub layer: MemoryLayer,
    /// Opaque text payload
    pub content: String,
    /// Free-form origin tag
    pub source: String,
    /// Tag set
    pub tags: Vec<String>,
    /// Initial importance in [0, 1]
    pub importance: f64,
    /// User-provided importance override
    pub user_importance_override: Option<f64>,
    /// Explicit creation timestamp; `now` when absent
    pub timestamp: Option<DateTime<Utc>>,
    /// For reflective drafts: source memory IDs
    pub parent_ids: Vec<Uuid>,
}

impl MemoryDraft {
    /// Create a minimal episodic draft.
    pub fn episodic(scope: Scope, content: impl Into<String>) -> Self {
        Self {
            id: None,
            scope,
            layer: MemoryLayer::Episodic,
            content: content.into(),
            source: "agent_output".to_string(),
            tags: Vec::new(),
            importance: 0.5,
            user_importance_override: None,
            timestamp: None,
            parent_ids: Vec::new(),
        }
    }

    /// Set the origin tag.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Set the tag set.
    #[must_use]
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Set the initial importance.
    #[must_use]
    pub fn with_importance(mut self, importance: f64) -> Self {
        self.importance = importance;
        self
    }

    /// Validate scope, layer bounds, and importance range.
    pub fn validate(&self) -> Result<()> {
        self.scope.validate()?;
        if !(0.0..=1.0).contains(&self.importance) {
            return Err(Error::validation(
                "importance",
                format!("{} is outside [0, 1]", self.importance),
            ));
        }
        if let Some(o) = self.user_importance_override {
            if !(0.0..=1.0).contains(&o) {
                return Err(Error::validation(
                    "user_importance_override",
                    format!("{o} is outside [0, 1]"),
                ));
            }
        }
        if self.content.trim().is_empty() {
            return Err(Error::validation("content", "must not be empty"));
        }
        Ok(())
    }

    /// Materialize this draft into a full memory record.
    ///
    /// Stamps `created_at` (from the draft timestamp or `now`), zeroes the
    /// access statistics, and assigns an ID when absent.
    #[must_use]
    pub fn into_memory(self, now: DateTime<Utc>) -> Memory {
        let created_at = self.timestamp.unwrap_or(now);
        Memory {
            id: self.id.unwrap_or_else(Uuid::new_v4),
            scope: self.scope,
            layer: self.layer,
            content: self.content,
            source: self.source,
            tags: self.tags,
            importance: self.importance.clamp(0.0, 1.0),
            user_importance_override: self.user_importance_override,
            embedding_ref: None,
            created_at,
            last_accessed_at: created_at,
            usage_count: 0,
            consolidation_status: ConsolidationStatus::Raw,
            parent_ids: self.parent_ids,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn scope() -> Scope {
        Scope::new("t1", "p1")
    }

    #[test]
    fn test_layer_round_trip() {
        for layer in [
            MemoryLayer::Episodic,
            MemoryLayer::Semantic,
            MemoryLayer::Reflective,
        ] {
            let parsed = MemoryLayer::from_str(&layer.to_string()).unwrap();
            assert_eq!(parsed, layer);
        }
        assert!(MemoryLayer::from_str("procedural").is_err());
    }

    #[test]
    fn test_draft_validation_rejects_out_of_range_importance() {
        let draft = MemoryDraft::episodic(scope(), "x").with_importance(1.2);
        let err = draft.validate().unwrap_err();
        assert!(err.to_string().contains("importance"));
    }

    #[test]
    fn test_draft_validation_rejects_empty_scope() {
        let draft = MemoryDraft::episodic(Scope::new("", "p1"), "x");
        assert!(draft.validate().is_err());
    }

    #[test]
    fn test_into_memory_initializes_access_stats() {
        let now = Utc::now();
        let memory = MemoryDraft::episodic(scope(), "hello").into_memory(now);
        assert_eq!(memory.usage_count, 0);
        assert_eq!(memory.last_accessed_at, memory.created_at);
        assert_eq!(memory.consolidation_status, ConsolidationStatus::Raw);
        assert!(memory.is_retrievable());
    }

    #[test]
    fn test_age_and_access_staleness() {
        let now = Utc::now();
        let mut memory = MemoryDraft::episodic(scope(), "hello").into_memory(now);
        memory.created_at = now - chrono::Duration::days(10);
        memory.last_accessed_at = now - chrono::Duration::days(3);
        assert!((memory.age_days(now) - 10.0).abs() < 0.01);
        assert!((memory.days_since_access(now) - 3.0).abs() < 0.01);
    }
}
