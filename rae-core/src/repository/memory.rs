//! Memory repository trait.

use crate::error::Result;
use crate::types::{ConsolidationStatus, Memory, MemoryLayer, Scope};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Query builder for memory listings.
#[derive(Debug, Clone, Default)]
pub struct MemoryQuery {
    /// Restrict to this source tag
    pub source: Option<String>,
    /// Require all of these tags
    pub tags: Vec<String>,
    /// Restrict to this consolidation status
    pub consolidation_status: Option<ConsolidationStatus>,
    /// Maximum rows
    pub limit: usize,
    /// Offset for paging
    pub offset: usize,
}

impl MemoryQuery {
    /// Create a query returning up to `limit` rows.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }
}

/// Durable CRUD over memories plus the access-stats update path.
#[async_trait]
pub trait MemoryRepository: Send + Sync {
    /// Persist a memory record as-is.
    ///
    /// The record is expected to come from a validated
    /// [`crate::types::MemoryDraft`]; implementations reject duplicate IDs.
    async fn create(&self, memory: &Memory) -> Result<Uuid>;

    /// Fetch a memory, only when owned by the scope's tenant.
    ///
    /// Returns `None` both for missing rows and rows owned by another
    /// tenant.
    async fn get(&self, id: Uuid, scope: &Scope) -> Result<Option<Memory>>;

    /// Fetch a batch of memories by ID, preserving input order.
    ///
    /// IDs that are missing or foreign-owned are silently skipped.
    async fn get_batch(&self, ids: &[Uuid], scope: &Scope) -> Result<Vec<Memory>>;

    /// Delete a memory. Idempotent; returns `true` when a row was removed.
    async fn delete(&self, id: Uuid, scope: &Scope) -> Result<bool>;

    /// Clamp `new_importance` into [0, 1] and apply it, recording the
    /// previous value in the importance side log.
    async fn update_importance(&self, id: Uuid, scope: &Scope, new_importance: f64) -> Result<()>;

    /// Batch access-stats update: for each ID, set `last_accessed_at = now`
    /// and atomically increment `usage_count`.
    ///
    /// Concurrent calls must each be reflected (no lost updates). One call
    /// increments each listed memory exactly once.
    async fn record_access(&self, ids: &[Uuid], scope: &Scope) -> Result<()>;

    /// List memories of one layer, newest first, excluding archived rows.
    async fn list_by_layer(
        &self,
        scope: &Scope,
        layer: MemoryLayer,
        query: &MemoryQuery,
    ) -> Result<Vec<Memory>>;

    /// Episodic memories with `consolidation_status = raw`, oldest first.
    async fn find_unconsolidated_episodes(
        &self,
        scope: &Scope,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Memory>>;

    /// Full-text search over memory content, scoped, excluding archived
    /// rows. Scores are backend relevance values (higher is better).
    async fn fulltext_search(
        &self,
        scope: &Scope,
        query: &str,
        limit: usize,
    ) -> Result<Vec<(Memory, f64)>>;

    /// Set the consolidation status of a batch of memories.
    async fn set_consolidation_status(
        &self,
        ids: &[Uuid],
        scope: &Scope,
        status: ConsolidationStatus,
    ) -> Result<()>;

    /// Persist a reflective memory and mark its parents consolidated, in one
    /// transaction.
    async fn store_reflection(&self, reflection: &Memory) -> Result<Uuid>;

    /// Page through a scope's non-archived memories for background scoring.
    async fn scan(&self, scope: &Scope, limit: usize, offset: usize) -> Result<Vec<Memory>>;

    /// Archived memories older than `older_than` are deleted; returns the
    /// number removed.
    async fn purge_archived(&self, scope: &Scope, older_than: DateTime<Utc>) -> Result<u64>;

    /// Every distinct `(tenant, project)` scope with at least one memory.
    ///
    /// Consumed by background sweepers, which then operate one scope at a
    /// time through the scoped methods above.
    async fn list_scopes(&self) -> Result<Vec<Scope>>;

    /// Cheap connectivity check used by readiness probes.
    async fn probe(&self) -> Result<()>;
}
