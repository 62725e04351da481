//! Cost-log and budget repository traits.

use crate::error::Result;
use crate::types::{Budget, CostLog, UsageTotals};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Append-only cost ledger.
#[async_trait]
pub trait CostRepository: Send + Sync {
    /// Append a cost log and add its spend to the tenant's live budget
    /// counters, atomically.
    async fn record(&self, log: &CostLog) -> Result<()>;

    /// Aggregate a tenant's usage from cost logs since `since`.
    async fn usage_since(&self, tenant_id: &str, since: DateTime<Utc>) -> Result<UsageTotals>;

    /// Aggregate usage for one operation tag since `since`.
    ///
    /// Used for cache-savings accounting over LLM completions.
    async fn usage_for_operation(
        &self,
        tenant_id: &str,
        operation: &str,
        since: DateTime<Utc>,
    ) -> Result<UsageTotals>;

    /// Cheap connectivity check used by readiness probes.
    async fn probe(&self) -> Result<()>;
}

/// Per-tenant budget rows with live counters.
///
/// Counter mutation happens through [`CostRepository::record`]; this trait
/// covers configuration and reads.
#[async_trait]
pub trait BudgetRepository: Send + Sync {
    /// Fetch a tenant's budget, if configured.
    async fn get_budget(&self, tenant_id: &str) -> Result<Option<Budget>>;

    /// Insert or replace a tenant's budget row.
    async fn upsert(&self, budget: &Budget) -> Result<()>;

    /// Reset counters that crossed a UTC day/month boundary and persist the
    /// result. Returns the budget as it stands after any reset.
    async fn roll_over(&self, tenant_id: &str, now: DateTime<Utc>) -> Result<Option<Budget>>;
}
