//! `CostRepository` and `BudgetRepository` implementations.

use crate::{LibsqlStorage, dt_from_micros, storage_error, ts_micros};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Row, params};
use rae_core::error::{Error, Result};
use rae_core::repository::{BudgetRepository, CostRepository};
use rae_core::types::{Budget, CostLog, UsageTotals};
use tracing::debug;

const BUDGET_COLUMNS: &str = "tenant_id, budget_usd_monthly, budget_tokens_monthly, \
     daily_usage_usd, monthly_usage_usd, daily_tokens_used, monthly_tokens_used, last_reset_at";

fn row_to_budget(row: &Row) -> Result<Budget> {
    let get_err = |e: libsql::Error| Error::storage_fatal(format!("read budget row: {e}"));
    let tenant_id: String = row.get(0).map_err(get_err)?;
    let budget_usd_monthly: f64 = row.get(1).map_err(get_err)?;
    let budget_tokens_monthly: i64 = row.get(2).map_err(get_err)?;
    let daily_usage_usd: f64 = row.get(3).map_err(get_err)?;
    let monthly_usage_usd: f64 = row.get(4).map_err(get_err)?;
    let daily_tokens_used: i64 = row.get(5).map_err(get_err)?;
    let monthly_tokens_used: i64 = row.get(6).map_err(get_err)?;
    let last_reset_at: i64 = row.get(7).map_err(get_err)?;

    Ok(Budget {
        tenant_id,
        budget_usd_monthly,
        budget_tokens_monthly: budget_tokens_monthly.max(0) as u64,
        daily_usage_usd,
        monthly_usage_usd,
        daily_tokens_used: daily_tokens_used.max(0) as u64,
        monthly_tokens_used: monthly_tokens_used.max(0) as u64,
        last_reset_at: dt_from_micros(last_reset_at),
    })
}

#[async_trait]
impl CostRepository for LibsqlStorage {
    async fn record(&self, log: &CostLog) -> Result<()> {
        let conn = self.connection().await?;
        conn.execute("BEGIN", ())
            .await
            .map_err(|e| storage_error("begin cost record", &e))?;

        let result: Result<()> = async {
            conn.execute(
                "INSERT INTO cost_logs \
                 (id, tenant_id, project_id, model, operation, input_tokens, output_tokens, \
                  total_cost_usd, timestamp) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    log.id.to_string(),
                    log.tenant_id.clone(),
                    log.project_id.clone(),
                    log.model.clone(),
                    log.operation.clone(),
                    log.input_tokens as i64,
                    log.output_tokens as i64,
                    log.total_cost_usd,
                    ts_micros(log.timestamp),
                ],
            )
            .await
            .map_err(|e| storage_error("insert cost log", &e))?;

            // Budget counters track the same spend in the same transaction.
            conn.execute(
                "UPDATE budgets SET \
                     daily_usage_usd = daily_usage_usd + ?, \
                     monthly_usage_usd = monthly_usage_usd + ?, \
                     daily_tokens_used = daily_tokens_used + ?, \
                     monthly_tokens_used = monthly_tokens_used + ? \
                 WHERE tenant_id = ?",
                params![
                    log.total_cost_usd,
                    log.total_cost_usd,
                    log.total_tokens() as i64,
                    log.total_tokens() as i64,
                    log.tenant_id.clone(),
                ],
            )
            .await
            .map_err(|e| storage_error("update budget counters", &e))?;
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                conn.execute("COMMIT", ())
                    .await
                    .map_err(|e| storage_error("commit cost record", &e))?;
                debug!(tenant = %log.tenant_id, cost = log.total_cost_usd, "cost recorded");
                Ok(())
            }
            Err(err) => {
                let _ = conn.execute("ROLLBACK", ()).await;
                Err(err)
            }
        }
    }

    async fn usage_since(&self, tenant_id: &str, since: DateTime<Utc>) -> Result<UsageTotals> {
        self.with_read_retry("usage since", || async {
            let conn = self.connection().await?;
            let mut rows = conn
                .query(
                    "SELECT COALESCE(SUM(total_cost_usd), 0.0), \
                            COALESCE(SUM(input_tokens + output_tokens), 0), \
                            COUNT(*) \
                     FROM cost_logs WHERE tenant_id = ? AND timestamp >= ?",
                    params![tenant_id.to_string(), ts_micros(since)],
                )
                .await
                .map_err(|e| storage_error("usage since", &e))?;
            usage_from_row(rows.next().await.map_err(|e| storage_error("usage since", &e))?)
        })
        .await
    }

    async fn usage_for_operation(
        &self,
        tenant_id: &str,
        operation: &str,
        since: DateTime<Utc>,
    ) -> Result<UsageTotals> {
        self.with_read_retry("usage for operation", || async {
            let conn = self.connection().await?;
            let mut rows = conn
                .query(
                    "SELECT COALESCE(SUM(total_cost_usd), 0.0), \
                            COALESCE(SUM(input_tokens + output_tokens), 0), \
                            COUNT(*) \
                     FROM cost_logs \
                     WHERE tenant_id = ? AND operation = ? AND timestamp >= ?",
                    params![
                        tenant_id.to_string(),
                        operation.to_string(),
                        ts_micros(since),
                    ],
                )
                .await
                .map_err(|e| storage_error("usage for operation", &e))?;
            usage_from_row(
                rows.next()
                    .await
                    .map_err(|e| storage_error("usage for operation", &e))?,
            )
        })
        .await
    }

    async fn probe(&self) -> Result<()> {
        self.probe_connection().await
    }
}

fn usage_from_row(row: Option<Row>) -> Result<UsageTotals> {
    let Some(row) = row else {
        return Ok(UsageTotals::default());
    };
    let get_err = |e: libsql::Error| Error::storage_fatal(format!("read usage row: {e}"));
    let total_cost_usd: f64 = row.get(0).map_err(get_err)?;
    let total_tokens: i64 = row.get(1).map_err(get_err)?;
    let call_count: i64 = row.get(2).map_err(get_err)?;
    Ok(UsageTotals {
        total_cost_usd,
        total_tokens: total_tokens.max(0) as u64,
        call_count: call_count.max(0) as u64,
    })
}

#[async_trait]
impl BudgetRepository for LibsqlStorage {
    async fn get_budget(&self, tenant_id: &str) -> Result<Option<Budget>> {
        self.with_read_retry("get budget", || async {
            let conn = self.connection().await?;
            let mut rows = conn
                .query(
                    &format!("SELECT {BUDGET_COLUMNS} FROM budgets WHERE tenant_id = ?"),
                    params![tenant_id.to_string()],
                )
                .await
                .map_err(|e| storage_error("get budget", &e))?;
            match rows
                .next()
                .await
                .map_err(|e| storage_error("get budget", &e))?
            {
                Some(row) => Ok(Some(row_to_budget(&row)?)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn upsert(&self, budget: &Budget) -> Result<()> {
        let conn = self.connection().await?;
        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO budgets ({BUDGET_COLUMNS}) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
            ),
            params![
                budget.tenant_id.clone(),
                budget.budget_usd_monthly,
                budget.budget_tokens_monthly as i64,
                budget.daily_usage_usd,
                budget.monthly_usage_usd,
                budget.daily_tokens_used as i64,
                budget.monthly_tokens_used as i64,
                ts_micros(budget.last_reset_at),
            ],
        )
        .await
        .map_err(|e| storage_error("upsert budget", &e))?;
        Ok(())
    }

    async fn roll_over(&self, tenant_id: &str, now: DateTime<Utc>) -> Result<Option<Budget>> {
        let Some(mut budget) = self.get_budget(tenant_id).await? else {
            return Ok(None);
        };
        let rolled = budget.roll_over(now);
        if !rolled.is_empty() {
            self.upsert(&budget).await?;
            debug!(tenant = tenant_id, ?rolled, "budget counters reset");
        }
        Ok(Some(budget))
    }
}
