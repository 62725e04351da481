//! Cost logs and per-tenant budgets.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One accounting row, written for every LLM/embedding/rerank call.
///
/// Cache hits are logged too, as zero-cost rows with
/// `operation = "cache_hit"`, so hit rates stay derivable from the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostLog {
    /// Row identifier
    pub id: Uuid,
    /// Tenant the spend belongs to
    pub tenant_id: String,
    /// Project the spend belongs to
    pub project_id: String,
    /// Model identifier ("none" for non-model operations)
    pub model: String,
    /// Operation tag ("completion", "embedding", "rerank", "cache_hit")
    pub operation: String,
    /// Prompt-side tokens
    pub input_tokens: u64,
    /// Completion-side tokens
    pub output_tokens: u64,
    /// Computed spend; never negative
    pub total_cost_usd: f64,
    /// When the call completed (UTC)
    pub timestamp: DateTime<Utc>,
}

impl CostLog {
    /// Total tokens across both sides of the call.
    #[must_use]
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Which budget window a check or reset refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetWindow {
    /// Resets at the UTC day boundary
    Daily,
    /// Resets at the UTC month boundary
    Monthly,
}

impl std::fmt::Display for BudgetWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BudgetWindow::Daily => write!(f, "daily"),
            BudgetWindow::Monthly => write!(f, "monthly"),
        }
    }
}

/// Per-tenant spending limits and live usage counters.
///
/// Counters reset on the UTC day/month boundary. A limit of zero means
/// "no limit" for that dimension.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Budget {
    /// Tenant the budget applies to
    pub tenant_id: String,
    /// Monthly USD ceiling (0 = unlimited)
    pub budget_usd_monthly: f64,
    /// Monthly token ceiling (0 = unlimited)
    pub budget_tokens_monthly: u64,
    /// USD spent since the last day boundary
    pub daily_usage_usd: f64,
    /// USD spent since the last month boundary
    pub monthly_usage_usd: f64,
    /// Tokens spent since the last day boundary
    pub daily_tokens_used: u64,
    /// Tokens spent since the last month boundary
    pub monthly_tokens_used: u64,
    /// When the counters were last reset
    pub last_reset_at: DateTime<Utc>,
}

impl Budget {
    /// Create a budget with zeroed counters.
    #[must_use]
    pub fn new(tenant_id: impl Into<String>, budget_usd_monthly: f64) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            budget_usd_monthly,
            budget_tokens_monthly: 0,
            daily_usage_usd: 0.0,
            monthly_usage_usd: 0.0,
            daily_tokens_used: 0,
            monthly_tokens_used: 0,
            last_reset_at: Utc::now(),
        }
    }

    /// Daily USD ceiling derived from the monthly one: 1/20 of the monthly
    /// budget.
    #[must_use]
    pub fn budget_usd_daily(&self) -> f64 {
        if self.budget_usd_monthly <= 0.0 {
            0.0
        } else {
            self.budget_usd_monthly / 20.0
        }
    }

    /// Reset counters that have crossed a UTC day/month boundary since the
    /// last reset. Returns the windows that were reset.
    pub fn roll_over(&mut self, now: DateTime<Utc>) -> Vec<BudgetWindow> {
        let mut rolled = Vec::new();
        let last = self.last_reset_at;
        if (now.year(), now.month()) != (last.year(), last.month()) {
            self.monthly_usage_usd = 0.0;
            self.monthly_tokens_used = 0;
            rolled.push(BudgetWindow::Monthly);
        }
        if now.date_naive() != last.date_naive() {
            self.daily_usage_usd = 0.0;
            self.daily_tokens_used = 0;
            rolled.push(BudgetWindow::Daily);
        }
        if !rolled.is_empty() {
            self.last_reset_at = now;
        }
        rolled
    }

    /// The window exhausted by current usage, if any.
    #[must_use]
    pub fn exceeded_window(&self) -> Option<(BudgetWindow, f64, f64)> {
        self.would_exceed(0.0)
    }

    /// The window that current usage plus a prospective spend would exhaust,
    /// if any.
    ///
    /// Used by the pre-flight budget check: a call whose estimated cost would
    /// push the tenant over a limit is refused before any provider call.
    #[must_use]
    pub fn would_exceed(&self, prospective_usd: f64) -> Option<(BudgetWindow, f64, f64)> {
        let daily_limit = self.budget_usd_daily();
        if daily_limit > 0.0 && self.daily_usage_usd + prospective_usd > daily_limit {
            return Some((BudgetWindow::Daily, self.daily_usage_usd, daily_limit));
        }
        if self.budget_usd_monthly > 0.0
            && self.monthly_usage_usd + prospective_usd > self.budget_usd_monthly
        {
            return Some((
                BudgetWindow::Monthly,
                self.monthly_usage_usd,
                self.budget_usd_monthly,
            ));
        }
        if self.budget_tokens_monthly > 0
            && self.monthly_tokens_used >= self.budget_tokens_monthly
        {
            return Some((
                BudgetWindow::Monthly,
                self.monthly_tokens_used as f64,
                self.budget_tokens_monthly as f64,
            ));
        }
        None
    }
}

/// Aggregated usage over a time window, derived from cost logs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageTotals {
    /// Total USD spend
    pub total_cost_usd: f64,
    /// Total tokens across all operations
    pub total_tokens: u64,
    /// Number of cost-log rows
    pub call_count: u64,
}

impl UsageTotals {
    /// Mean USD spend per call; zero when no calls were made.
    #[must_use]
    pub fn avg_cost_per_call(&self) -> f64 {
        if self.call_count == 0 {
            0.0
        } else {
            self.total_cost_usd / self.call_count as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_roll_over_day_boundary() {
        let mut budget = Budget::new("t1", 10.0);
        budget.daily_usage_usd = 0.4;
        budget.monthly_usage_usd = 2.0;
        budget.last_reset_at = Utc.with_ymd_and_hms(2026, 7, 14, 23, 0, 0).unwrap();

        let rolled = budget.roll_over(Utc.with_ymd_and_hms(2026, 7, 15, 1, 0, 0).unwrap());
        assert_eq!(rolled, vec![BudgetWindow::Daily]);
        assert!(budget.daily_usage_usd.abs() < f64::EPSILON);
        assert!((budget.monthly_usage_usd - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_roll_over_month_boundary_resets_both() {
        let mut budget = Budget::new("t1", 10.0);
        budget.daily_usage_usd = 0.4;
        budget.monthly_usage_usd = 9.0;
        budget.last_reset_at = Utc.with_ymd_and_hms(2026, 6, 30, 23, 0, 0).unwrap();

        let rolled = budget.roll_over(Utc.with_ymd_and_hms(2026, 7, 1, 0, 5, 0).unwrap());
        assert!(rolled.contains(&BudgetWindow::Monthly));
        assert!(rolled.contains(&BudgetWindow::Daily));
        assert!(budget.monthly_usage_usd.abs() < f64::EPSILON);
    }

    #[test]
    fn test_exceeded_window_prefers_daily() {
        let mut budget = Budget::new("t1", 10.0);
        budget.daily_usage_usd = 1.0; // daily allowance is 0.5
        budget.monthly_usage_usd = 1.0;
        let (window, usage, limit) = budget.exceeded_window().unwrap();
        assert_eq!(window, BudgetWindow::Daily);
        assert!((usage - 1.0).abs() < f64::EPSILON);
        assert!((limit - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_zero_budget_means_unlimited() {
        let budget = Budget::new("t1", 0.0);
        assert!(budget.exceeded_window().is_none());
    }

    #[test]
    fn test_token_ceiling() {
        let mut budget = Budget::new("t1", 0.0);
        budget.budget_tokens_monthly = 1_000;
        budget.monthly_tokens_used = 1_000;
        let (window, _, _) = budget.exceeded_window().unwrap();
        assert_eq!(window, BudgetWindow::Monthly);
    }
}
