//! Monthly statement: the frozen output of finalization.

use crate::{
    allocation::{allocate_period, Allocation},
    error::{BillingError, BillingResult},
    period::{BillingPeriod, WorkflowStatus},
    reconciliation::{reconcile, ReconciliationSummary},
    types::{OrgKey, StatementId, Year},
};
use chrono::{DateTime, Month, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyStatement {
    pub statement_id:   StatementId,
    pub org_key:        OrgKey,
    pub month:          Month,
    pub year:           Year,
    pub generated_at:   DateTime<Utc>,
    pub reconciliation: ReconciliationSummary,
    pub allocation:     Allocation,
}

impl MonthlyStatement {
    pub fn period_key(&self) -> String {
        format!("{}-{:02}", self.year, self.month.number_from_month())
    }

    pub fn grand_total(&self) -> f64 {
        self.allocation.totals.grand_total
    }
}

/// Build a statement from an approved (or later) period.
pub fn build_statement(
    period: &BillingPeriod,
    org_key: &str,
    statement_id: StatementId,
    generated_at: DateTime<Utc>,
    tolerance_percent: f64,
) -> BillingResult<MonthlyStatement> {
    match period.status {
        WorkflowStatus::Approved | WorkflowStatus::Locked | WorkflowStatus::Finalized => {}
        status @ (WorkflowStatus::Draft | WorkflowStatus::Submitted) => {
            return Err(BillingError::NotReconcilable { status });
        }
    }

    Ok(MonthlyStatement {
        statement_id,
        org_key: org_key.to_string(),
        month: period.month,
        year: period.year,
        generated_at,
        reconciliation: reconcile(period, tolerance_percent),
        allocation: allocate_period(period),
    })
}
