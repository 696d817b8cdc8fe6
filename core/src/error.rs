use crate::{
    period::WorkflowStatus,
    types::TenantId,
    workflow::{Role, Transition},
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BillingError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(
        "Invalid transition: cannot {attempted} while {current} (requires {}){}",
        format_statuses(.required),
        format_detail(.detail)
    )]
    InvalidTransition {
        current:   WorkflowStatus,
        attempted: Transition,
        required:  Vec<WorkflowStatus>,
        detail:    Option<String>,
    },

    #[error("Role '{role}' is not allowed to {action}")]
    Unauthorized { role: Role, action: String },

    #[error("Period is {status}; '{action}' is no longer allowed")]
    PeriodFrozen { status: WorkflowStatus, action: String },

    #[error("Rejection withdrawn: a reason is required to send readings back")]
    RejectionWithdrawn,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Tenant '{tenant_id}' not found in this period")]
    UnknownTenant { tenant_id: TenantId },

    #[error("DG set '{dg_id}' not found in this period")]
    UnknownDgSet { dg_id: String },

    #[error("Period is {status}; statements require an approved period")]
    NotReconcilable { status: WorkflowStatus },

    #[error("Bill extraction failed: {0}")]
    Extraction(String),

    #[error("Remote sync failed: {0}")]
    Sync(String),

    #[error("Stale period revision: expected {expected}, store has {found}")]
    StaleRevision { expected: u64, found: u64 },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type BillingResult<T> = Result<T, BillingError>;

fn format_statuses(statuses: &[WorkflowStatus]) -> String {
    statuses
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(" or ")
}

fn format_detail(detail: &Option<String>) -> String {
    match detail {
        Some(d) => format!(": {d}"),
        None => String::new(),
    }
}
