//! Billing period workflow.
//!
//!   Draft ──submit──▶ Submitted ──approve──▶ Approved ──finalize──▶ Finalized
//!     ▲                   │
//!     └──────reject───────┘
//!
//! RULES:
//!   - Every transition checks the role first, then the source state.
//!   - Only `status` and `rejection_remarks` are touched by a transition.
//!   - Locked is a stored status that no transition enters.
//!   - Every other mutation goes through `ensure_mutable`.

use crate::{
    error::{BillingError, BillingResult},
    period::{BillingPeriod, WorkflowStatus},
};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    ReadingTaker,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReadingTaker => "reading_taker",
            Self::Admin        => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    Submit,
    Approve,
    Reject,
    Finalize,
    Rollover,
}

impl Transition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submit   => "submit",
            Self::Approve  => "approve",
            Self::Reject   => "reject",
            Self::Finalize => "finalize",
            Self::Rollover => "roll over",
        }
    }

    /// The single state each transition may start from.
    pub fn source(&self) -> WorkflowStatus {
        match self {
            Self::Submit   => WorkflowStatus::Draft,
            Self::Approve  => WorkflowStatus::Submitted,
            Self::Reject   => WorkflowStatus::Submitted,
            Self::Finalize => WorkflowStatus::Approved,
            Self::Rollover => WorkflowStatus::Finalized,
        }
    }

    pub fn admin_only(&self) -> bool {
        match self {
            Self::Submit => false,
            Self::Approve | Self::Reject | Self::Finalize | Self::Rollover => true,
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn ensure_admin(role: Role, action: &str) -> BillingResult<()> {
    if role != Role::Admin {
        return Err(BillingError::Unauthorized {
            role,
            action: action.to_string(),
        });
    }
    Ok(())
}

/// Guard a transition: role, then source state.
pub fn check_transition(
    period: &BillingPeriod,
    role: Role,
    transition: Transition,
) -> BillingResult<()> {
    if transition.admin_only() {
        ensure_admin(role, transition.as_str())?;
    }
    if period.status != transition.source() {
        return Err(invalid(period, transition, None));
    }
    Ok(())
}

/// Guard for non-transition edits. Fails once the period is Approved or later.
pub fn ensure_mutable(period: &BillingPeriod, action: &str) -> BillingResult<()> {
    if period.is_frozen() {
        return Err(BillingError::PeriodFrozen {
            status: period.status,
            action: action.to_string(),
        });
    }
    Ok(())
}

fn invalid(period: &BillingPeriod, attempted: Transition, detail: Option<String>) -> BillingError {
    BillingError::InvalidTransition {
        current:  period.status,
        attempted,
        required: vec![attempted.source()],
        detail,
    }
}

/// Send captured readings for review. Partial capture is allowed.
pub fn submit(period: &mut BillingPeriod, role: Role) -> BillingResult<()> {
    check_transition(period, role, Transition::Submit)?;
    if period.captured_count() == 0 {
        return Err(invalid(
            period,
            Transition::Submit,
            Some("at least one captured reading is required".into()),
        ));
    }
    period.status = WorkflowStatus::Submitted;
    Ok(())
}

pub fn approve(period: &mut BillingPeriod, role: Role) -> BillingResult<()> {
    check_transition(period, role, Transition::Approve)?;
    period.status = WorkflowStatus::Approved;
    period.rejection_remarks = None;
    Ok(())
}

/// Send the batch back to Draft. A withheld or blank reason aborts the
/// rejection and leaves the period as it was.
pub fn reject(period: &mut BillingPeriod, role: Role, reason: Option<&str>) -> BillingResult<()> {
    check_transition(period, role, Transition::Reject)?;
    let reason = match reason {
        Some(r) if !r.trim().is_empty() => r,
        _ => return Err(BillingError::RejectionWithdrawn),
    };
    period.status = WorkflowStatus::Draft;
    period.rejection_remarks = Some(reason.to_string());
    Ok(())
}

/// Close the period permanently.
pub fn finalize(period: &mut BillingPeriod, role: Role) -> BillingResult<()> {
    check_transition(period, role, Transition::Finalize)?;
    period.status = WorkflowStatus::Finalized;
    Ok(())
}
