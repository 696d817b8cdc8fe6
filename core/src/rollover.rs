//! End-of-cycle rollover: derive next month's Draft from a finalized period.
//!
//! The roster carries forward unchanged. Captured closings become the next
//! openings; everything else about the month starts from defaults.

use crate::{
    config::CycleConfig,
    error::{BillingError, BillingResult},
    period::{default_dg_sets, BillingPeriod, MasterBill, ReadingFlag, SolarInput, WorkflowStatus},
    workflow::Transition,
};

pub fn rollover(period: &BillingPeriod, config: &CycleConfig) -> BillingResult<BillingPeriod> {
    if period.status != WorkflowStatus::Finalized {
        return Err(BillingError::InvalidTransition {
            current:   period.status,
            attempted: Transition::Rollover,
            required:  vec![WorkflowStatus::Finalized],
            detail:    None,
        });
    }

    let month = period.month.succ();
    let year = if month == chrono::Month::January {
        period.year + 1
    } else {
        period.year
    };

    let readings = period
        .readings
        .iter()
        .map(|r| {
            let mut next = r.clone();
            next.opening = if r.is_captured { r.closing } else { r.opening };
            next.closing     = 0.0;
            next.units       = 0.0;
            next.is_captured = false;
            next.flag        = ReadingFlag::Normal;
            next.remarks     = None;
            next.photo       = None;
            next
        })
        .collect();

    Ok(BillingPeriod {
        month,
        year,
        status: WorkflowStatus::Draft,
        rejection_remarks: None,
        readings,
        solar: SolarInput::default(),
        dg_sets: default_dg_sets(config),
        master_bill: MasterBill::default(),
    })
}
