//! Unit reconciliation: nets the master bill, solar credit and DG output
//! against the sum of tenant sub-meter units.
//!
//! Design:
//!   - net to allocate = master units − solar credit + DG units
//!   - common loss     = net to allocate − tenant units
//!   - loss %          = common loss / max(master units, 1) × 100
//!   - Warnings are advisory and never block finalization.

use crate::{
    period::{AllocationMethod, BillingPeriod, ReadingFlag, SolarInput},
    types::TenantId,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReconWarning {
    NoCapturedReadings,
    LossBeyondTolerance {
        loss_percentage: f64,
        tolerance:       f64,
    },
    UnresolvedSpike {
        tenant_ids: Vec<TenantId>,
    },
    /// Solar was netted common-first although another method is selected.
    SolarPolicyNotApplied {
        method: AllocationMethod,
    },
}

impl ReconWarning {
    pub fn message(&self) -> String {
        match self {
            Self::NoCapturedReadings => "No captured readings yet: tenant sum is 0".into(),
            Self::LossBeyondTolerance { loss_percentage, tolerance } => format!(
                "Common/loss {loss_percentage:.1}% is beyond the {tolerance:.0}% tolerance; check sub-meters"
            ),
            Self::UnresolvedSpike { tenant_ids } => format!(
                "Unresolved spike present: {}",
                tenant_ids.join(", ")
            ),
            Self::SolarPolicyNotApplied { method } => format!(
                "Solar allocation method {method:?} is recorded but credited common-first"
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationSummary {
    pub master_units:      f64,
    pub solar_credit:      f64,
    pub dg_units:          f64,
    pub tenant_units:      f64,
    pub net_to_allocate:   f64,
    pub common_loss:       f64,
    pub loss_percentage:   f64,
    pub allocation_method: AllocationMethod,
    pub warnings:          Vec<ReconWarning>,
}

impl ReconciliationSummary {
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Units credited from solar generation under the selected policy.
///
/// Only common-first netting has defined arithmetic; the other methods are
/// stored and surfaced but credit the same way.
pub fn solar_credit(solar: &SolarInput) -> f64 {
    match solar.allocation_method {
        AllocationMethod::CommonFirst
        | AllocationMethod::ProRata
        | AllocationMethod::Custom => solar.units_generated,
    }
}

pub fn reconcile(period: &BillingPeriod, tolerance_percent: f64) -> ReconciliationSummary {
    // Uncaptured rows carry units = 0 and contribute nothing.
    let tenant_units: f64 = period.readings.iter().map(|r| r.units).sum();
    let dg_units: f64 = period.dg_sets.iter().map(|d| d.units).sum();
    let solar = solar_credit(&period.solar);
    let master_units = period.master_bill.total_units;

    let net_to_allocate = master_units - solar + dg_units;
    let common_loss = net_to_allocate - tenant_units;
    // A missing bill divides by 1 to keep the ratio finite.
    let loss_percentage = common_loss / master_units.max(1.0) * 100.0;

    let mut warnings = Vec::new();
    if tenant_units == 0.0 {
        warnings.push(ReconWarning::NoCapturedReadings);
    }
    if loss_percentage > tolerance_percent {
        warnings.push(ReconWarning::LossBeyondTolerance {
            loss_percentage,
            tolerance: tolerance_percent,
        });
    }
    let spikes: Vec<TenantId> = period
        .readings
        .iter()
        .filter(|r| r.flag == ReadingFlag::Spike)
        .map(|r| r.tenant_id.clone())
        .collect();
    if !spikes.is_empty() {
        warnings.push(ReconWarning::UnresolvedSpike { tenant_ids: spikes });
    }
    match period.solar.allocation_method {
        AllocationMethod::CommonFirst => {}
        method @ (AllocationMethod::ProRata | AllocationMethod::Custom) => {
            warnings.push(ReconWarning::SolarPolicyNotApplied { method });
        }
    }

    log::debug!(
        "{}: reconciled net={net_to_allocate:.2} tenants={tenant_units:.2} loss={common_loss:.2} ({loss_percentage:.1}%)",
        period.period_key()
    );

    ReconciliationSummary {
        master_units,
        solar_credit: solar,
        dg_units,
        tenant_units,
        net_to_allocate,
        common_loss,
        loss_percentage,
        allocation_method: period.solar.allocation_method,
        warnings,
    }
}
