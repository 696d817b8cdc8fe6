//! Per-tenant cost allocation for statements.
//!
//! Units here are gated on the raw closing value (`closing > 0`), not on
//! `is_captured` as in capture. Both gates are relied upon independently.
//!
//! DG cost is a flat per-unit surcharge on the tenant's own consumption at
//! each mapped set's rate. A tenant mapped to several active sets pays each
//! surcharge.

use crate::{
    period::{BillingPeriod, DgSet, Reading},
    types::{MeterId, TenantId},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillLine {
    pub tenant_id:        TenantId,
    pub meter_id:         MeterId,
    pub opening:          f64,
    pub closing:          f64,
    pub difference:       f64,
    pub meter_multiplier: f64,
    pub units:            f64,
    pub rate:             f64,
    pub energy_amount:    f64,
    pub fixed_charge:     f64,
    pub transformer_loss: f64,
    pub dg_charge:        f64,
    pub total:            f64,
    /// Mapped to at least one DG set that produced units.
    pub mapped_to_dg:     bool,
    /// Number of active DG sets charging this tenant.
    pub dg_mappings:      usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatementTotals {
    pub units:            f64,
    pub energy_amount:    f64,
    pub fixed_charge:     f64,
    pub transformer_loss: f64,
    pub dg_charge:        f64,
    pub grand_total:      f64,
}

impl StatementTotals {
    fn add(&mut self, line: &BillLine) {
        self.units            += line.units;
        self.energy_amount    += line.energy_amount;
        self.fixed_charge     += line.fixed_charge;
        self.transformer_loss += line.transformer_loss;
        self.dg_charge        += line.dg_charge;
        self.grand_total      += line.total;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub lines:  Vec<BillLine>,
    pub totals: StatementTotals,
}

impl Allocation {
    pub fn line(&self, tenant_id: &str) -> Option<&BillLine> {
        self.lines.iter().find(|l| l.tenant_id == tenant_id)
    }
}

pub fn allocate_tenant(reading: &Reading, dg_sets: &[DgSet]) -> BillLine {
    let difference = if reading.closing > 0.0 {
        reading.closing - reading.opening
    } else {
        0.0
    };
    let units = difference * reading.meter_multiplier;
    let energy_amount = units * reading.rate;

    let charging: Vec<&DgSet> = dg_sets
        .iter()
        .filter(|dg| dg.charges(&reading.tenant_id))
        .collect();
    let dg_charge: f64 = charging.iter().map(|dg| units * dg.cost_per_unit).sum();

    let transformer_loss = energy_amount * reading.transformer_loss_percent / 100.0;
    let total = energy_amount + reading.fixed_charge + transformer_loss + dg_charge;

    BillLine {
        tenant_id: reading.tenant_id.clone(),
        meter_id: reading.meter_id.clone(),
        opening: reading.opening,
        closing: reading.closing,
        difference,
        meter_multiplier: reading.meter_multiplier,
        units,
        rate: reading.rate,
        energy_amount,
        fixed_charge: reading.fixed_charge,
        transformer_loss,
        dg_charge,
        total,
        mapped_to_dg: !charging.is_empty(),
        dg_mappings: charging.len(),
    }
}

/// One line per tenant in roster order, plus the column totals.
pub fn allocate_period(period: &BillingPeriod) -> Allocation {
    let mut totals = StatementTotals::default();
    let lines: Vec<BillLine> = period
        .readings
        .iter()
        .map(|r| {
            let line = allocate_tenant(r, &period.dg_sets);
            totals.add(&line);
            line
        })
        .collect();
    Allocation { lines, totals }
}
