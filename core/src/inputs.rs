//! Utility inputs: DG sets, solar generation and the master bill.
//!
//! Administrator-only. Editable while Draft or Submitted so the bill can be
//! keyed in during review; frozen from Approved onward.

use crate::{
    error::{BillingError, BillingResult},
    period::{AllocationMethod, BillingPeriod, MasterBill, SolarInput},
    types::TenantId,
    workflow::{ensure_admin, ensure_mutable, Role},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DgSetUpdate {
    pub units:         f64,
    pub fuel_cost:     f64,
    pub cost_per_unit: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MasterBillEntry {
    pub total_units:    f64,
    pub energy_charges: f64,
    pub fixed_charges:  f64,
    pub taxes:          f64,
}

impl From<&MasterBill> for MasterBillEntry {
    fn from(bill: &MasterBill) -> Self {
        Self {
            total_units:    bill.total_units,
            energy_charges: bill.energy_charges,
            fixed_charges:  bill.fixed_charges,
            taxes:          bill.taxes,
        }
    }
}

fn check_amount(field: &str, value: f64) -> BillingResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(BillingError::Validation(format!(
            "{field} must be a non-negative number (got {value})"
        )));
    }
    Ok(())
}

fn guard(period: &BillingPeriod, role: Role, action: &str) -> BillingResult<()> {
    ensure_admin(role, action)?;
    ensure_mutable(period, action)
}

pub fn update_dg_set(
    period: &mut BillingPeriod,
    role: Role,
    dg_id: &str,
    update: DgSetUpdate,
) -> BillingResult<()> {
    guard(period, role, "edit DG sets")?;
    check_amount("DG units", update.units)?;
    check_amount("DG fuel cost", update.fuel_cost)?;
    check_amount("DG cost per unit", update.cost_per_unit)?;

    let dg = period
        .dg_set_mut(dg_id)
        .ok_or_else(|| BillingError::UnknownDgSet {
            dg_id: dg_id.to_string(),
        })?;
    dg.units         = update.units;
    dg.fuel_cost     = update.fuel_cost;
    dg.cost_per_unit = update.cost_per_unit;
    Ok(())
}

/// Flip a tenant's mapping on one DG set. Returns the new mapped state.
/// Mapping a tenant to several sets is allowed; see `dual_mapped_tenants`.
pub fn toggle_dg_mapping(
    period: &mut BillingPeriod,
    role: Role,
    dg_id: &str,
    tenant_id: &str,
) -> BillingResult<bool> {
    guard(period, role, "map tenants to DG sets")?;
    if period.reading(tenant_id).is_none() {
        return Err(BillingError::UnknownTenant {
            tenant_id: tenant_id.to_string(),
        });
    }
    let dg = period
        .dg_set_mut(dg_id)
        .ok_or_else(|| BillingError::UnknownDgSet {
            dg_id: dg_id.to_string(),
        })?;

    if dg.is_mapped(tenant_id) {
        dg.mapped_tenants.retain(|t| t != tenant_id);
        Ok(false)
    } else {
        dg.mapped_tenants.push(tenant_id.to_string());
        Ok(true)
    }
}

pub fn set_solar(
    period: &mut BillingPeriod,
    role: Role,
    units_generated: f64,
    allocation_method: AllocationMethod,
    evidence: Option<String>,
) -> BillingResult<()> {
    guard(period, role, "edit solar input")?;
    check_amount("solar units", units_generated)?;
    period.solar = SolarInput {
        units_generated,
        allocation_method,
        evidence,
    };
    Ok(())
}

/// Commit master bill figures. Marks the bill as uploaded.
pub fn set_master_bill(
    period: &mut BillingPeriod,
    role: Role,
    entry: MasterBillEntry,
) -> BillingResult<()> {
    guard(period, role, "edit the master bill")?;
    check_amount("total units", entry.total_units)?;
    check_amount("energy charges", entry.energy_charges)?;
    check_amount("fixed charges", entry.fixed_charges)?;
    check_amount("taxes", entry.taxes)?;
    period.master_bill = MasterBill {
        total_units:    entry.total_units,
        energy_charges: entry.energy_charges,
        fixed_charges:  entry.fixed_charges,
        taxes:          entry.taxes,
        uploaded:       true,
    };
    Ok(())
}

/// Tenants mapped to more than one DG set, in roster order.
/// Each mapping adds its own surcharge; this list is advisory only.
pub fn dual_mapped_tenants(period: &BillingPeriod) -> Vec<TenantId> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for dg in &period.dg_sets {
        for tenant in &dg.mapped_tenants {
            *counts.entry(tenant.as_str()).or_default() += 1;
        }
    }
    period
        .readings
        .iter()
        .filter(|r| counts.get(r.tenant_id.as_str()).copied().unwrap_or(0) > 1)
        .map(|r| r.tenant_id.clone())
        .collect()
}
