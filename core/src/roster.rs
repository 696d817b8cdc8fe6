//! Tenant roster: seed profiles and in-cycle tenant management.
//!
//! Roster edits are administrator actions and only legal while the period
//! is Draft. Editing an existing tenant keeps its current-cycle capture data.

use crate::{
    capture::assess_reading,
    config::FlagThresholds,
    error::{BillingError, BillingResult},
    period::{BillingPeriod, Reading, WorkflowStatus},
    types::{MeterId, TenantId},
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A tenant as listed on the property roster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TenantProfile {
    pub tenant_id:        TenantId,
    pub meter_id:         MeterId,
    #[serde(default)]
    pub opening:          f64,
    #[serde(rename = "meterCT", alias = "meterMultiplier", default = "default_multiplier")]
    pub meter_multiplier: f64,
    /// Falls back to the configured default tariff when absent.
    #[serde(default)]
    pub rate:             Option<f64>,
    #[serde(default = "default_sanctioned_load")]
    pub sanctioned_load:  String,
    #[serde(default)]
    pub fixed_charge:     f64,
    #[serde(rename = "transformerLossPercentage", alias = "transformerLossPercent", default)]
    pub transformer_loss_percent: f64,
    #[serde(rename = "hasDGCharge", default)]
    pub has_dg_charge:    bool,
}

fn default_multiplier() -> f64 {
    1.0
}

fn default_sanctioned_load() -> String {
    "-".to_string()
}

impl TenantProfile {
    pub fn new(tenant_id: impl Into<TenantId>, meter_id: impl Into<MeterId>) -> Self {
        Self {
            tenant_id:        tenant_id.into(),
            meter_id:         meter_id.into(),
            opening:          0.0,
            meter_multiplier: default_multiplier(),
            rate:             None,
            sanctioned_load:  default_sanctioned_load(),
            fixed_charge:     0.0,
            transformer_loss_percent: 0.0,
            has_dg_charge:    false,
        }
    }

    pub fn with_opening(mut self, opening: f64) -> Self {
        self.opening = opening;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.meter_multiplier = multiplier;
        self
    }

    pub fn with_rate(mut self, rate: f64) -> Self {
        self.rate = Some(rate);
        self
    }

    pub fn with_fixed_charge(mut self, fixed_charge: f64) -> Self {
        self.fixed_charge = fixed_charge;
        self
    }

    pub fn with_transformer_loss(mut self, percent: f64) -> Self {
        self.transformer_loss_percent = percent;
        self
    }

    pub fn with_dg_hint(mut self, has_dg_charge: bool) -> Self {
        self.has_dg_charge = has_dg_charge;
        self
    }
}

/// Check a single profile's required fields and numbers.
pub fn validate_profile(profile: &TenantProfile) -> BillingResult<()> {
    if profile.tenant_id.trim().is_empty() || profile.meter_id.trim().is_empty() {
        return Err(BillingError::Validation(
            "tenant name and meter id are required".into(),
        ));
    }
    let numbers = [
        ("opening", profile.opening),
        ("meterCT", profile.meter_multiplier),
        ("fixedCharge", profile.fixed_charge),
        ("transformerLossPercentage", profile.transformer_loss_percent),
        ("rate", profile.rate.unwrap_or(0.0)),
    ];
    for (field, value) in numbers {
        if !value.is_finite() {
            return Err(BillingError::Validation(format!(
                "{field} must be a number for tenant '{}'",
                profile.tenant_id
            )));
        }
    }
    if profile.meter_multiplier <= 0.0 {
        return Err(BillingError::Validation(format!(
            "meterCT must be positive for tenant '{}'",
            profile.tenant_id
        )));
    }
    Ok(())
}

/// Validate a whole roster: every profile valid, tenant ids unique.
pub fn validate_roster(profiles: &[TenantProfile]) -> BillingResult<()> {
    let mut seen = HashSet::new();
    for profile in profiles {
        validate_profile(profile)?;
        if !seen.insert(profile.tenant_id.trim()) {
            return Err(BillingError::Validation(format!(
                "duplicate tenant id '{}'",
                profile.tenant_id
            )));
        }
    }
    Ok(())
}

fn ensure_draft(period: &BillingPeriod, action: &str) -> BillingResult<()> {
    if period.status != WorkflowStatus::Draft {
        return Err(BillingError::PeriodFrozen {
            status: period.status,
            action: action.to_string(),
        });
    }
    Ok(())
}

/// Add a tenant, or update the one currently named `editing`.
/// Returns the tenant id the row ends up with. A captured reading is
/// re-assessed against the edited opening and multiplier.
pub fn upsert_tenant(
    period: &mut BillingPeriod,
    editing: Option<&str>,
    profile: &TenantProfile,
    default_rate: f64,
    thresholds: &FlagThresholds,
) -> BillingResult<TenantId> {
    ensure_draft(period, "edit tenants")?;
    validate_profile(profile)?;

    let new_id = profile.tenant_id.trim().to_string();
    let collides = period
        .readings
        .iter()
        .any(|r| r.tenant_id == new_id && Some(r.tenant_id.as_str()) != editing);
    if collides {
        return Err(BillingError::Validation(format!(
            "tenant id '{new_id}' already exists"
        )));
    }

    let mut updated = Reading::from_profile(profile, default_rate);

    match editing {
        Some(old_id) => {
            let existing = period
                .reading_mut(old_id)
                .ok_or_else(|| BillingError::UnknownTenant {
                    tenant_id: old_id.to_string(),
                })?;
            // Current-cycle capture data survives a profile edit.
            updated.closing     = existing.closing;
            updated.units       = existing.units;
            updated.flag        = existing.flag;
            updated.is_captured = existing.is_captured;
            if existing.is_captured {
                let assessment = assess_reading(
                    updated.opening,
                    updated.closing,
                    updated.meter_multiplier,
                    thresholds,
                );
                updated.units = assessment.units;
                updated.flag  = assessment.flag;
            }
            updated.remarks     = existing.remarks.take();
            updated.photo       = existing.photo.take();
            *existing = updated;

            if old_id != new_id {
                for dg in &mut period.dg_sets {
                    for mapped in dg.mapped_tenants.iter_mut().filter(|t| t.as_str() == old_id) {
                        *mapped = new_id.clone();
                    }
                }
            }
        }
        None => period.readings.push(updated),
    }

    Ok(new_id)
}

/// Drop a tenant from the current cycle and from every DG mapping.
pub fn remove_tenant(period: &mut BillingPeriod, tenant_id: &str) -> BillingResult<()> {
    ensure_draft(period, "remove tenants")?;
    let before = period.readings.len();
    period.readings.retain(|r| r.tenant_id != tenant_id);
    if period.readings.len() == before {
        return Err(BillingError::UnknownTenant {
            tenant_id: tenant_id.to_string(),
        });
    }
    for dg in &mut period.dg_sets {
        dg.mapped_tenants.retain(|t| t != tenant_id);
    }
    Ok(())
}
