//! The billing period document, the sole unit of persisted state.
//!
//! Field names follow the stored JSON document so the same bytes can be
//! written locally and replicated to the remote store.

use crate::{
    config::{CycleConfig, DgSetTemplate},
    error::BillingResult,
    roster::{self, TenantProfile},
    types::{MeterId, TenantId, Year},
};
use chrono::Month;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum WorkflowStatus {
    Draft,
    Submitted,
    Approved,
    /// Reserved. Valid in stored documents but never entered by the workflow.
    Locked,
    Finalized,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft     => "Draft",
            Self::Submitted => "Submitted",
            Self::Approved  => "Approved",
            Self::Locked    => "Locked",
            Self::Finalized => "Finalized",
        }
    }

    /// Approved and later states are read-only except for explicit transitions.
    pub fn is_frozen(&self) -> bool {
        match self {
            Self::Draft | Self::Submitted => false,
            Self::Approved | Self::Locked | Self::Finalized => true,
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum ReadingFlag {
    #[default]
    Normal,
    Zero,
    Spike,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum AllocationMethod {
    #[default]
    CommonFirst,
    ProRata,
    Custom,
}

/// One tenant's sub-meter record for the period.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    pub tenant_id:        TenantId,
    pub meter_id:         MeterId,
    pub opening:          f64,
    pub closing:          f64,
    pub units:            f64,
    #[serde(rename = "meterCT", alias = "meterMultiplier")]
    pub meter_multiplier: f64,
    pub rate:             f64,
    pub sanctioned_load:  String,
    pub fixed_charge:     f64,
    #[serde(rename = "transformerLossPercentage", alias = "transformerLossPercent")]
    pub transformer_loss_percent: f64,
    /// Display hint only; DG charges follow `DgSet::mapped_tenants`.
    #[serde(rename = "hasDGCharge", default)]
    pub has_dg_charge:    bool,
    #[serde(default)]
    pub is_captured:      bool,
    #[serde(default)]
    pub flag:             ReadingFlag,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remarks:          Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo:            Option<String>,
}

impl Reading {
    /// Fresh, uncaptured row for a roster entry.
    pub fn from_profile(profile: &TenantProfile, default_rate: f64) -> Self {
        Self {
            tenant_id:        profile.tenant_id.trim().to_string(),
            meter_id:         profile.meter_id.trim().to_string(),
            opening:          profile.opening,
            closing:          0.0,
            units:            0.0,
            meter_multiplier: profile.meter_multiplier,
            rate:             profile.rate.unwrap_or(default_rate),
            sanctioned_load:  profile.sanctioned_load.clone(),
            fixed_charge:     profile.fixed_charge,
            transformer_loss_percent: profile.transformer_loss_percent,
            has_dg_charge:    profile.has_dg_charge,
            is_captured:      false,
            flag:             ReadingFlag::Normal,
            remarks:          None,
            photo:            None,
        }
    }
}

/// One diesel generator's allocation unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DgSet {
    pub id:             String,
    pub units:          f64,
    pub fuel_cost:      f64,
    /// Rate charged to mapped tenants; independent of `fuel_cost`.
    pub cost_per_unit:  f64,
    #[serde(default)]
    pub mapped_tenants: Vec<TenantId>,
}

impl DgSet {
    pub fn from_template(template: &DgSetTemplate) -> Self {
        Self {
            id:             template.id.clone(),
            units:          0.0,
            fuel_cost:      0.0,
            cost_per_unit:  template.cost_per_unit,
            mapped_tenants: Vec::new(),
        }
    }

    pub fn is_mapped(&self, tenant_id: &str) -> bool {
        self.mapped_tenants.iter().any(|t| t == tenant_id)
    }

    /// A set only charges its tenants once it has produced units this period.
    pub fn charges(&self, tenant_id: &str) -> bool {
        self.units > 0.0 && self.is_mapped(tenant_id)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SolarInput {
    pub units_generated:   f64,
    #[serde(default)]
    pub allocation_method: AllocationMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence:          Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MasterBill {
    pub total_units:    f64,
    pub energy_charges: f64,
    pub fixed_charges:  f64,
    pub taxes:          f64,
    #[serde(default)]
    pub uploaded:       bool,
}

/// One month of the sub-billing workflow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BillingPeriod {
    pub month:             Month,
    pub year:              Year,
    pub status:            WorkflowStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_remarks: Option<String>,
    pub readings:          Vec<Reading>,
    pub solar:             SolarInput,
    pub dg_sets:           Vec<DgSet>,
    #[serde(rename = "bill")]
    pub master_bill:       MasterBill,
}

impl BillingPeriod {
    /// Seed a Draft period from a tenant roster.
    pub fn from_roster(
        month: Month,
        year: Year,
        roster: &[TenantProfile],
        config: &CycleConfig,
    ) -> BillingResult<Self> {
        roster::validate_roster(roster)?;
        Ok(Self {
            month,
            year,
            status: WorkflowStatus::Draft,
            rejection_remarks: None,
            readings: roster
                .iter()
                .map(|p| Reading::from_profile(p, config.default_rate))
                .collect(),
            solar: SolarInput::default(),
            dg_sets: default_dg_sets(config),
            master_bill: MasterBill::default(),
        })
    }

    /// Stable `YYYY-MM` key for logs and storage.
    pub fn period_key(&self) -> String {
        format!("{}-{:02}", self.year, self.month.number_from_month())
    }

    pub fn is_frozen(&self) -> bool {
        self.status.is_frozen()
    }

    pub fn reading(&self, tenant_id: &str) -> Option<&Reading> {
        self.readings.iter().find(|r| r.tenant_id == tenant_id)
    }

    pub fn reading_mut(&mut self, tenant_id: &str) -> Option<&mut Reading> {
        self.readings.iter_mut().find(|r| r.tenant_id == tenant_id)
    }

    pub fn dg_set_mut(&mut self, dg_id: &str) -> Option<&mut DgSet> {
        self.dg_sets.iter_mut().find(|d| d.id == dg_id)
    }

    pub fn captured_count(&self) -> usize {
        self.readings.iter().filter(|r| r.is_captured).count()
    }

    pub fn tenant_ids(&self) -> Vec<TenantId> {
        self.readings.iter().map(|r| r.tenant_id.clone()).collect()
    }
}

pub(crate) fn default_dg_sets(config: &CycleConfig) -> Vec<DgSet> {
    config.dg_sets.iter().map(DgSet::from_template).collect()
}
