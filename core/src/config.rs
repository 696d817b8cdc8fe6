use crate::{roster::TenantProfile, types::Year};
use chrono::Month;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Anomaly thresholds applied when a closing reading is captured.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FlagThresholds {
    /// Units above this are stored as `Spike`.
    pub spike_units: f64,
    /// Units above this raise a non-blocking operator advisory.
    pub advisory_units: f64,
}

impl Default for FlagThresholds {
    fn default() -> Self {
        Self {
            spike_units:    5000.0,
            advisory_units: 2000.0,
        }
    }
}

/// Shape of a DG set as it appears at the start of every cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DgSetTemplate {
    pub id: String,
    #[serde(default = "default_dg_cost_per_unit")]
    pub cost_per_unit: f64,
}

fn default_dg_cost_per_unit() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CycleConfig {
    #[serde(default)]
    pub flags: FlagThresholds,
    /// Common/loss percentage above which reconciliation warns.
    #[serde(default = "default_loss_tolerance")]
    pub loss_tolerance_percent: f64,
    /// Tariff applied to roster entries that omit a rate.
    #[serde(default = "default_rate")]
    pub default_rate: f64,
    #[serde(default = "default_dg_sets")]
    pub dg_sets: Vec<DgSetTemplate>,
    /// Month and year of the very first period seeded from the roster.
    #[serde(default = "default_first_month")]
    pub first_month: Month,
    #[serde(default = "default_first_year")]
    pub first_year: Year,
}

fn default_loss_tolerance() -> f64 {
    10.0
}

fn default_rate() -> f64 {
    10.2
}

fn default_dg_sets() -> Vec<DgSetTemplate> {
    (1..=3)
        .map(|n| DgSetTemplate {
            id:            format!("DG Set {n}"),
            cost_per_unit: default_dg_cost_per_unit(),
        })
        .collect()
}

fn default_first_month() -> Month {
    Month::January
}

fn default_first_year() -> Year {
    2025
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            flags:                  FlagThresholds::default(),
            loss_tolerance_percent: default_loss_tolerance(),
            default_rate:           default_rate(),
            dg_sets:                default_dg_sets(),
            first_month:            default_first_month(),
            first_year:             default_first_year(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RosterFile {
    tenants: Vec<TenantProfile>,
}

impl CycleConfig {
    /// Load `{data_dir}/cycle_config.json`. A missing file yields the defaults.
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let path = format!("{data_dir}/cycle_config.json");
        if !Path::new(&path).exists() {
            log::debug!("No {path}; using default cycle config");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Failed to read {path}: {e}"))?;
        let config: CycleConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Load the seed roster from `{data_dir}/roster.json`.
    pub fn load_roster(data_dir: &str) -> anyhow::Result<Vec<TenantProfile>> {
        let path = format!("{data_dir}/roster.json");
        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Failed to read {path}: {e}"))?;
        let file: RosterFile = serde_json::from_str(&content)?;
        Ok(file.tenants)
    }
}
