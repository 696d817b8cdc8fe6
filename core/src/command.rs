use crate::{
    capture::ReadingCapture,
    inputs::MasterBillEntry,
    period::AllocationMethod,
    roster::TenantProfile,
    types::TenantId,
};
use serde::{Deserialize, Serialize};

/// Every mutation an operator can issue against the current period.
/// Variants are added over time, never removed or reordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum CycleCommand {
    // ── Field capture ─────────────────────────────
    CaptureReading(ReadingCapture),

    // ── Workflow ──────────────────────────────────
    Submit,
    Approve,
    /// `reason: None` means the operator withheld a reason.
    Reject {
        #[serde(default)]
        reason: Option<String>,
    },
    Finalize,
    StartNextCycle,

    // ── Roster ────────────────────────────────────
    UpsertTenant {
        #[serde(default)]
        editing: Option<TenantId>,
        profile: TenantProfile,
    },
    RemoveTenant {
        tenant_id: TenantId,
    },

    // ── Utility inputs ────────────────────────────
    UpdateDgSet {
        dg_id:         String,
        units:         f64,
        fuel_cost:     f64,
        cost_per_unit: f64,
    },
    ToggleDgMapping {
        dg_id:     String,
        tenant_id: TenantId,
    },
    SetSolar {
        units_generated: f64,
        #[serde(default)]
        allocation_method: AllocationMethod,
        #[serde(default)]
        evidence: Option<String>,
    },
    SetMasterBill(MasterBillEntry),
}

impl CycleCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CaptureReading(_)    => "capture_reading",
            Self::Submit               => "submit",
            Self::Approve              => "approve",
            Self::Reject { .. }        => "reject",
            Self::Finalize             => "finalize",
            Self::StartNextCycle       => "start_next_cycle",
            Self::UpsertTenant { .. }  => "upsert_tenant",
            Self::RemoveTenant { .. }  => "remove_tenant",
            Self::UpdateDgSet { .. }   => "update_dg_set",
            Self::ToggleDgMapping { .. } => "toggle_dg_mapping",
            Self::SetSolar { .. }      => "set_solar",
            Self::SetMasterBill(_)     => "set_master_bill",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_parse_from_ipc_json() {
        let cmd: CycleCommand = serde_json::from_str(
            r#"{ "cmd": "capture_reading", "tenant_id": "Croma", "closing": 1250.5 }"#,
        )
        .unwrap();
        assert_eq!(cmd, CycleCommand::CaptureReading(ReadingCapture::new("Croma", 1250.5)));

        let cmd: CycleCommand = serde_json::from_str(r#"{ "cmd": "reject" }"#).unwrap();
        assert_eq!(cmd, CycleCommand::Reject { reason: None });

        let cmd: CycleCommand = serde_json::from_str(
            r#"{ "cmd": "update_dg_set", "dg_id": "DG Set 1", "units": 300, "fuel_cost": 9000, "cost_per_unit": 1.5 }"#,
        )
        .unwrap();
        assert_eq!(cmd.name(), "update_dg_set");
    }

    #[test]
    fn unknown_allocation_method_is_rejected() {
        let parsed = serde_json::from_str::<CycleCommand>(
            r#"{ "cmd": "set_solar", "units_generated": 10, "allocation_method": "Greedy" }"#,
        );
        assert!(parsed.is_err());
    }
}
