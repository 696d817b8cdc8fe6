//! Audit events for every committed change to a billing period.
//!
//! RULE: An event is recorded only after the change it describes has been
//! committed. Failed commands leave no events behind.

use crate::{
    capture::FlagAssessment,
    period::{AllocationMethod, ReadingFlag, WorkflowStatus},
    types::{OrgKey, StatementId, TenantId, Year},
};
use chrono::{DateTime, Month, Utc};
use serde::{Deserialize, Serialize};

/// Variants are added over time, never removed or reordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CycleEvent {
    // ── Period lifecycle ───────────────────────────
    PeriodInitialized {
        month:        Month,
        year:         Year,
        tenant_count: usize,
    },
    PeriodRestored {
        status: WorkflowStatus,
        source: String, // "store" | "remote"
    },
    CycleRolledOver {
        from_period:  String,
        to_period:    String,
        tenant_count: usize,
    },

    // ── Workflow ───────────────────────────────────
    StatusChanged {
        from: WorkflowStatus,
        to:   WorkflowStatus,
    },
    PeriodRejected {
        reason: String,
    },
    StatementGenerated {
        statement_id:   StatementId,
        grand_total:    f64,
        loss_percentage: f64,
        warning_count:  usize,
    },

    // ── Capture ────────────────────────────────────
    ReadingCaptured {
        tenant_id:        TenantId,
        closing:          f64,
        units:            f64,
        flag:             ReadingFlag,
        high_consumption: bool,
    },

    // ── Roster ─────────────────────────────────────
    TenantUpserted {
        tenant_id: TenantId,
        previous:  Option<TenantId>,
    },
    TenantRemoved {
        tenant_id: TenantId,
    },

    // ── Utility inputs ─────────────────────────────
    DgSetUpdated {
        dg_id:         String,
        units:         f64,
        cost_per_unit: f64,
    },
    DgMappingChanged {
        dg_id:     String,
        tenant_id: TenantId,
        mapped:    bool,
        dual:      bool,
    },
    SolarUpdated {
        units_generated:   f64,
        allocation_method: AllocationMethod,
    },
    MasterBillUpdated {
        total_units: f64,
    },

    // ── Sync ───────────────────────────────────────
    SyncFailed {
        operation: String, // "fetch" | "push"
        reason:    String,
    },
}

impl CycleEvent {
    pub fn reading_captured(tenant_id: &str, closing: f64, a: &FlagAssessment) -> Self {
        Self::ReadingCaptured {
            tenant_id:        tenant_id.to_string(),
            closing,
            units:            a.units,
            flag:             a.flag,
            high_consumption: a.high_consumption,
        }
    }
}

/// Extract a stable string name from a CycleEvent variant.
/// Used for the event_type column in cycle_event.
pub fn event_type_name(event: &CycleEvent) -> &'static str {
    match event {
        CycleEvent::PeriodInitialized { .. }  => "period_initialized",
        CycleEvent::PeriodRestored { .. }     => "period_restored",
        CycleEvent::CycleRolledOver { .. }    => "cycle_rolled_over",
        CycleEvent::StatusChanged { .. }      => "status_changed",
        CycleEvent::PeriodRejected { .. }     => "period_rejected",
        CycleEvent::StatementGenerated { .. } => "statement_generated",
        CycleEvent::ReadingCaptured { .. }    => "reading_captured",
        CycleEvent::TenantUpserted { .. }     => "tenant_upserted",
        CycleEvent::TenantRemoved { .. }      => "tenant_removed",
        CycleEvent::DgSetUpdated { .. }       => "dg_set_updated",
        CycleEvent::DgMappingChanged { .. }   => "dg_mapping_changed",
        CycleEvent::SolarUpdated { .. }       => "solar_updated",
        CycleEvent::MasterBillUpdated { .. }  => "master_bill_updated",
        CycleEvent::SyncFailed { .. }         => "sync_failed",
    }
}

/// The event log entry as persisted to SQLite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id:          Option<i64>,
    pub org_key:     OrgKey,
    pub period_key:  String,
    pub recorded_at: DateTime<Utc>,
    pub event_type:  String,
    pub payload:     String, // JSON-serialized CycleEvent
}

impl EventLogEntry {
    pub fn decode(&self) -> serde_json::Result<CycleEvent> {
        serde_json::from_str(&self.payload)
    }
}
