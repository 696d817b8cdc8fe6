//! Cycle rollover: next month's Draft derived from a finalized period.

use chrono::Month;
use std::collections::BTreeSet;
use subbill_core::{
    capture::ReadingCapture,
    clock::{FixedClock, SequentialIds},
    config::{CycleConfig, DgSetTemplate},
    engine::{CycleEngine, EngineOptions},
    error::BillingError,
    inputs::{DgSetUpdate, MasterBillEntry},
    period::{AllocationMethod, BillingPeriod, ReadingFlag, WorkflowStatus},
    rollover::rollover,
    roster::TenantProfile,
    workflow::{Role, Transition},
};

fn roster() -> Vec<TenantProfile> {
    vec![
        TenantProfile::new("Croma", "M-CRO").with_opening(100.0).with_multiplier(30.0),
        TenantProfile::new("Zudio", "M-ZUD").with_opening(100.0).with_fixed_charge(40670.0),
        TenantProfile::new("Zori", "M-ZOR").with_opening(7.0).with_rate(12.0),
    ]
}

fn finalized(month: Month, year: i32) -> BillingPeriod {
    let mut p = BillingPeriod::from_roster(month, year, &roster(), &CycleConfig::default()).unwrap();
    let croma = p.reading_mut("Croma").unwrap();
    croma.closing = 150.0;
    croma.units = 1500.0;
    croma.is_captured = true;
    croma.flag = ReadingFlag::Spike;
    croma.remarks = Some("meter replaced".into());
    croma.photo = Some("photos/croma.jpg".into());
    p.master_bill.total_units = 5000.0;
    p.master_bill.uploaded = true;
    p.solar.units_generated = 300.0;
    p.solar.allocation_method = AllocationMethod::Custom;
    p.dg_sets[0].units = 40.0;
    p.dg_sets[0].mapped_tenants.push("Croma".into());
    p.status = WorkflowStatus::Finalized;
    p
}

#[test]
fn captured_closing_becomes_next_opening() {
    let next = rollover(&finalized(Month::April, 2025), &CycleConfig::default()).unwrap();
    let croma = next.reading("Croma").unwrap();
    assert_eq!(croma.opening, 150.0);
    assert_eq!(croma.closing, 0.0);
    assert_eq!(croma.units, 0.0);
    assert!(!croma.is_captured);
    assert_eq!(croma.flag, ReadingFlag::Normal);
    assert!(croma.remarks.is_none());
    assert!(croma.photo.is_none());
}

#[test]
fn uncaptured_opening_carries_forward() {
    let next = rollover(&finalized(Month::April, 2025), &CycleConfig::default()).unwrap();
    assert_eq!(next.reading("Zudio").unwrap().opening, 100.0);
    assert_eq!(next.reading("Zori").unwrap().opening, 7.0);
}

#[test]
fn roster_is_preserved() {
    let prev = finalized(Month::April, 2025);
    let next = rollover(&prev, &CycleConfig::default()).unwrap();

    let before: BTreeSet<_> = prev.tenant_ids().into_iter().collect();
    let after: BTreeSet<_> = next.tenant_ids().into_iter().collect();
    assert_eq!(before, after);

    let zudio = next.reading("Zudio").unwrap();
    assert_eq!(zudio.fixed_charge, 40670.0);
    assert_eq!(next.reading("Croma").unwrap().meter_multiplier, 30.0);
    assert_eq!(next.reading("Zori").unwrap().rate, 12.0);
}

#[test]
fn inputs_and_status_reset() {
    let next = rollover(&finalized(Month::April, 2025), &CycleConfig::default()).unwrap();
    assert_eq!(next.status, WorkflowStatus::Draft);
    assert!(next.rejection_remarks.is_none());
    assert_eq!(next.master_bill.total_units, 0.0);
    assert!(!next.master_bill.uploaded);
    assert_eq!(next.solar.units_generated, 0.0);
    assert_eq!(next.solar.allocation_method, AllocationMethod::CommonFirst);
    assert_eq!(next.dg_sets.len(), 3);
    assert!(next.dg_sets.iter().all(|d| d.units == 0.0 && d.mapped_tenants.is_empty()));
}

#[test]
fn dg_sets_come_from_config() {
    let config = CycleConfig {
        dg_sets: vec![DgSetTemplate { id: "Backup".into(), cost_per_unit: 18.5 }],
        ..CycleConfig::default()
    };
    let next = rollover(&finalized(Month::April, 2025), &config).unwrap();
    assert_eq!(next.dg_sets.len(), 1);
    assert_eq!(next.dg_sets[0].id, "Backup");
    assert_eq!(next.dg_sets[0].cost_per_unit, 18.5);
}

#[test]
fn december_rolls_into_next_year() {
    let next = rollover(&finalized(Month::December, 2025), &CycleConfig::default()).unwrap();
    assert_eq!(next.month, Month::January);
    assert_eq!(next.year, 2026);
    assert_eq!(next.period_key(), "2026-01");
}

#[test]
fn mid_year_keeps_year() {
    let next = rollover(&finalized(Month::June, 2025), &CycleConfig::default()).unwrap();
    assert_eq!(next.month, Month::July);
    assert_eq!(next.year, 2025);
}

#[test]
fn only_finalized_periods_roll_over() {
    for status in [
        WorkflowStatus::Draft,
        WorkflowStatus::Submitted,
        WorkflowStatus::Approved,
        WorkflowStatus::Locked,
    ] {
        let mut p = finalized(Month::April, 2025);
        p.status = status;
        let err = rollover(&p, &CycleConfig::default()).unwrap_err();
        assert!(
            matches!(err, BillingError::InvalidTransition { attempted: Transition::Rollover, .. }),
            "{status} should not roll over"
        );
    }
}

#[test]
fn engine_runs_two_consecutive_cycles() {
    let config = CycleConfig::default();
    let seed = BillingPeriod::from_roster(Month::November, 2025, &roster(), &config).unwrap();
    let options = EngineOptions::default()
        .with_clock(FixedClock::at_date(2025, 11, 30))
        .with_ids(SequentialIds::new());
    let mut e = CycleEngine::new("plaza", config, seed, options).unwrap();

    for closing in [110.0, 125.0] {
        e.capture(Role::ReadingTaker, ReadingCapture::new("Zudio", closing)).unwrap();
        e.update_dg_set(
            Role::Admin,
            "DG Set 2",
            DgSetUpdate { units: 12.0, fuel_cost: 900.0, cost_per_unit: 1.0 },
        )
        .unwrap();
        e.set_master_bill(
            Role::Admin,
            MasterBillEntry { total_units: 20.0, energy_charges: 0.0, fixed_charges: 0.0, taxes: 0.0 },
        )
        .unwrap();
        e.submit(Role::ReadingTaker).unwrap();
        e.approve(Role::Admin).unwrap();
        e.finalize(Role::Admin).unwrap();

        assert!(matches!(
            e.start_next_cycle(Role::ReadingTaker).unwrap_err(),
            BillingError::Unauthorized { .. }
        ));
        e.start_next_cycle(Role::Admin).unwrap();
        assert_eq!(e.status(), WorkflowStatus::Draft);
        assert_eq!(e.period().reading("Zudio").unwrap().opening, closing);
        assert!(e.last_statement().is_none());
    }
    assert_eq!(e.period().period_key(), "2026-01");
}

#[test]
fn draft_cannot_start_next_cycle() {
    let config = CycleConfig::default();
    let seed = BillingPeriod::from_roster(Month::April, 2025, &roster(), &config).unwrap();
    let mut e = CycleEngine::new("plaza", config, seed, EngineOptions::default()).unwrap();
    let err = e.start_next_cycle(Role::Admin).unwrap_err();
    assert!(matches!(err, BillingError::InvalidTransition { current: WorkflowStatus::Draft, .. }));
    assert_eq!(e.period().period_key(), "2025-04");
}
