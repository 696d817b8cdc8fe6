//! Roster management and the administrator's utility inputs.

use chrono::Month;
use subbill_core::{
    capture::ReadingCapture,
    config::{CycleConfig, DgSetTemplate},
    engine::{CycleEngine, EngineOptions},
    error::BillingError,
    event::CycleEvent,
    inputs::{DgSetUpdate, MasterBillEntry},
    period::{AllocationMethod, BillingPeriod, ReadingFlag, WorkflowStatus},
    roster::{self, validate_roster, TenantProfile},
    workflow::Role,
};

fn roster() -> Vec<TenantProfile> {
    vec![
        TenantProfile::new("Croma", "M-CRO").with_opening(100.0).with_multiplier(30.0),
        TenantProfile::new("Reliance", "M-REL").with_opening(40.0).with_dg_hint(true),
    ]
}

fn engine() -> CycleEngine {
    let config = CycleConfig::default();
    let period = BillingPeriod::from_roster(Month::August, 2025, &roster(), &config).unwrap();
    CycleEngine::new("plaza", config, period, EngineOptions::default()).unwrap()
}

// ── Roster ──────────────────────────────────────────────────────────

#[test]
fn roster_file_shape_parses() {
    let raw = r#"{
        "tenantId": "Zudio", "meterId": "M-ZUD", "opening": 12.5, "meterCT": 30,
        "sanctionedLoad": "1.5 kva/sqm", "fixedCharge": 40670,
        "transformerLossPercentage": 0, "hasDGCharge": true
    }"#;
    let profile: TenantProfile = serde_json::from_str(raw).unwrap();
    assert_eq!(profile.meter_multiplier, 30.0);
    assert_eq!(profile.rate, None);
    assert!(profile.has_dg_charge);

    let period =
        BillingPeriod::from_roster(Month::January, 2025, &[profile], &CycleConfig::default()).unwrap();
    assert_eq!(period.readings[0].rate, 10.2);
}

#[test]
fn duplicate_or_blank_ids_are_invalid() {
    let dup = vec![TenantProfile::new("A", "M1"), TenantProfile::new("A ", "M2")];
    assert!(matches!(validate_roster(&dup), Err(BillingError::Validation(_))));

    let blank = vec![TenantProfile::new("  ", "M1")];
    assert!(validate_roster(&blank).is_err());

    let nan = vec![TenantProfile::new("A", "M1").with_fixed_charge(f64::NAN)];
    assert!(validate_roster(&nan).is_err());
}

#[test]
fn non_positive_multiplier_is_invalid() {
    for multiplier in [0.0, -30.0] {
        let profile = vec![TenantProfile::new("A", "M1").with_multiplier(multiplier)];
        assert!(matches!(validate_roster(&profile), Err(BillingError::Validation(_))));
    }
    let mut e = engine();
    let err = e
        .upsert_tenant(Role::Admin, Some("Croma"), TenantProfile::new("Croma", "M-CRO").with_multiplier(0.0))
        .unwrap_err();
    assert!(matches!(err, BillingError::Validation(_)));
    assert_eq!(e.period().reading("Croma").unwrap().meter_multiplier, 30.0);
}

#[test]
fn adding_a_tenant_is_admin_only() {
    let mut e = engine();
    let profile = TenantProfile::new("Zori", "M-ZOR").with_rate(12.0);

    let err = e.upsert_tenant(Role::ReadingTaker, None, profile.clone()).unwrap_err();
    assert!(matches!(err, BillingError::Unauthorized { .. }));

    let id = e.upsert_tenant(Role::Admin, None, profile).unwrap();
    assert_eq!(id, "Zori");
    assert_eq!(e.period().readings.len(), 3);
    assert_eq!(e.period().reading("Zori").unwrap().rate, 12.0);
}

#[test]
fn adding_a_duplicate_tenant_fails() {
    let mut e = engine();
    let err = e
        .upsert_tenant(Role::Admin, None, TenantProfile::new("Croma", "M-X"))
        .unwrap_err();
    assert!(matches!(err, BillingError::Validation(_)));
    assert_eq!(e.period().readings.len(), 2);
}

#[test]
fn editing_keeps_capture_and_renames_mappings() {
    let mut e = engine();
    e.capture(Role::ReadingTaker, ReadingCapture::new("Reliance", 45.0).with_remarks("ok"))
        .unwrap();
    e.toggle_dg_mapping(Role::Admin, "DG Set 1", "Reliance").unwrap();

    let renamed = TenantProfile::new("Reliance Trends", "M-REL")
        .with_opening(40.0)
        .with_rate(11.0);
    e.upsert_tenant(Role::Admin, Some("Reliance"), renamed).unwrap();

    let p = e.period();
    assert!(p.reading("Reliance").is_none());
    let r = p.reading("Reliance Trends").unwrap();
    assert!(r.is_captured);
    assert_eq!(r.closing, 45.0);
    assert_eq!(r.units, 5.0);
    assert_eq!(r.rate, 11.0);
    assert_eq!(r.remarks.as_deref(), Some("ok"));
    assert_eq!(p.dg_sets[0].mapped_tenants, vec!["Reliance Trends".to_string()]);
    // Roster order is kept.
    assert_eq!(p.readings[1].tenant_id, "Reliance Trends");
}

#[test]
fn correcting_opening_or_multiplier_reassesses_units() {
    let config = CycleConfig::default();
    let roster = vec![TenantProfile::new("Zudio", "M-ZUD").with_opening(100.0).with_multiplier(2.0)];
    let period = BillingPeriod::from_roster(Month::August, 2025, &roster, &config).unwrap();
    let mut e = CycleEngine::new("plaza", config, period, EngineOptions::default()).unwrap();
    e.capture(Role::ReadingTaker, ReadingCapture::new("Zudio", 150.0)).unwrap();
    assert_eq!(e.period().reading("Zudio").unwrap().units, 100.0);

    let corrected = TenantProfile::new("Zudio", "M-ZUD").with_opening(120.0).with_multiplier(2.0);
    e.upsert_tenant(Role::Admin, Some("Zudio"), corrected).unwrap();
    let r = e.period().reading("Zudio").unwrap();
    assert_eq!(r.closing, 150.0);
    assert_eq!(r.units, 60.0);
    assert_eq!(r.flag, ReadingFlag::Normal);

    // A large multiplier turns the same reading into a spike.
    let rescaled = TenantProfile::new("Zudio", "M-ZUD").with_opening(120.0).with_multiplier(200.0);
    e.upsert_tenant(Role::Admin, Some("Zudio"), rescaled).unwrap();
    let r = e.period().reading("Zudio").unwrap();
    assert_eq!(r.units, 6000.0);
    assert_eq!(r.flag, ReadingFlag::Spike);
}

#[test]
fn uncaptured_edit_keeps_zero_units() {
    let mut e = engine();
    e.upsert_tenant(Role::Admin, Some("Croma"), TenantProfile::new("Croma", "M-CRO").with_opening(90.0))
        .unwrap();
    let r = e.period().reading("Croma").unwrap();
    assert!(!r.is_captured);
    assert_eq!(r.units, 0.0);
}

#[test]
fn removing_a_tenant_prunes_mappings() {
    let mut e = engine();
    e.toggle_dg_mapping(Role::Admin, "DG Set 2", "Croma").unwrap();
    e.remove_tenant(Role::Admin, "Croma").unwrap();

    assert!(e.period().reading("Croma").is_none());
    assert!(e.period().dg_sets.iter().all(|d| d.mapped_tenants.is_empty()));
    assert!(matches!(
        e.remove_tenant(Role::Admin, "Croma").unwrap_err(),
        BillingError::UnknownTenant { .. }
    ));
}

#[test]
fn roster_is_frozen_after_submit() {
    let mut e = engine();
    e.capture(Role::ReadingTaker, ReadingCapture::new("Croma", 101.0)).unwrap();
    e.submit(Role::ReadingTaker).unwrap();

    let err = e.remove_tenant(Role::Admin, "Reliance").unwrap_err();
    assert!(matches!(err, BillingError::PeriodFrozen { status: WorkflowStatus::Submitted, .. }));
    assert!(roster::upsert_tenant(
        &mut e.period().clone(),
        None,
        &TenantProfile::new("New", "M-N"),
        10.2,
        &CycleConfig::default().flags,
    )
    .is_err());
}

// ── Utility inputs ──────────────────────────────────────────────────

#[test]
fn dg_updates_are_admin_only_and_validated() {
    let mut e = engine();
    let update = DgSetUpdate { units: 80.0, fuel_cost: 7200.0, cost_per_unit: 1.5 };

    assert!(matches!(
        e.update_dg_set(Role::ReadingTaker, "DG Set 1", update).unwrap_err(),
        BillingError::Unauthorized { .. }
    ));
    assert!(matches!(
        e.update_dg_set(Role::Admin, "DG Set 9", update).unwrap_err(),
        BillingError::UnknownDgSet { .. }
    ));
    assert!(matches!(
        e.update_dg_set(Role::Admin, "DG Set 1", DgSetUpdate { units: -1.0, ..update })
            .unwrap_err(),
        BillingError::Validation(_)
    ));

    e.update_dg_set(Role::Admin, "DG Set 1", update).unwrap();
    let dg = &e.period().dg_sets[0];
    assert_eq!(dg.units, 80.0);
    assert_eq!(dg.fuel_cost, 7200.0);
    assert_eq!(dg.cost_per_unit, 1.5);
}

#[test]
fn toggling_twice_unmaps() {
    let mut e = engine();
    assert!(e.toggle_dg_mapping(Role::Admin, "DG Set 1", "Croma").unwrap());
    assert!(!e.toggle_dg_mapping(Role::Admin, "DG Set 1", "Croma").unwrap());
    assert!(e.period().dg_sets[0].mapped_tenants.is_empty());

    let err = e.toggle_dg_mapping(Role::Admin, "DG Set 1", "Nobody").unwrap_err();
    assert!(matches!(err, BillingError::UnknownTenant { .. }));
}

#[test]
fn dual_mapping_is_allowed_and_reported() {
    let mut e = engine();
    e.toggle_dg_mapping(Role::Admin, "DG Set 1", "Reliance").unwrap();
    let events = e
        .execute(
            Role::Admin,
            subbill_core::command::CycleCommand::ToggleDgMapping {
                dg_id:     "DG Set 3".into(),
                tenant_id: "Reliance".into(),
            },
        )
        .unwrap();

    assert_eq!(e.dual_mapped_tenants(), vec!["Reliance".to_string()]);
    assert!(matches!(
        &events[..],
        [CycleEvent::DgMappingChanged { mapped: true, dual: true, .. }]
    ));
}

#[test]
fn inputs_stay_editable_during_review() {
    let mut e = engine();
    e.capture(Role::ReadingTaker, ReadingCapture::new("Croma", 101.0)).unwrap();
    e.submit(Role::ReadingTaker).unwrap();

    e.set_solar(Role::Admin, 250.0, AllocationMethod::ProRata, Some("inverter.pdf".into()))
        .unwrap();
    e.set_master_bill(
        Role::Admin,
        MasterBillEntry { total_units: 900.0, energy_charges: 9180.0, fixed_charges: 500.0, taxes: 90.0 },
    )
    .unwrap();

    let p = e.period();
    assert_eq!(p.solar.units_generated, 250.0);
    assert_eq!(p.solar.allocation_method, AllocationMethod::ProRata);
    assert_eq!(p.solar.evidence.as_deref(), Some("inverter.pdf"));
    assert!(p.master_bill.uploaded);
    assert_eq!(p.master_bill.energy_charges, 9180.0);
}

#[test]
fn negative_solar_is_rejected() {
    let mut e = engine();
    let err = e
        .set_solar(Role::Admin, -5.0, AllocationMethod::CommonFirst, None)
        .unwrap_err();
    assert!(matches!(err, BillingError::Validation(_)));
    assert_eq!(e.period().solar.units_generated, 0.0);
}

#[test]
fn configured_dg_sets_seed_the_period() {
    let config = CycleConfig {
        dg_sets: vec![
            DgSetTemplate { id: "North DG".into(), cost_per_unit: 22.0 },
            DgSetTemplate { id: "South DG".into(), cost_per_unit: 19.0 },
        ],
        ..CycleConfig::default()
    };
    let p = BillingPeriod::from_roster(Month::August, 2025, &roster(), &config).unwrap();
    let ids: Vec<&str> = p.dg_sets.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["North DG", "South DG"]);
    assert_eq!(p.dg_sets[1].cost_per_unit, 19.0);
}
