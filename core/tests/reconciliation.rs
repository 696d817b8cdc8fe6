//! Reconciliation of master bill, solar credit and DG output against the
//! tenant sub-meter total.

use chrono::Month;
use subbill_core::{
    capture::ReadingCapture,
    clock::{FixedClock, SequentialIds},
    config::CycleConfig,
    engine::{CycleEngine, EngineOptions},
    error::BillingError,
    inputs::MasterBillEntry,
    period::{AllocationMethod, BillingPeriod, ReadingFlag, WorkflowStatus},
    reconciliation::{reconcile, solar_credit, ReconWarning},
    roster::TenantProfile,
    statement::build_statement,
    workflow::Role,
};

const TOLERANCE: f64 = 10.0;

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-6,
        "expected {expected}, got {actual}"
    );
}

/// Two tenants with the given captured units; master, solar and one DG set
/// filled in.
fn period(master: f64, solar: f64, dg: f64, tenant_units: [f64; 2]) -> BillingPeriod {
    let roster = vec![
        TenantProfile::new("Croma", "M-CRO"),
        TenantProfile::new("Reliance", "M-REL"),
    ];
    let mut p = BillingPeriod::from_roster(Month::May, 2025, &roster, &CycleConfig::default()).unwrap();
    for (reading, units) in p.readings.iter_mut().zip(tenant_units) {
        reading.units = units;
        reading.closing = units;
        reading.is_captured = true;
    }
    p.master_bill.total_units = master;
    p.solar.units_generated = solar;
    p.dg_sets[0].units = dg;
    p
}

#[test]
fn reference_reconciliation() {
    let p = period(10000.0, 500.0, 200.0, [6000.0, 3000.0]);
    let r = reconcile(&p, TOLERANCE);

    assert_close(r.net_to_allocate, 9700.0);
    assert_close(r.tenant_units, 9000.0);
    assert_close(r.common_loss, 700.0);
    assert_close(r.loss_percentage, 7.0);
    assert!(!r.has_warnings(), "unexpected warnings: {:?}", r.warnings);
}

#[test]
fn dg_units_sum_across_sets() {
    let mut p = period(1000.0, 0.0, 10.0, [0.0, 0.0]);
    p.dg_sets[1].units = 15.0;
    p.dg_sets[2].units = 5.0;
    assert_close(reconcile(&p, TOLERANCE).dg_units, 30.0);
}

#[test]
fn missing_master_bill_keeps_ratio_finite() {
    let p = period(0.0, 0.0, 0.0, [5.0, 0.0]);
    let r = reconcile(&p, TOLERANCE);
    assert!(r.loss_percentage.is_finite());
    assert_close(r.loss_percentage, -500.0);
}

#[test]
fn empty_capture_warns() {
    let p = period(1000.0, 0.0, 0.0, [0.0, 0.0]);
    let r = reconcile(&p, TOLERANCE);
    assert!(r.warnings.contains(&ReconWarning::NoCapturedReadings));
}

#[test]
fn excess_loss_warns_but_reports() {
    let p = period(10000.0, 0.0, 0.0, [4000.0, 4000.0]);
    let r = reconcile(&p, TOLERANCE);
    assert_close(r.loss_percentage, 20.0);
    assert!(r.warnings.iter().any(|w| matches!(
        w,
        ReconWarning::LossBeyondTolerance { tolerance, .. } if *tolerance == TOLERANCE
    )));
}

#[test]
fn spikes_are_listed() {
    let mut p = period(10000.0, 0.0, 0.0, [4500.0, 4500.0]);
    p.readings[1].flag = ReadingFlag::Spike;
    let r = reconcile(&p, TOLERANCE);
    assert!(r.warnings.contains(&ReconWarning::UnresolvedSpike {
        tenant_ids: vec!["Reliance".to_string()],
    }));
}

#[test]
fn non_default_solar_method_is_credited_common_first() {
    let mut p = period(10000.0, 500.0, 0.0, [4500.0, 4500.0]);
    p.solar.allocation_method = AllocationMethod::ProRata;
    assert_close(solar_credit(&p.solar), 500.0);

    let r = reconcile(&p, TOLERANCE);
    assert_eq!(r.allocation_method, AllocationMethod::ProRata);
    assert!(r.warnings.contains(&ReconWarning::SolarPolicyNotApplied {
        method: AllocationMethod::ProRata,
    }));
}

#[test]
fn statements_require_approval() {
    let p = period(10000.0, 0.0, 0.0, [1.0, 1.0]);
    let err = build_statement(&p, "plaza", "stmt-1".into(), chrono::Utc::now(), TOLERANCE)
        .unwrap_err();
    assert!(matches!(err, BillingError::NotReconcilable { status: WorkflowStatus::Draft }));
}

#[test]
fn engine_publishes_reconciliation_after_approval() {
    let config = CycleConfig::default();
    let roster = vec![TenantProfile::new("Croma", "M-CRO").with_opening(100.0)];
    let seed = BillingPeriod::from_roster(Month::May, 2025, &roster, &config).unwrap();
    let options = EngineOptions::default()
        .with_clock(FixedClock::at_date(2025, 5, 31))
        .with_ids(SequentialIds::new());
    let mut engine = CycleEngine::new("plaza", config, seed, options).unwrap();

    engine
        .set_master_bill(
            Role::Admin,
            MasterBillEntry {
                total_units:    120.0,
                energy_charges: 1200.0,
                fixed_charges:  0.0,
                taxes:          0.0,
            },
        )
        .unwrap();
    engine.capture(Role::ReadingTaker, ReadingCapture::new("Croma", 200.0)).unwrap();

    // Preview is always available; the published view waits for approval.
    assert_close(engine.reconciliation_preview().common_loss, 20.0);
    assert!(matches!(
        engine.reconcile().unwrap_err(),
        BillingError::NotReconcilable { status: WorkflowStatus::Draft }
    ));
    assert!(engine.allocate().is_err());

    engine.submit(Role::ReadingTaker).unwrap();
    engine.approve(Role::Admin).unwrap();
    let summary = engine.reconcile().unwrap();
    assert_close(summary.loss_percentage, 20.0 / 120.0 * 100.0);

    let statement = engine.finalize(Role::Admin).unwrap();
    assert_eq!(statement.reconciliation, summary);
    assert_close(statement.grand_total(), 100.0 * 10.2);
    assert_eq!(engine.last_statement(), Some(&statement));
}
