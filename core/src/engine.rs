//! The cycle engine: the explicit context every operation runs against.
//!
//! COMMIT ORDER (fixed, documented, never reordered):
//!   1. Clone the current period.
//!   2. Apply the pure operation to the clone.
//!   3. Persist document + events (+ statement) in one store transaction,
//!      checking the revision stamp.
//!   4. Swap the clone in as the current period.
//!   5. Push to the remote, if any. Failures only degrade the sync status.
//!
//! RULES:
//!   - A failing operation leaves the current period untouched.
//!   - Status is read from the engine's own copy at the moment of the call.
//!   - The engine never reads the system clock or mints ids itself.

use crate::{
    allocation::{allocate_period, Allocation},
    capture::{self, FlagAssessment, ReadingCapture},
    clock::{Clock, IdGenerator, SystemClock, UuidIds},
    command::CycleCommand,
    config::CycleConfig,
    error::{BillingError, BillingResult},
    event::{event_type_name, CycleEvent, EventLogEntry},
    extraction::{self, BillExtractor},
    inputs::{self, DgSetUpdate, MasterBillEntry},
    period::{AllocationMethod, BillingPeriod, MasterBill, WorkflowStatus},
    reconciliation::{reconcile, ReconciliationSummary},
    rollover,
    roster::{self, TenantProfile},
    statement::{build_statement, MonthlyStatement},
    store::CycleStore,
    sync::{RemoteSync, SyncStatus},
    types::OrgKey,
    workflow::{self, Role, Transition},
};

/// Collaborators injected into an engine.
pub struct EngineOptions {
    pub clock:  Box<dyn Clock>,
    pub ids:    Box<dyn IdGenerator>,
    pub store:  Option<CycleStore>,
    pub remote: Option<Box<dyn RemoteSync>>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            clock:  Box::new(SystemClock),
            ids:    Box::new(UuidIds),
            store:  None,
            remote: None,
        }
    }
}

impl EngineOptions {
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_ids(mut self, ids: impl IdGenerator + 'static) -> Self {
        self.ids = Box::new(ids);
        self
    }

    pub fn with_store(mut self, store: CycleStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_remote(mut self, remote: impl RemoteSync + 'static) -> Self {
        self.remote = Some(Box::new(remote));
        self
    }
}

pub struct CycleEngine {
    pub org_key:    OrgKey,
    config:         CycleConfig,
    period:         BillingPeriod,
    revision:       u64,
    clock:          Box<dyn Clock>,
    ids:            Box<dyn IdGenerator>,
    store:          Option<CycleStore>,
    remote:         Option<Box<dyn RemoteSync>>,
    sync_status:    SyncStatus,
    journal:        Vec<CycleEvent>,
    last_statement: Option<MonthlyStatement>,
}

impl CycleEngine {
    /// Wrap an existing period. With a store attached the period is written
    /// as a new document and becomes the organization's current period.
    pub fn new(
        org_key: impl Into<OrgKey>,
        config: CycleConfig,
        period: BillingPeriod,
        options: EngineOptions,
    ) -> BillingResult<Self> {
        let mut engine = Self::assemble(org_key.into(), config, period, options);
        let event = CycleEvent::PeriodInitialized {
            month:        engine.period.month,
            year:         engine.period.year,
            tenant_count: engine.period.readings.len(),
        };
        let period = engine.period.clone();
        engine.commit_document(period, 0, vec![event], None)?;
        Ok(engine)
    }

    /// Resume the organization's current period: local store first, then the
    /// remote, otherwise seed the first period from the roster.
    pub fn bootstrap(
        org_key: impl Into<OrgKey>,
        config: CycleConfig,
        roster: &[TenantProfile],
        options: EngineOptions,
    ) -> BillingResult<Self> {
        let org_key = org_key.into();

        let stored = match &options.store {
            Some(store) => store.load_current(&org_key)?,
            None => None,
        };
        if let Some(stored) = stored {
            let mut engine = Self::assemble(org_key, config, stored.period, options);
            engine.revision = stored.revision;
            engine.record_local(CycleEvent::PeriodRestored {
                status: engine.period.status,
                source: "store".into(),
            });
            log::info!(
                "{}: resumed {} ({}) from local store",
                engine.org_key,
                engine.period.period_key(),
                engine.period.status
            );
            return Ok(engine);
        }

        let seed = BillingPeriod::from_roster(config.first_month, config.first_year, roster, &config)?;
        let mut engine = Self::assemble(org_key, config, seed, options);

        match engine.fetch_remote() {
            Some(remote_period) => {
                let event = CycleEvent::PeriodRestored {
                    status: remote_period.status,
                    source: "remote".into(),
                };
                engine.commit_document(remote_period, 0, vec![event], None)?;
                log::info!(
                    "{}: restored {} from remote",
                    engine.org_key,
                    engine.period.period_key()
                );
            }
            None => {
                let event = CycleEvent::PeriodInitialized {
                    month:        engine.period.month,
                    year:         engine.period.year,
                    tenant_count: engine.period.readings.len(),
                };
                let period = engine.period.clone();
                engine.commit_document(period, 0, vec![event], None)?;
                log::info!(
                    "{}: seeded {} with {} tenants",
                    engine.org_key,
                    engine.period.period_key(),
                    engine.period.readings.len()
                );
            }
        }
        Ok(engine)
    }

    fn assemble(
        org_key: OrgKey,
        config: CycleConfig,
        period: BillingPeriod,
        options: EngineOptions,
    ) -> Self {
        let sync_status = if options.remote.is_some() {
            SyncStatus::Idle
        } else {
            SyncStatus::LocalOnly
        };
        Self {
            org_key,
            config,
            period,
            revision: 0,
            clock: options.clock,
            ids: options.ids,
            store: options.store,
            remote: options.remote,
            sync_status,
            journal: Vec::new(),
            last_statement: None,
        }
    }

    // ── Accessors ──────────────────────────────────────────────────

    pub fn period(&self) -> &BillingPeriod {
        &self.period
    }

    pub fn status(&self) -> WorkflowStatus {
        self.period.status
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn config(&self) -> &CycleConfig {
        &self.config
    }

    pub fn sync_status(&self) -> &SyncStatus {
        &self.sync_status
    }

    /// Events recorded by this engine instance, oldest first.
    pub fn events(&self) -> &[CycleEvent] {
        &self.journal
    }

    pub fn store(&self) -> Option<&CycleStore> {
        self.store.as_ref()
    }

    /// The statement produced by the most recent `finalize` on this instance.
    pub fn last_statement(&self) -> Option<&MonthlyStatement> {
        self.last_statement.as_ref()
    }

    // ── Dispatch ───────────────────────────────────────────────────

    /// Run one operator command. Returns the events it produced.
    pub fn execute(&mut self, role: Role, command: CycleCommand) -> BillingResult<Vec<CycleEvent>> {
        let name = command.name();
        let before = self.journal.len();
        let result = match command {
            CycleCommand::CaptureReading(capture) => self.capture(role, capture).map(|_| ()),
            CycleCommand::Submit => self.submit(role),
            CycleCommand::Approve => self.approve(role),
            CycleCommand::Reject { reason } => self.reject(role, reason.as_deref()),
            CycleCommand::Finalize => self.finalize(role).map(|_| ()),
            CycleCommand::StartNextCycle => self.start_next_cycle(role),
            CycleCommand::UpsertTenant { editing, profile } => {
                self.upsert_tenant(role, editing.as_deref(), profile).map(|_| ())
            }
            CycleCommand::RemoveTenant { tenant_id } => self.remove_tenant(role, &tenant_id),
            CycleCommand::UpdateDgSet { dg_id, units, fuel_cost, cost_per_unit } => self
                .update_dg_set(role, &dg_id, DgSetUpdate { units, fuel_cost, cost_per_unit }),
            CycleCommand::ToggleDgMapping { dg_id, tenant_id } => {
                self.toggle_dg_mapping(role, &dg_id, &tenant_id).map(|_| ())
            }
            CycleCommand::SetSolar { units_generated, allocation_method, evidence } => {
                self.set_solar(role, units_generated, allocation_method, evidence)
            }
            CycleCommand::SetMasterBill(entry) => self.set_master_bill(role, entry),
        };
        if let Err(e) = &result {
            log::debug!("{}: command {name} by {role} refused: {e}", self.org_key);
        }
        result?;
        Ok(self.journal[before..].to_vec())
    }

    // ── Capture ────────────────────────────────────────────────────

    pub fn capture(&mut self, _role: Role, capture: ReadingCapture) -> BillingResult<FlagAssessment> {
        let thresholds = self.config.flags;
        let mut assessment = None;
        self.commit(|p| {
            let tenant_id = capture.tenant_id.clone();
            let closing = capture.closing;
            let a = capture::capture_reading(p, capture, &thresholds)?;
            assessment = Some(a);
            Ok(vec![CycleEvent::reading_captured(&tenant_id, closing, &a)])
        })?;
        assessment.ok_or_else(|| BillingError::Other(anyhow::anyhow!("capture produced no assessment")))
    }

    // ── Workflow ───────────────────────────────────────────────────

    pub fn submit(&mut self, role: Role) -> BillingResult<()> {
        self.transition(|p| workflow::submit(p, role))
    }

    pub fn approve(&mut self, role: Role) -> BillingResult<()> {
        self.transition(|p| workflow::approve(p, role))
    }

    /// `None` or a blank reason aborts the rejection.
    pub fn reject(&mut self, role: Role, reason: Option<&str>) -> BillingResult<()> {
        self.commit(|p| {
            let from = p.status;
            workflow::reject(p, role, reason)?;
            Ok(vec![
                CycleEvent::StatusChanged { from, to: p.status },
                CycleEvent::PeriodRejected {
                    reason: p.rejection_remarks.clone().unwrap_or_default(),
                },
            ])
        })
    }

    /// Close the period and generate its statement. Reconciliation warnings
    /// are carried on the statement; they never block.
    pub fn finalize(&mut self, role: Role) -> BillingResult<MonthlyStatement> {
        // Guard before minting an id so refused calls consume nothing.
        workflow::check_transition(&self.period, role, Transition::Finalize)?;

        let statement_id = self.ids.next_id("stmt");
        let generated_at = self.clock.now();

        let mut next = self.period.clone();
        let from = next.status;
        workflow::finalize(&mut next, role)?;
        let statement = build_statement(
            &next,
            &self.org_key,
            statement_id,
            generated_at,
            self.config.loss_tolerance_percent,
        )?;

        let events = vec![
            CycleEvent::StatusChanged { from, to: next.status },
            CycleEvent::StatementGenerated {
                statement_id:    statement.statement_id.clone(),
                grand_total:     statement.grand_total(),
                loss_percentage: statement.reconciliation.loss_percentage,
                warning_count:   statement.reconciliation.warnings.len(),
            },
        ];
        for warning in &statement.reconciliation.warnings {
            log::warn!("{}: {}", self.period.period_key(), warning.message());
        }

        self.commit_document(next, self.revision, events, Some(&statement))?;
        self.last_statement = Some(statement.clone());
        Ok(statement)
    }

    /// Derive next month's Draft from the finalized current period. The
    /// finalized period stays in the store as history.
    pub fn start_next_cycle(&mut self, role: Role) -> BillingResult<()> {
        workflow::ensure_admin(role, Transition::Rollover.as_str())?;
        let next = rollover::rollover(&self.period, &self.config)?;

        let event = CycleEvent::CycleRolledOver {
            from_period:  self.period.period_key(),
            to_period:    next.period_key(),
            tenant_count: next.readings.len(),
        };
        let expected = match &self.store {
            Some(store) => store
                .load_period(&self.org_key, &next.period_key())?
                .map_or(0, |s| s.revision),
            None => 0,
        };
        log::info!(
            "{}: rolled over {} -> {}",
            self.org_key,
            self.period.period_key(),
            next.period_key()
        );
        self.commit_document(next, expected, vec![event], None)?;
        self.last_statement = None;
        Ok(())
    }

    // ── Roster ─────────────────────────────────────────────────────

    pub fn upsert_tenant(
        &mut self,
        role: Role,
        editing: Option<&str>,
        profile: TenantProfile,
    ) -> BillingResult<String> {
        workflow::ensure_admin(role, "edit tenants")?;
        let default_rate = self.config.default_rate;
        let thresholds = self.config.flags;
        let mut tenant_id = String::new();
        self.commit(|p| {
            tenant_id = roster::upsert_tenant(p, editing, &profile, default_rate, &thresholds)?;
            Ok(vec![CycleEvent::TenantUpserted {
                tenant_id: tenant_id.clone(),
                previous:  editing.map(str::to_string),
            }])
        })?;
        Ok(tenant_id)
    }

    pub fn remove_tenant(&mut self, role: Role, tenant_id: &str) -> BillingResult<()> {
        workflow::ensure_admin(role, "remove tenants")?;
        self.commit(|p| {
            roster::remove_tenant(p, tenant_id)?;
            Ok(vec![CycleEvent::TenantRemoved {
                tenant_id: tenant_id.to_string(),
            }])
        })
    }

    // ── Utility inputs ─────────────────────────────────────────────

    pub fn update_dg_set(&mut self, role: Role, dg_id: &str, update: DgSetUpdate) -> BillingResult<()> {
        self.commit(|p| {
            inputs::update_dg_set(p, role, dg_id, update)?;
            Ok(vec![CycleEvent::DgSetUpdated {
                dg_id:         dg_id.to_string(),
                units:         update.units,
                cost_per_unit: update.cost_per_unit,
            }])
        })
    }

    /// Returns whether the tenant is mapped after the toggle.
    pub fn toggle_dg_mapping(&mut self, role: Role, dg_id: &str, tenant_id: &str) -> BillingResult<bool> {
        let mut mapped = false;
        self.commit(|p| {
            mapped = inputs::toggle_dg_mapping(p, role, dg_id, tenant_id)?;
            let dual = inputs::dual_mapped_tenants(p).iter().any(|t| t == tenant_id);
            Ok(vec![CycleEvent::DgMappingChanged {
                dg_id: dg_id.to_string(),
                tenant_id: tenant_id.to_string(),
                mapped,
                dual,
            }])
        })?;
        Ok(mapped)
    }

    pub fn set_solar(
        &mut self,
        role: Role,
        units_generated: f64,
        allocation_method: AllocationMethod,
        evidence: Option<String>,
    ) -> BillingResult<()> {
        self.commit(|p| {
            inputs::set_solar(p, role, units_generated, allocation_method, evidence)?;
            Ok(vec![CycleEvent::SolarUpdated {
                units_generated,
                allocation_method,
            }])
        })
    }

    pub fn set_master_bill(&mut self, role: Role, entry: MasterBillEntry) -> BillingResult<()> {
        self.commit(|p| {
            inputs::set_master_bill(p, role, entry)?;
            Ok(vec![CycleEvent::MasterBillUpdated {
                total_units: entry.total_units,
            }])
        })
    }

    /// Ask the document-understanding collaborator for bill figures. The
    /// result is a suggestion only; commit it with `set_master_bill`.
    pub fn prefill_master_bill(
        &self,
        extractor: &dyn BillExtractor,
        bytes: &[u8],
        media_type: &str,
    ) -> BillingResult<MasterBill> {
        let extracted = extraction::extract_bill(extractor, bytes, media_type)?;
        Ok(extracted.suggest(&self.period.master_bill))
    }

    // ── Read-only views ────────────────────────────────────────────

    /// Reconciliation over the current figures, whatever the status.
    pub fn reconciliation_preview(&self) -> ReconciliationSummary {
        reconcile(&self.period, self.config.loss_tolerance_percent)
    }

    /// Reconciliation of an approved (or later) period.
    pub fn reconcile(&self) -> BillingResult<ReconciliationSummary> {
        self.ensure_reconcilable()?;
        Ok(self.reconciliation_preview())
    }

    /// Per-tenant bill lines of an approved (or later) period.
    pub fn allocate(&self) -> BillingResult<Allocation> {
        self.ensure_reconcilable()?;
        Ok(allocate_period(&self.period))
    }

    pub fn dual_mapped_tenants(&self) -> Vec<String> {
        inputs::dual_mapped_tenants(&self.period)
    }

    fn ensure_reconcilable(&self) -> BillingResult<()> {
        match self.period.status {
            WorkflowStatus::Approved | WorkflowStatus::Locked | WorkflowStatus::Finalized => Ok(()),
            status @ (WorkflowStatus::Draft | WorkflowStatus::Submitted) => {
                Err(BillingError::NotReconcilable { status })
            }
        }
    }

    // ── Remote sync ────────────────────────────────────────────────

    /// Replace the current period with the remote document, if there is one.
    /// Returns `Ok(false)` when no remote is configured or it holds nothing.
    pub fn pull_remote(&mut self) -> BillingResult<bool> {
        let Some(remote) = self.remote.as_mut() else {
            return Ok(false);
        };
        let fetched = match remote.fetch(&self.org_key) {
            Ok(fetched) => fetched,
            Err(e) => {
                self.note_sync_failure("fetch", &e);
                return Err(e);
            }
        };
        let Some(remote_period) = fetched else {
            return Ok(false);
        };
        if self.period.is_frozen() && remote_period.period_key() == self.period.period_key() {
            return Err(BillingError::PeriodFrozen {
                status: self.period.status,
                action: "replace the period from the remote".into(),
            });
        }

        let expected = if remote_period.period_key() == self.period.period_key() {
            self.revision
        } else {
            match &self.store {
                Some(store) => store
                    .load_period(&self.org_key, &remote_period.period_key())?
                    .map_or(0, |s| s.revision),
                None => 0,
            }
        };
        let event = CycleEvent::PeriodRestored {
            status: remote_period.status,
            source: "remote".into(),
        };
        self.commit_document(remote_period, expected, vec![event], None)?;
        Ok(true)
    }

    /// Push the current period. A failure is recorded and returned; local
    /// state is unaffected.
    pub fn push_remote(&mut self) -> BillingResult<()> {
        let Some(remote) = self.remote.as_mut() else {
            return Ok(());
        };
        match remote.push(&self.org_key, &self.period) {
            Ok(()) => {
                self.sync_status = SyncStatus::Synced;
                Ok(())
            }
            Err(e) => {
                self.note_sync_failure("push", &e);
                Err(e)
            }
        }
    }

    fn fetch_remote(&mut self) -> Option<BillingPeriod> {
        let remote = self.remote.as_mut()?;
        match remote.fetch(&self.org_key) {
            Ok(found) => found,
            Err(e) => {
                self.note_sync_failure("fetch", &e);
                None
            }
        }
    }

    fn note_sync_failure(&mut self, operation: &str, error: &BillingError) {
        log::warn!(
            "{}: remote {operation} failed, continuing local-only: {error}",
            self.org_key
        );
        self.sync_status = SyncStatus::Failed {
            reason: error.to_string(),
        };
        let event = CycleEvent::SyncFailed {
            operation: operation.to_string(),
            reason:    error.to_string(),
        };
        if let Some(store) = &self.store {
            if let Ok(entry) = self.log_entry(&event) {
                if let Err(e) = store.append_event(&entry) {
                    log::warn!("{}: could not record sync failure: {e}", self.org_key);
                }
            }
        }
        self.journal.push(event);
    }

    // ── Commit pipeline ────────────────────────────────────────────

    fn transition<F>(&mut self, apply: F) -> BillingResult<()>
    where
        F: FnOnce(&mut BillingPeriod) -> BillingResult<()>,
    {
        self.commit(|p| {
            let from = p.status;
            apply(p)?;
            log::info!("{}: {} -> {}", p.period_key(), from, p.status);
            Ok(vec![CycleEvent::StatusChanged { from, to: p.status }])
        })
    }

    fn commit<F>(&mut self, apply: F) -> BillingResult<()>
    where
        F: FnOnce(&mut BillingPeriod) -> BillingResult<Vec<CycleEvent>>,
    {
        let mut next = self.period.clone();
        let events = apply(&mut next)?;
        self.commit_document(next, self.revision, events, None)
    }

    fn commit_document(
        &mut self,
        next: BillingPeriod,
        expected_revision: u64,
        events: Vec<CycleEvent>,
        statement: Option<&MonthlyStatement>,
    ) -> BillingResult<()> {
        // The same rule the store enforces, for store-less engines too.
        if self.revision > 0
            && self.period.status == WorkflowStatus::Finalized
            && next.period_key() == self.period.period_key()
        {
            return Err(BillingError::PeriodFrozen {
                status: WorkflowStatus::Finalized,
                action: "overwrite a finalized period".into(),
            });
        }
        let now = self.clock.now();
        if let Some(store) = &self.store {
            let period_key = next.period_key();
            let entries = events
                .iter()
                .map(|e| self.entry_for(&period_key, e, now))
                .collect::<BillingResult<Vec<_>>>()?;
            self.revision =
                store.commit_period(&self.org_key, &next, expected_revision, &entries, statement, now)?;
        } else {
            self.revision = expected_revision + 1;
        }

        log::debug!(
            "{}: committed {} rev={} ({} events)",
            self.org_key,
            next.period_key(),
            self.revision,
            events.len()
        );
        self.period = next;
        self.journal.extend(events);

        if self.remote.is_some() {
            // Failure is already recorded on the sync status.
            let _ = self.push_remote();
        }
        Ok(())
    }

    fn record_local(&mut self, event: CycleEvent) {
        self.journal.push(event);
    }

    fn log_entry(&self, event: &CycleEvent) -> BillingResult<EventLogEntry> {
        self.entry_for(&self.period.period_key(), event, self.clock.now())
    }

    fn entry_for(
        &self,
        period_key: &str,
        event: &CycleEvent,
        now: chrono::DateTime<chrono::Utc>,
    ) -> BillingResult<EventLogEntry> {
        Ok(EventLogEntry {
            id:          None,
            org_key:     self.org_key.clone(),
            period_key:  period_key.to_string(),
            recorded_at: now,
            event_type:  event_type_name(event).to_string(),
            payload:     serde_json::to_string(event)?,
        })
    }
}
