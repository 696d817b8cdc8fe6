//! cycle-runner: headless driver for the monthly sub-billing cycle.
//!
//! Usage:
//!   cycle-runner --org plaza-01 --db billing.db --data-dir ./data
//!   cycle-runner --org plaza-01 --remote-dir ./remote --ipc-mode

use anyhow::Result;
use std::env;
use std::io::{self, BufRead, Write};
use subbill_core::{
    allocation::Allocation,
    command::CycleCommand,
    config::CycleConfig,
    engine::{CycleEngine, EngineOptions},
    event::CycleEvent,
    period::{BillingPeriod, WorkflowStatus},
    reconciliation::ReconciliationSummary,
    store::CycleStore,
    sync::{DirectoryRemote, SyncStatus},
    workflow::Role,
};

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcCommand {
    GetState,
    Command { role: Role, command: CycleCommand },
    Quit,
}

#[derive(serde::Serialize)]
struct UiState<'a> {
    org_key:        &'a str,
    period_key:     String,
    revision:       u64,
    sync:           &'a SyncStatus,
    period:         &'a BillingPeriod,
    dual_mapped:    Vec<String>,
    reconciliation: ReconciliationSummary,
    allocation:     Option<Allocation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    events:         Option<Vec<CycleEvent>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error:          Option<String>,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let org = string_arg(&args, "--org").unwrap_or("default");
    let db = string_arg(&args, "--db").unwrap_or(":memory:");
    let data_dir = string_arg(&args, "--data-dir").unwrap_or("./data");
    let remote_dir = string_arg(&args, "--remote-dir");

    if !ipc_mode {
        println!("Sub-billing cycle runner");
        println!("  org:       {org}");
        println!("  db:        {db}");
        println!("  data_dir:  {data_dir}");
        println!("  remote:    {}", remote_dir.unwrap_or("(none)"));
        println!();
    }

    let config = CycleConfig::load(data_dir)?;
    let roster = CycleConfig::load_roster(data_dir)?;

    let store = if db == ":memory:" {
        CycleStore::in_memory()?
    } else {
        CycleStore::open(db)?
    };
    store.migrate()?;

    let mut options = EngineOptions::default().with_store(store);
    if let Some(dir) = remote_dir {
        options = options.with_remote(DirectoryRemote::new(dir));
    }
    let mut engine = CycleEngine::bootstrap(org, config, &roster, options)?;

    if ipc_mode {
        run_ipc_loop(&mut engine)?;
    } else {
        print_summary(&engine);
    }
    Ok(())
}

fn run_ipc_loop(engine: &mut CycleEngine) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }
        if buffer.trim().is_empty() {
            continue;
        }

        let cmd: IpcCommand = match serde_json::from_str(&buffer) {
            Ok(c) => c,
            Err(e) => {
                let err_json = serde_json::json!({ "error": e.to_string() });
                writeln!(stdout, "{err_json}")?;
                stdout.flush()?;
                continue;
            }
        };

        let state = match cmd {
            IpcCommand::Quit => break,
            IpcCommand::GetState => build_ui_state(engine, None, None),
            IpcCommand::Command { role, command } => {
                log::debug!("ipc: {} as {role}", command.name());
                match engine.execute(role, command) {
                    Ok(events) => build_ui_state(engine, Some(events), None),
                    Err(e) => build_ui_state(engine, None, Some(e.to_string())),
                }
            }
        };
        writeln!(stdout, "{}", serde_json::to_string(&state)?)?;
        stdout.flush()?;
    }
    Ok(())
}

fn build_ui_state(
    engine: &CycleEngine,
    events: Option<Vec<CycleEvent>>,
    error: Option<String>,
) -> UiState<'_> {
    UiState {
        org_key: &engine.org_key,
        period_key: engine.period().period_key(),
        revision: engine.revision(),
        sync: engine.sync_status(),
        period: engine.period(),
        dual_mapped: engine.dual_mapped_tenants(),
        reconciliation: engine.reconciliation_preview(),
        allocation: engine.allocate().ok(),
        events,
        error,
    }
}

fn print_summary(engine: &CycleEngine) {
    let period = engine.period();
    println!("=== CYCLE SUMMARY ===");
    println!("  period:     {}", period.period_key());
    println!("  status:     {}", period.status);
    println!("  revision:   {}", engine.revision());
    println!("  tenants:    {}", period.readings.len());
    println!("  captured:   {}", period.captured_count());
    if let SyncStatus::Failed { reason } = engine.sync_status() {
        println!("  sync:       failed ({reason})");
    }
    if let Some(remarks) = &period.rejection_remarks {
        println!("  rejected:   {remarks}");
    }

    let recon = engine.reconciliation_preview();
    println!();
    println!("=== RECONCILIATION ===");
    println!("  master units:   {:.2}", recon.master_units);
    println!("  solar credit:   {:.2}", recon.solar_credit);
    println!("  DG units:       {:.2}", recon.dg_units);
    println!("  tenant units:   {:.2}", recon.tenant_units);
    println!("  net to allocate:{:.2}", recon.net_to_allocate);
    println!("  common loss:    {:.2} ({:.2}%)", recon.common_loss, recon.loss_percentage);
    for warning in &recon.warnings {
        println!("  ! {}", warning.message());
    }

    if period.status == WorkflowStatus::Draft || period.status == WorkflowStatus::Submitted {
        return;
    }
    if let Ok(allocation) = engine.allocate() {
        println!();
        println!("=== TENANT BILLS ===");
        for line in &allocation.lines {
            println!(
                "  {:<12} {:>10.2} units | energy {:>10.2} | DG {:>8.2} | total {:>10.2}",
                line.tenant_id, line.units, line.energy_amount, line.dg_charge, line.total
            );
        }
        println!("  grand total: {:.2}", allocation.totals.grand_total);
    }
}

fn string_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}
