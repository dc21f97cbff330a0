//! igel-router - main entry point
//!
//! Parses the command line, builds the frozen configuration and dispatches to
//! the orchestrator or one of the read-only inspection commands.

use igel_router::cli::{self, Commands, Invocation, WifiCommands};
use igel_router::command_runner::{CommandRunner, SystemRunner};
use igel_router::config::{ConfigBuilder, ConfigStore, ProcessEnv};
use igel_router::engine::{Orchestrator, Plan, RunReport};
use igel_router::error::{EXIT_SUCCESS, EXIT_VALIDATION, ProvisionError, Result};
use igel_router::features::{FeatureRegistry, builtin};
use igel_router::firewall;
use igel_router::host::Host;
use igel_router::network::inventory::SysfsLinks;
use igel_router::network::wan::SystemProber;
use igel_router::network::wifi::{self, ApSettings};
use igel_router::process_guard::{self, ProcessGuard};
use igel_router::prompt::{self, DialoguerPrompter};
use igel_router::sanity;
use serde::Serialize;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Initialize tracing on stderr; stdout is reserved for plans and the ledger.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    init_tracing();

    // Children are still torn down via ProcessGuard if this fails
    if let Err(e) = process_guard::init_signal_handlers() {
        warn!("Failed to initialize signal handlers: {}", e);
    }
    debug!("Signal handlers initialized");
    let _process_guard = ProcessGuard::new();

    let registry = match builtin::registry() {
        Ok(r) => r,
        Err(e) => return report_error(&e, e.exit_code()),
    };

    let invocation = match cli::parse(&registry, std::env::args_os()) {
        Ok(inv) => inv,
        Err(e) => {
            use clap::error::ErrorKind;
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp
                | ErrorKind::DisplayVersion
                | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                    ExitCode::from(EXIT_SUCCESS)
                }
                _ => ExitCode::from(EXIT_VALIDATION),
            };
        }
    };

    match dispatch(&registry, &invocation) {
        Ok(code) => ExitCode::from(code),
        Err(e) => report_error(&e, e.exit_code()),
    }
}

/// Print an error with its feature and remediation hint.
fn report_error(err: &ProvisionError, code: u8) -> ExitCode {
    eprintln!("error: {}", err);
    if let Some(feature) = err.feature() {
        eprintln!("  feature: {}", feature);
    }
    eprintln!("  hint: {}", err.remediation());
    ExitCode::from(code)
}

fn dispatch(registry: &FeatureRegistry, inv: &Invocation) -> Result<u8> {
    match inv.command() {
        Commands::Install => install(registry, inv),
        Commands::Plan { json } => {
            let config = build_config(registry, inv, false)?;
            let plan = Plan::build(registry, &config)?;
            if json {
                print_json(&PlanOutput {
                    plan: &plan,
                    config: &config,
                })?;
            } else {
                print_plan(&plan);
            }
            Ok(EXIT_SUCCESS)
        }
        Commands::Interfaces { json } => {
            let host = make_host(inv);
            let interfaces = host
                .inventory()
                .list()
                .map_err(|e| ProvisionError::environment(format!("{:#}", e)))?;
            if json {
                print_json(&interfaces)?;
            } else {
                for i in &interfaces {
                    let addr = i.ipv4_address.map(|a| a.to_string()).unwrap_or_else(|| "-".into());
                    println!("{:<16} {:<9} {:<5} {}", i.name, i.class, i.oper_state, addr);
                }
            }
            Ok(EXIT_SUCCESS)
        }
        Commands::DetectWan { json } => {
            let detection = make_host(inv).detect_wan();
            if json {
                print_json(&detection)?;
            } else {
                println!("{}", detection);
            }
            Ok(EXIT_SUCCESS)
        }
        Commands::Firewall => {
            let config = build_config(registry, inv, false)?;
            let plan = Plan::build(registry, &config)?;
            print!("{}", firewall::render(&plan.firewall));
            Ok(EXIT_SUCCESS)
        }
        Commands::Wifi { action } => wifi_command(registry, inv, &action),
    }
}

// ============================================================================
// Install
// ============================================================================

fn install(registry: &FeatureRegistry, inv: &Invocation) -> Result<u8> {
    let cli = &inv.cli;
    if cli.dry_run {
        info!("Dry-run: mutating host commands will be logged, not run");
    } else {
        sanity::run_preflight_checks()?;
    }

    let config = build_config(registry, inv, true)?;
    let host = make_host(inv);
    let orchestrator = Orchestrator::new(registry, &host);

    // Anything returned here happened before the first step ran
    let report = match orchestrator.run(&config) {
        Ok(report) => report,
        Err(e) => {
            let _ = report_error(&e, EXIT_VALIDATION);
            return Ok(EXIT_VALIDATION);
        }
    };

    print_report(&report);
    if let Some(path) = &cli.report {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json)?;
        info!("Run report written to {}", path.display());
    }

    if let Some(err) = &report.error {
        let _ = report_error(err, report.exit_code());
    }
    Ok(report.exit_code())
}

fn build_config(registry: &FeatureRegistry, inv: &Invocation, allow_prompts: bool) -> Result<ConfigStore> {
    let mut builder = ConfigBuilder::new();
    registry.register_toggles(&mut builder);
    builder.apply_env(&ProcessEnv)?;
    inv.apply_flags(registry, &mut builder)?;

    if allow_prompts && builder.interactive() {
        if prompt::stdin_is_interactive() {
            let prompter = DialoguerPrompter;
            builder.prompt_feature_toggles(&prompter)?;
            let features = registry.dependency_closure(&builder.enabled_features());
            builder.prompt_values(&prompter, &features)?;
        } else {
            debug!("stdin is not a terminal; skipping prompts");
        }
    }
    builder.freeze()
}

fn make_host(inv: &Invocation) -> Host {
    let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner::new(inv.cli.dry_run));
    Host::new(
        Arc::clone(&runner),
        inv.cli.root.clone(),
        Arc::new(SysfsLinks::default()),
        Arc::new(SystemProber::new(runner)),
    )
    .dry_run(inv.cli.dry_run)
}

// ============================================================================
// Wi-Fi
// ============================================================================

fn wifi_command(registry: &FeatureRegistry, inv: &Invocation, action: &WifiCommands) -> Result<u8> {
    let config = build_config(registry, inv, false)?;
    let host = make_host(inv);
    let interface = config.text("wifi.interface").unwrap_or("wlan0").to_string();
    let failed = |e: anyhow::Error| ProvisionError::step_failed("wifi", format!("{:#}", e));

    match action {
        WifiCommands::Scan { json } => {
            let networks = wifi::scan(&host, &interface).map_err(failed)?;
            if *json {
                print_json(&networks)?;
            } else {
                for n in &networks {
                    println!("{:>3}%  {:<10} {}", n.signal, n.security, n.ssid);
                }
            }
        }
        WifiCommands::Status => {
            for d in wifi::status(&host, None).map_err(failed)? {
                println!(
                    "{:<16} {:<10} {:<14} {}",
                    d.device,
                    d.kind,
                    d.state,
                    d.connection.as_deref().unwrap_or("-")
                );
            }
        }
        WifiCommands::Connect { ssid, password } => {
            let password = password
                .as_deref()
                .or_else(|| config.text("wifi.uplinkPassword"));
            wifi::connect(&host, &interface, ssid, password).map_err(failed)?;
            println!("Connected {} to {}", interface, ssid);
        }
        WifiCommands::ApStart => {
            let require = |key: &str| {
                config
                    .text(key)
                    .map(str::to_string)
                    .ok_or_else(|| ProvisionError::MissingConfiguration {
                        feature: "wifiAp".to_string(),
                        key: key.to_string(),
                    })
            };
            igel_router::features::wifi::ensure_not_wan(&host, &interface).map_err(failed)?;
            let settings = ApSettings {
                interface: interface.clone(),
                ssid: require("wifi.apSsid")?,
                password: require("wifi.apPassword")?,
                channel: config.port("wifi.apChannel").unwrap_or(6),
            };
            wifi::start_ap(&host, &settings).map_err(failed)?;
            println!("Access point '{}' up on {}", settings.ssid, interface);
        }
        WifiCommands::ApStop => {
            wifi::stop_ap(&host);
            println!("Access point stopped");
        }
    }
    Ok(EXIT_SUCCESS)
}

// ============================================================================
// Output
// ============================================================================

#[derive(Serialize)]
struct PlanOutput<'a> {
    plan: &'a Plan,
    config: &'a ConfigStore,
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_plan(plan: &Plan) {
    println!("Install order:");
    for (i, f) in plan.features.iter().enumerate() {
        let mut notes = Vec::new();
        if f.auto_included {
            notes.push("auto-included".to_string());
        }
        if f.best_effort {
            notes.push("best-effort".to_string());
        }
        if !f.ports.is_empty() {
            let ports: Vec<String> = f.ports.iter().map(ToString::to_string).collect();
            notes.push(format!("ports {}", ports.join(" ")));
        }
        if !f.missing_keys.is_empty() {
            notes.push(format!("MISSING {}", f.missing_keys.join(", ")));
        }
        let notes = if notes.is_empty() {
            String::new()
        } else {
            format!("  [{}]", notes.join("; "))
        };
        println!("  {:>2}. {:<16}{}", i + 1, f.id, notes);
    }
    let ports: Vec<String> = plan.firewall.ports.iter().map(ToString::to_string).collect();
    println!("Firewall allow-list: {}", ports.join(" "));
}

fn print_report(report: &RunReport) {
    let title = if report.dry_run {
        "Installation ledger (dry run):"
    } else {
        "Installation ledger:"
    };
    println!("{}", title);
    print!("{}", report.ledger);
    if let Some(rollback) = &report.rollback {
        println!(
            "Rollback: {} unwound, {} failed",
            rollback.rolled_back.len(),
            rollback.failed.len()
        );
        for (feature, reason) in &rollback.failed {
            println!("  {}: {}", feature, reason);
        }
    }
    match &report.firewall {
        Some(list) => {
            let ports: Vec<String> = list.ports.iter().map(ToString::to_string).collect();
            println!("Firewall allow-list: {}", ports.join(" "));
        }
        None => println!("Firewall: not applied"),
    }
}
