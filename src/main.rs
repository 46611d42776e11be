//! Gatekeeper - cache and admission-control coordination layer

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use gatekeeper::{
    Gatekeeper,
    cli::{Cli, Command},
    config::Config,
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Some(Command::Probe) => run_probe(config).await,
        Some(Command::Simulate {
            item,
            total,
            limit,
            workers,
            request,
        }) => run_simulate(config, &item, total, limit, workers, request).await,
        Some(Command::CheckConfig) => run_check_config(&config),
        Some(Command::Run) | None => run_service(config).await,
    }
}

/// Run background maintenance until Ctrl-C
async fn run_service(config: Config) -> ExitCode {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        items = config.flashsale.items.len(),
        health_probe = config.health.enabled,
        "Starting Gatekeeper"
    );

    let gatekeeper = Gatekeeper::local(config);
    let created = gatekeeper.init_configured_items();
    if created > 0 {
        info!(created, "Initialised configured flash-sale items");
    }

    let tasks = gatekeeper.start_background();

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
        tasks.shutdown();
        return ExitCode::FAILURE;
    }

    tasks.shutdown();
    let report = gatekeeper.health_report();
    info!(
        healthy = report.healthy,
        probes_passed = report.success_count,
        probes_failed = report.failure_count,
        "Gatekeeper shutdown complete"
    );
    ExitCode::SUCCESS
}

/// Run a single health probe
async fn run_probe(config: Config) -> ExitCode {
    let gatekeeper = Gatekeeper::local(config);
    let errors = gatekeeper.ping().await;

    match serde_json::to_string_pretty(&errors) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("❌ Failed to serialize probe result: {e}");
            return ExitCode::FAILURE;
        }
    }

    if errors.is_empty() {
        println!("✅ Store healthy");
        ExitCode::SUCCESS
    } else {
        eprintln!("❌ {} fault(s) detected", errors.len());
        ExitCode::FAILURE
    }
}

/// Hammer a fresh inventory with concurrent buyers
async fn run_simulate(
    config: Config,
    item: &str,
    total: i64,
    limit: i64,
    workers: usize,
    request: i64,
) -> ExitCode {
    let gatekeeper = Gatekeeper::local(config);
    if !gatekeeper.flashsale_inventory_init(item, total, limit) {
        eprintln!("❌ Could not initialise inventory for {item}");
        return ExitCode::FAILURE;
    }
    gatekeeper.flashsale_enable(item, true);

    let handles: Vec<_> = (0..workers)
        .map(|_| {
            let gk = gatekeeper.clone();
            let item = item.to_string();
            tokio::spawn(async move { gk.flashsale_acquire_quota(&item, request) })
        })
        .collect();

    let mut confirmed = 0i64;
    let mut served = 0usize;
    for handle in handles {
        match handle.await {
            Ok(amount) => {
                confirmed += amount;
                if amount > 0 {
                    served += 1;
                }
            }
            Err(e) => {
                eprintln!("❌ Buyer task failed: {e}");
                return ExitCode::FAILURE;
            }
        }
    }

    let report = gatekeeper.flashsale_inventory_report(item);
    println!("Buyers: {workers} x {request} units");
    println!("Served: {served}, confirmed {confirmed} units\n");
    match serde_json::to_string_pretty(&report) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("❌ Failed to serialize report: {e}");
            return ExitCode::FAILURE;
        }
    }

    if report.booked == confirmed && report.booked <= report.total {
        ExitCode::SUCCESS
    } else {
        eprintln!("❌ Booked count does not match confirmed units");
        ExitCode::FAILURE
    }
}

/// Print the effective configuration
fn run_check_config(config: &Config) -> ExitCode {
    match serde_yaml::to_string(config) {
        Ok(yaml) => {
            println!("✅ Configuration valid\n");
            print!("{yaml}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ Failed to render configuration: {e}");
            ExitCode::FAILURE
        }
    }
}
