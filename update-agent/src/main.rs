//! Update Agent - demo host
//!
//! Runs a trivial "application" (a heartbeat log line) alongside the update
//! scheduler. When an update is applied the process re-executes itself from
//! the same path so the new binary takes over.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use update_agent::daemon::{restart, ShutdownCoordinator};
use update_agent::{utils, Config, Scheduler, SchedulerExit, UpdateOrchestrator, UpdateOutcome};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Seconds between update checks (overrides config)
    #[arg(short, long)]
    interval: Option<u64>,

    /// Run a single update cycle and exit
    #[arg(long)]
    once: bool,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Resolve before any update can replace the binary
    let exe = std::env::current_exe()
        .and_then(|p| p.canonicalize())
        .context("cannot locate running executable")?;

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(secs) = args.interval {
        config.update.check_interval_secs = secs;
        config.validate()?;
    }

    if args.print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    tracing::info!(
        "Starting {} v{} (update-agent {})",
        config.app.name,
        config.app.current_version,
        env!("CARGO_PKG_VERSION")
    );
    tracing::info!("Update server: {}", config.check_url());

    let mut orchestrator = UpdateOrchestrator::new(&config)?;

    if args.once {
        return match orchestrator.run_cycle().await {
            UpdateOutcome::Applied(version) => {
                tracing::info!("Updated to {}, restarting", version);
                restart::reexec(&exe).context("re-exec failed")
            }
            UpdateOutcome::NoUpdateAvailable => {
                tracing::info!("No update available");
                Ok(())
            }
            UpdateOutcome::Failed(e) => Err(e.into()),
        };
    }

    let shutdown = ShutdownCoordinator::new();
    let restart_requested = CancellationToken::new();
    let on_restart = {
        let restart_requested = restart_requested.clone();
        move || restart_requested.cancel()
    };

    let scheduler = Scheduler::new(orchestrator, config.check_interval())
        .start(on_restart, shutdown.token());
    let heartbeat = tokio::spawn(heartbeat(config.app.current_version.clone(), shutdown.token()));

    tokio::select! {
        result = shutdown.wait_for_signal() => result?,
        _ = restart_requested.cancelled() => {}
    }
    shutdown.trigger();

    let _ = heartbeat.await;
    match scheduler.await {
        Ok(SchedulerExit::RestartRequested(version)) => {
            tracing::info!("Restarting into v{}", version);
            restart::reexec(&exe).context("re-exec failed")?;
        }
        Ok(SchedulerExit::Cancelled) => tracing::info!("Shutdown complete"),
        Err(e) => tracing::error!("Scheduler task panicked: {}", e),
    }

    Ok(())
}

/// Stand-in for the host application's own work.
async fn heartbeat(version: String, shutdown: CancellationToken) {
    let mut ticks: u64 = 0;
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(HEARTBEAT_INTERVAL) => {
                ticks += 1;
                tracing::info!("Application v{} running (tick {})", version, ticks);
            }
        }
    }
}
