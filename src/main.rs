mod cli;
mod color;
mod debounce;
mod error;
mod executor;
mod ipc;
mod scheduling;
mod settings;

use anyhow::{Context, Result};
use clap::Parser;
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cli::Opts;
use debounce::{Event, STARTUP_APPLY_DELAYS, Scheduler, SchedulerConfig, schedule_startup_applies};
use error::InstanceError;
use executor::{ColorTool, CommandExecutor, DryRun};
use ipc::{claim_instance, default_socket_path, serve};
use scheduling::LocalClock;
use settings::{JsonFileStore, SettingsPatch, SettingsStore};

fn init_logging(verbose: u8) {
    let fallback = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let opts = Opts::parse();
    init_logging(opts.verbose);

    let socket_path = opts.socket.clone().unwrap_or_else(default_socket_path);
    let listener = match claim_instance(&socket_path).await {
        Ok(listener) => listener,
        Err(InstanceError::AlreadyRunning(path)) => {
            info!("already running ({}), exiting", path.display());
            return Ok(());
        }
        Err(e) => return Err(e).context("claim control socket"),
    };

    let tool = ColorTool::new(&opts.tool, Duration::from_millis(opts.tool_timeout_ms));
    let executor: Box<dyn CommandExecutor> = if opts.dry_run {
        Box::new(DryRun {
            tool: opts.tool.clone(),
        })
    } else {
        if !opts.no_kill {
            tool.terminate_running().await;
        }
        Box::new(tool)
    };

    let store = JsonFileStore::new(opts.config.clone().unwrap_or_else(JsonFileStore::default_path));
    info!("settings file {}", store.path().display());
    let overrides = SettingsPatch {
        auto_schedule_enabled: opts.auto.then_some(true),
        schedule_on_time: opts.on,
        schedule_off_time: opts.off,
        ..SettingsPatch::default()
    };
    let settings = store.load().apply_patch(&overrides);

    let (tx, rx) = mpsc::unbounded_channel::<Event>();

    info!("listening on {}", socket_path.display());
    tokio::spawn(serve(listener, tx.clone()));

    let mut sigusr1 = signal(SignalKind::user_defined1()).context("setup SIGUSR1 handler")?;
    let mut sigterm = signal(SignalKind::terminate()).context("setup SIGTERM handler")?;
    let signal_tx = tx.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = sigusr1.recv() => {
                    if signal_tx.send(Event::ForceApply).is_err() {
                        break;
                    }
                }
                _ = sigterm.recv() => break,
                _ = tokio::signal::ctrl_c() => break,
            }
        }
        let _ = signal_tx.send(Event::Shutdown);
    });

    schedule_startup_applies(tx, &STARTUP_APPLY_DELAYS);

    let config = SchedulerConfig {
        debounce: Duration::from_millis(opts.debounce_ms),
        poll_interval: Duration::from_secs(opts.poll_secs),
    };
    let scheduler = Scheduler::new(settings, store, executor, LocalClock, config)
        .run(rx)
        .await;

    if let Err(e) = std::fs::remove_file(&socket_path) {
        warn!("failed to remove {}: {e}", socket_path.display());
    }
    info!(
        temperature = scheduler.settings().temperature_k,
        "shut down"
    );
    Ok(())
}
