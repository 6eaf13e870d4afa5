// Portwarden CLI entry point

mod args;

use anyhow::{Context, Result};
use clap::Parser;
use portwarden_config::SettingsManager;
use portwarden_process::{wait_for_shutdown_signal, Supervisor, SupervisorEvent};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

use crate::args::Args;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.level())
        .init();

    let manager = match &args.config {
        Some(path) => SettingsManager::with_path(path),
        None => SettingsManager::new(),
    };
    let mut settings = manager
        .load()
        .with_context(|| format!("Failed to load {}", manager.config_path().display()))?;
    args.apply(&mut settings);

    if args.save_config {
        manager.save(&settings)?;
        info!(path = %manager.config_path().display(), "Settings written");
        return Ok(());
    }

    // signals are awaited below so the kill happens on this task
    let config = settings.to_launch_config().handle_host_signals(false);
    let supervisor = Supervisor::new(config);
    let mut events = supervisor.subscribe();

    let handle = match supervisor.launch().await {
        Ok(handle) => handle,
        Err(e) => {
            supervisor.kill().await;
            return Err(e).context("Launch failed");
        }
    };

    match handle.pid {
        Some(pid) => info!(port = handle.port, pid, "Control port ready"),
        None => info!(port = handle.port, "Reusing running instance"),
    }

    let watch_events = async {
        loop {
            match events.recv().await {
                Ok(SupervisorEvent::Restarted { pid }) => info!(pid, "Process restarted"),
                Ok(SupervisorEvent::Dead { pid, cause }) => {
                    warn!(pid = ?pid, cause = ?cause, "Process reported dead")
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Missed lifecycle events"),
                Err(RecvError::Closed) => break,
            }
        }
    };

    tokio::select! {
        signal = wait_for_shutdown_signal() => {
            if let Err(e) = signal {
                error!(error = %e, "Cannot listen for termination signals");
            }
        }
        _ = watch_events => {}
    }

    info!("Shutting down");
    supervisor.kill().await;
    Ok(())
}
