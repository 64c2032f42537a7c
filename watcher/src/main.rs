mod config;
mod error;
mod event;
mod paths;
mod probe;
mod sink;
mod tracker;
mod watcher;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use crate::config::ConfigLoad;
use crate::sink::AwClient;
use crate::watcher::Watcher;

#[derive(Parser)]
#[command(name = "aw-watcher-camera")]
#[command(version)]
#[command(about = "Reports webcam usage to ActivityWatch", long_about = None)]
struct Cli {
    /// Config file to use instead of the platform default
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Talk to an ActivityWatch server running in testing mode (port 5666)
    #[arg(long)]
    testing: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        tracing::error!("{e:#}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "info,aw_watcher_camera=debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    // ── Configuration ─────────────────────────────────────────────────────────
    let config_path = cli.config.unwrap_or_else(paths::config_file_path);
    let mut config = match config::load_or_create(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?
    {
        ConfigLoad::Created(path) => {
            println!(
                "Created default config at {}. Review it, then start aw-watcher-camera again.",
                path.display()
            );
            return Ok(());
        }
        ConfigLoad::Loaded(config) => config,
    };
    if cli.testing {
        config.server.port = config::TESTING_PORT;
    }

    let hostname = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string());
    let poll = config.poll_config(&hostname);

    // ── Probe ─────────────────────────────────────────────────────────────────
    let probe = probe::platform_probe().context("Camera detection is unavailable")?;

    // ── Sink ──────────────────────────────────────────────────────────────────
    // Heartbeats of one interval must always land within pulsetime of each other.
    let pulsetime = poll.poll_interval.saturating_add(Duration::from_secs(1));
    let mut sink = AwClient::new(&config.server, &hostname, pulsetime)
        .context("Failed to create ActivityWatch client")?;
    if let Err(e) = sink.ensure_bucket(&poll.bucket_id).await {
        tracing::warn!(
            server = %config.server.base_url(),
            error = %e,
            "activity server not reachable yet; will retry on first report"
        );
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bucket = %poll.bucket_id,
        interval_secs = poll.poll_interval.as_secs(),
        "aw-watcher-camera started"
    );

    // ── Poll loop ─────────────────────────────────────────────────────────────
    let summary = Watcher::new(poll, probe, sink).run(shutdown_signal()).await;

    tracing::info!(
        ticks = summary.ticks,
        events = summary.events_opened,
        reports_sent = summary.reports_sent,
        reports_failed = summary.reports_failed,
        "aw-watcher-camera stopped"
    );
    Ok(())
}

/// Resolves on Ctrl+C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown requested");
}
