// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Capture supervisor — multi-camera RTSP recording with segment rollover
//! tracking and archive eviction.
//!
//! Usage:
//!   capture-supervisor --config config/config.json --log-file capture.log

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use capture_supervisor::config::Config;
use capture_supervisor::frame_consumer;
use capture_supervisor::http_api::{self, AppState};
use capture_supervisor::supervisor::Supervisor;

#[derive(Parser)]
#[command(name = "capture-supervisor", about = "Multi-camera capture supervisor", version)]
struct Cli {
    #[arg(short, long, default_value = "config/config.json")]
    config: PathBuf,

    /// Tee logs to this file in addition to stderr.
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_file.as_deref());

    let spec = match Config::from_file(&cli.config) {
        Ok(spec) => spec,
        Err(e) => {
            error!(error = %e, "failed to load configuration");
            std::process::exit(1);
        }
    };

    info!(
        cameras = spec.cameras.len(),
        scratch_dir = ?spec.scratch_dir,
        archive_dir = ?spec.archive_dir,
        max_occupied_mib = spec.max_occupied_mib,
        "starting capture supervisor"
    );

    let http_api = spec.http_api;
    let supervisor = match Supervisor::start(spec, frame_consumer::noop_callback()).await {
        Ok(supervisor) => Arc::new(supervisor),
        Err(e) => {
            error!(error = %e, "failed to start supervisor");
            std::process::exit(1);
        }
    };

    if http_api.enabled {
        let state = AppState { supervisor: supervisor.clone() };
        let port = http_api.port;
        tokio::spawn(async move {
            http_api::start_server(state, port).await;
        });
    }

    let exit_code = wait_for_shutdown_signal().await;

    match Arc::try_unwrap(supervisor) {
        Ok(supervisor) => supervisor.stop().await,
        Err(_arc) => {
            warn!("other references to the supervisor still held at shutdown (HTTP surface); skipping graceful teardown");
        }
    }

    std::process::exit(exit_code);
}

fn init_logging(log_file: Option<&std::path::Path>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if let Some(path) = log_file {
        if let Ok(file) = std::fs::OpenOptions::new().create(true).append(true).open(path) {
            tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::sync::Mutex::new(file)).init();
            return;
        }
    }

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Waits for SIGINT/SIGTERM, ignoring repeat signals while already
/// shutting down, and returns the process exit code to use.
async fn wait_for_shutdown_signal() -> i32 {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("received SIGINT, shutting down");
            }
            _ = sigterm.recv() => {
                info!("received SIGTERM, shutting down");
            }
        }
        130
    }
    #[cfg(not(unix))]
    {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("received interrupt, shutting down"),
            Err(e) => error!(error = %e, "signal handler error"),
        }
        130
    }
}
