//! `ikebridge daemon`: run the bridge

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context};
use ikebridge_core::bridge::Bridge;
use ikebridge_core::config::{toml_config, BridgeConfig};
use ikebridge_core::daemon::SwanctlDaemon;
use ikebridge_core::error::{BridgeError, ConfigError};
use ikebridge_core::init_logging;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};

use crate::daemon::process::DaemonProcess;

/// Options of the daemon subcommand
pub struct DaemonOptions {
    pub foreground: bool,
    pub config: Option<PathBuf>,
    pub socket: Option<PathBuf>,
    pub pid_file: PathBuf,
}

fn load(options: &DaemonOptions) -> Result<BridgeConfig, BridgeError> {
    let mut config = match &options.config {
        Some(path) => toml_config::load_config_from_path(path)?,
        None => toml_config::load_config()?,
    };

    if let Some(socket) = &options.socket {
        config.server.socket_path = socket.clone();
        config
            .validate()
            .map_err(|message| ConfigError::ValidationError { message })?;
    }
    Ok(config)
}

/// Load configuration, detach unless in foreground, and serve until signalled
pub fn run_daemon(options: DaemonOptions) -> anyhow::Result<()> {
    let config = load(&options)?;

    let process = DaemonProcess::new(options.pid_file.clone());
    if process.is_running()? {
        bail!("ikebridge is already running (PID {})", process.get_pid()?);
    }

    // Forking has to happen before the runtime starts its threads
    if !options.foreground {
        process.daemonize()?;
    }

    init_logging(&config.logging).map_err(|e| anyhow!("Failed to initialize logging: {}", e))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let result = runtime.block_on(serve(config));

    if !options.foreground {
        process.remove_pid_file();
    }
    result
}

async fn serve(config: BridgeConfig) -> anyhow::Result<()> {
    let daemon = SwanctlDaemon::new(&config.swanctl).map_err(BridgeError::from)?;
    let log_monitor = daemon.spawn_log_monitor();

    let bridge = Bridge::new(daemon, config);
    let lifecycle = bridge.spawn_lifecycle();
    let server = bridge.bind()?;

    info!(
        socket = %server.socket_path().display(),
        pid = std::process::id(),
        "ikebridge started"
    );

    server.run_until(shutdown_signal()).await;
    server.shutdown();

    log_monitor.abort();
    if let Some(lifecycle) = lifecycle {
        lifecycle.abort();
    }

    info!("ikebridge stopped");
    Ok(())
}

async fn shutdown_signal() {
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            warn!(error = %e, "Cannot listen for SIGTERM, only Ctrl+C will stop the bridge");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM"),
        _ = tokio::signal::ctrl_c() => info!("Received SIGINT"),
    }
}

/// Stop the daemon recorded in `pid_file`
pub fn run_stop(pid_file: PathBuf) -> anyhow::Result<()> {
    let pid = DaemonProcess::new(pid_file).stop()?;
    println!("Stopped ikebridge (PID {})", pid);
    Ok(())
}
