//! ikebridge - JSON control socket for strongSwan
//!
//! Runs the bridge daemon and provides small clients for sending command
//! documents and following the event stream.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use ikebridge_core::config::LoggingConfig;
use ikebridge_core::error::BridgeError;
use ikebridge_core::init_logging;

mod cli;
mod daemon;

#[derive(Parser)]
#[command(name = "ikebridge")]
#[command(about = "JSON control socket bridge for the strongSwan IKE daemon")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bridge daemon
    Daemon {
        /// Stay attached to the terminal
        #[arg(short, long)]
        foreground: bool,
        /// Configuration file (default: $IKEBRIDGE_CONFIG or /etc/ikebridge/config.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Control socket path, overriding the configuration
        #[arg(short, long)]
        socket: Option<PathBuf>,
        /// PID file
        #[arg(long, default_value = daemon::process::DEFAULT_PID_FILE)]
        pid_file: PathBuf,
    },
    /// Stop a running bridge daemon
    Stop {
        /// PID file
        #[arg(long, default_value = daemon::process::DEFAULT_PID_FILE)]
        pid_file: PathBuf,
    },
    /// Send command documents from a file (or stdin) and print the results
    Send {
        /// File with one or more JSON command documents
        file: Option<PathBuf>,
        /// Control socket path
        #[arg(short, long)]
        socket: Option<PathBuf>,
    },
    /// Print lifecycle events as they happen
    Monitor {
        /// Control socket path
        #[arg(short, long)]
        socket: Option<PathBuf>,
    },
}

/// Configuration problems exit with 2, everything else with 1
fn exit_code(error: &anyhow::Error) -> i32 {
    match error.downcast_ref::<BridgeError>() {
        Some(BridgeError::Config(_) | BridgeError::Toml(_) | BridgeError::Validation(_)) => 2,
        _ => 1,
    }
}

fn main() {
    let cli = Cli::parse();

    // The daemon sets up logging itself, after detaching
    if !matches!(cli.command, Commands::Daemon { .. }) {
        if let Err(e) = init_logging(&LoggingConfig {
            level: "warn".to_string(),
            journald: false,
        }) {
            eprintln!("Failed to initialize logging: {}", e);
            std::process::exit(2);
        }
    }

    let result = match cli.command {
        Commands::Daemon {
            foreground,
            config,
            socket,
            pid_file,
        } => cli::daemon::run_daemon(cli::daemon::DaemonOptions {
            foreground,
            config,
            socket,
            pid_file,
        }),
        Commands::Stop { pid_file } => cli::daemon::run_stop(pid_file),
        Commands::Send { file, socket } => cli::send::run_send(socket, file),
        Commands::Monitor { socket } => cli::monitor::run_monitor(socket),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(exit_code(&e));
    }
}
