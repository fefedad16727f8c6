//! Core library for the ikebridge control bridge
//!
//! This crate provides the connection document translator, gateway failover,
//! the control socket protocol and server, and the IKE daemon adapters.

pub mod error;

pub mod bridge;
pub mod config;
pub mod connection;
pub mod daemon;
pub mod dispatcher;
pub mod events;
pub mod failover;
pub mod ipc;
pub mod lifecycle;
pub mod protocol;

use config::LoggingConfig;

/// Initialize logging infrastructure
///
/// Uses the systemd journal when running under systemd or when the
/// configuration asks for it, otherwise logs to stderr.
pub fn init_logging(config: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let level = config.level_filter()?;

    #[cfg(target_os = "linux")]
    {
        if config.journald || std::env::var("JOURNAL_STREAM").is_ok() {
            let journal_layer = tracing_journald::layer()?;
            tracing_subscriber::registry()
                .with(journal_layer)
                .with(level)
                .try_init()?;
            return Ok(());
        }
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(level)
        .try_init()?;

    Ok(())
}
