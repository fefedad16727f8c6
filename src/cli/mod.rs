//! CLI command implementations
//!
//! This module contains the implementation of all CLI subcommands.

use std::path::PathBuf;

use ikebridge_core::config::toml_config;

pub mod daemon;
pub mod monitor;
pub mod send;

/// Socket path for client commands: the flag, else the configured path
pub fn resolve_socket(socket: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    match socket {
        Some(path) => Ok(path),
        None => Ok(toml_config::load_config()?.server.socket_path),
    }
}
