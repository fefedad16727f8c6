//! Daemon process management for the background bridge
//!
//! This module handles detaching the bridge process, including PID file
//! management and stopping a running instance.

pub mod process;
