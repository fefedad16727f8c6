//! Unix socket IPC
//!
//! `ControlServer` accepts newline-free JSON commands on the control socket
//! and writes newline-terminated results and events back. `IpcClient` is the
//! blocking counterpart used by the command line tool.

pub mod client;
pub mod server;

pub use client::{EventStream, IpcClient};
pub use server::ControlServer;
