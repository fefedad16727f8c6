//! `ikebridge send`: submit command documents to the running bridge

use std::io::Read;
use std::path::PathBuf;

use anyhow::{bail, Context};
use colored::Colorize;
use ikebridge_core::ipc::IpcClient;
use ikebridge_core::protocol::CommandResult;

/// Send the documents in `file` (or stdin) and print one line per reply
///
/// Fails if any command was rejected.
pub fn run_send(socket: Option<PathBuf>, file: Option<PathBuf>) -> anyhow::Result<()> {
    let request = match &file {
        Some(path) => std::fs::read(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut buffer = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buffer)
                .context("Failed to read stdin")?;
            buffer
        }
    };

    let socket = super::resolve_socket(socket)?;
    let client = IpcClient::new(socket.clone());
    let replies = client
        .send_raw(&request)
        .with_context(|| format!("Failed to talk to ikebridge at {}", socket.display()))?;

    let mut failures = 0;
    for reply in &replies {
        match reply {
            CommandResult::Ok => println!("{} ok", "✓".green()),
            CommandResult::Fail { code, reason } => {
                failures += 1;
                println!("{} {} {}", "✗".red(), code.to_string().red().bold(), reason);
            }
        }
    }

    if failures > 0 {
        bail!("{} of {} commands failed", failures, replies.len());
    }
    Ok(())
}
