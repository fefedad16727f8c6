//! Daemon process management
//!
//! Handles detaching the bridge, PID file management and stopping a running
//! instance.

use std::fs;
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use anyhow::{bail, Context};
use daemonize::Daemonize;
use tracing::{info, warn};

/// Default PID file of the bridge daemon
pub const DEFAULT_PID_FILE: &str = "/var/run/ikebridge.pid";

/// How long `stop` waits for a graceful exit before SIGKILL
const STOP_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Represents a daemon process
pub struct DaemonProcess {
    pid_file: PathBuf,
}

impl DaemonProcess {
    /// Create a new daemon process manager
    pub fn new(pid_file: PathBuf) -> Self {
        Self { pid_file }
    }

    /// Check if a daemon is already running
    ///
    /// A PID file pointing at a dead process is removed.
    pub fn is_running(&self) -> anyhow::Result<bool> {
        if !self.pid_file.exists() {
            return Ok(false);
        }

        let pid = self.get_pid()?;
        match nix::unistd::getpgid(Some(nix::unistd::Pid::from_raw(pid))) {
            Ok(_) => Ok(true),
            Err(nix::errno::Errno::ESRCH) => {
                let _ = fs::remove_file(&self.pid_file);
                Ok(false)
            }
            Err(e) => bail!("Failed to check process status: {}", e),
        }
    }

    /// Daemonize the current process
    ///
    /// Must run before any runtime threads are started.
    pub fn daemonize(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.pid_file.parent() {
            fs::create_dir_all(parent).context("Failed to create PID file directory")?;
        }

        Daemonize::new()
            .pid_file(&self.pid_file)
            .chown_pid_file(true)
            .working_directory("/")
            .umask(0o027)
            .start()
            .context("Failed to daemonize process")?;

        info!("Successfully daemonized process, PID: {}", process::id());
        Ok(())
    }

    /// Get the PID of the running daemon
    pub fn get_pid(&self) -> anyhow::Result<i32> {
        let pid_content = fs::read_to_string(&self.pid_file)
            .with_context(|| format!("Failed to read PID file {}", self.pid_file.display()))?;

        pid_content
            .trim()
            .parse()
            .context("Invalid PID in PID file")
    }

    /// Stop the daemon process
    ///
    /// Sends SIGTERM and falls back to SIGKILL after a grace period.
    pub fn stop(&self) -> anyhow::Result<i32> {
        if !self.is_running()? {
            bail!("ikebridge daemon is not running");
        }
        let pid = self.get_pid()?;
        let target = nix::unistd::Pid::from_raw(pid);

        nix::sys::signal::kill(target, nix::sys::signal::Signal::SIGTERM)
            .context("Failed to send SIGTERM to daemon")?;

        let deadline = std::time::Instant::now() + STOP_GRACE_PERIOD;
        while std::time::Instant::now() < deadline {
            if nix::sys::signal::kill(target, None).is_err() {
                break;
            }
            std::thread::sleep(Duration::from_millis(100));
        }

        if nix::sys::signal::kill(target, None).is_ok() {
            warn!("Daemon {} did not respond to SIGTERM, sending SIGKILL", pid);
            nix::sys::signal::kill(target, nix::sys::signal::Signal::SIGKILL)
                .context("Failed to send SIGKILL to daemon")?;
        }

        self.remove_pid_file();
        info!("Stopped daemon process {}", pid);
        Ok(pid)
    }

    /// Remove the PID file, ignoring a missing one
    pub fn remove_pid_file(&self) {
        let _ = fs::remove_file(&self.pid_file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_pid_file_is_not_running() {
        let dir = tempdir().unwrap();
        let process = DaemonProcess::new(dir.path().join("ikebridge.pid"));

        assert!(!process.is_running().unwrap());
        assert!(process.stop().is_err());
    }

    #[test]
    fn test_own_pid_is_running() {
        let dir = tempdir().unwrap();
        let pid_file = dir.path().join("ikebridge.pid");
        fs::write(&pid_file, format!("{}\n", process::id())).unwrap();

        let daemon = DaemonProcess::new(pid_file);
        assert_eq!(daemon.get_pid().unwrap(), process::id() as i32);
        assert!(daemon.is_running().unwrap());
    }

    #[test]
    fn test_garbage_pid_file() {
        let dir = tempdir().unwrap();
        let pid_file = dir.path().join("ikebridge.pid");
        fs::write(&pid_file, "not-a-pid").unwrap();

        assert!(DaemonProcess::new(pid_file).get_pid().is_err());
    }
}
