//! strongSwan adapter driving the `swanctl` command line tool
//!
//! Each connection is rendered to `<conf_dir>/conns/<name>.conf`, which the
//! generated `<conf_dir>/swanctl.conf` includes. Changes are pushed to charon
//! with `swanctl --load-conns` / `--load-creds`. Lifecycle notifications come
//! from a long-running `swanctl --log` child.

use std::fmt::Write as _;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::SwanctlConfig;
use crate::connection::{AuthConfig, AuthMethod, ConnectionConfig, Credential, TrafficSelector};
use crate::daemon::{DaemonNotification, IkeDaemon, LogParser};
use crate::error::DaemonError;

/// Delay before restarting a `swanctl --log` child that went away
const LOG_RESTART_DELAY: Duration = Duration::from_secs(5);

/// Key of the line `switch_gateway` rewrites
const REMOTE_ADDRS_KEY: &str = "remote_addrs";

/// Runs swanctl subcommands with a timeout
#[derive(Debug, Clone)]
struct Swanctl {
    binary: PathBuf,
    timeout: Duration,
}

impl Swanctl {
    /// Run swanctl and return its stdout
    ///
    /// A non-zero exit status becomes `CommandFailed` carrying stderr.
    async fn run(&self, args: &[&str]) -> Result<String, DaemonError> {
        let command = args
            .first()
            .map(|arg| arg.trim_start_matches('-').to_string())
            .unwrap_or_default();

        tracing::debug!(component = "swanctl", args = ?args, "Running swanctl");

        let child = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DaemonError::SpawnFailed {
                reason: format!("Failed to spawn {}: {}", self.binary.display(), e),
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| DaemonError::Timeout {
                seconds: self.timeout.as_secs(),
            })?
            .map_err(|e| DaemonError::CommandFailed {
                command: command.clone(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let reason = if stderr.is_empty() {
                format!("exited with {}", output.status)
            } else {
                stderr
            };
            return Err(DaemonError::CommandFailed { command, reason });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Production adapter for strongSwan
pub struct SwanctlDaemon {
    swanctl: Swanctl,
    conf_dir: PathBuf,
    notify_tx: mpsc::UnboundedSender<DaemonNotification>,
    notify_rx: Mutex<Option<mpsc::UnboundedReceiver<DaemonNotification>>>,
}

impl SwanctlDaemon {
    /// Create the adapter and lay out its configuration directory
    pub fn new(config: &SwanctlConfig) -> Result<Self, DaemonError> {
        let conns_dir = config.conf_dir.join("conns");
        std::fs::create_dir_all(&conns_dir).map_err(|e| DaemonError::WriteFailed {
            path: conns_dir.display().to_string(),
            reason: e.to_string(),
        })?;

        let master = config.conf_dir.join("swanctl.conf");
        std::fs::write(&master, "# Generated by ikebridge\ninclude conns/*.conf\n").map_err(
            |e| DaemonError::WriteFailed {
                path: master.display().to_string(),
                reason: e.to_string(),
            },
        )?;

        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        Ok(Self {
            swanctl: Swanctl {
                binary: config.binary.clone(),
                timeout: Duration::from_secs(config.command_timeout_secs),
            },
            conf_dir: config.conf_dir.clone(),
            notify_tx,
            notify_rx: Mutex::new(Some(notify_rx)),
        })
    }

    fn master_path(&self) -> PathBuf {
        self.conf_dir.join("swanctl.conf")
    }

    /// File of a connection; names that could leave `conns/` are refused
    fn connection_path(&self, name: &str) -> Result<PathBuf, DaemonError> {
        if name.is_empty() || name.starts_with('.') || name.contains(['/', '\0']) {
            return Err(DaemonError::InvalidName {
                name: name.to_string(),
            });
        }
        Ok(self.conf_dir.join("conns").join(format!("{}.conf", name)))
    }

    /// Push the on-disk configuration to charon
    async fn reload(&self) -> Result<(), DaemonError> {
        let master = self.master_path();
        let master = master.to_string_lossy();
        self.swanctl.run(&["--load-conns", "--file", &master]).await?;
        self.swanctl
            .run(&["--load-creds", "--noprompt", "--file", &master])
            .await?;
        Ok(())
    }

    /// Put back a connection file charon rejected and reload the old state
    ///
    /// `previous` is `None` when the file did not exist before.
    async fn restore(&self, path: &Path, previous: Option<String>) {
        let restored = match previous {
            Some(contents) => write_private(path, &contents).await,
            None => tokio::fs::remove_file(path)
                .await
                .map_err(|e| DaemonError::WriteFailed {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                }),
        };
        if let Err(e) = restored {
            tracing::warn!(component = "swanctl", path = %path.display(), error = %e, "Failed to roll back connection file");
            return;
        }
        if let Err(e) = self.reload().await {
            tracing::warn!(component = "swanctl", error = %e, "Reload after rollback failed");
        }
    }

    /// Terminate the IKE SA of a connection, if there is one
    async fn terminate(&self, name: &str) {
        if let Err(e) = self.swanctl.run(&["--terminate", "--ike", name]).await {
            tracing::debug!(component = "swanctl", connection = name, error = %e, "Nothing terminated");
        }
    }

    /// Follow `swanctl --log` and forward parsed notifications
    ///
    /// The child is restarted when it exits. The task ends once the
    /// notification receiver is gone.
    pub fn spawn_log_monitor(&self) -> JoinHandle<()> {
        let binary = self.swanctl.binary.clone();
        let notify_tx = self.notify_tx.clone();

        tokio::spawn(async move {
            let parser = LogParser::new();
            loop {
                match follow_log(&binary, &parser, &notify_tx).await {
                    Ok(()) => tracing::warn!(component = "swanctl", "swanctl --log exited"),
                    Err(e) => tracing::warn!(component = "swanctl", error = %e, "swanctl --log failed"),
                }
                if notify_tx.is_closed() {
                    break;
                }
                tokio::time::sleep(LOG_RESTART_DELAY).await;
            }
        })
    }
}

async fn follow_log(
    binary: &Path,
    parser: &LogParser,
    notify_tx: &mpsc::UnboundedSender<DaemonNotification>,
) -> Result<(), DaemonError> {
    let mut child = Command::new(binary)
        .arg("--log")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| DaemonError::SpawnFailed {
            reason: format!("Failed to spawn {} --log: {}", binary.display(), e),
        })?;

    let stdout = child.stdout.take().ok_or_else(|| DaemonError::SpawnFailed {
        reason: "Failed to capture stdout".to_string(),
    })?;

    tracing::info!(component = "swanctl", pid = ?child.id(), "Following charon log");

    let mut lines = BufReader::new(stdout).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::trace!(component = "swanctl", "charon: {}", line);
        if let Some(notification) = parser.parse_line(&line) {
            tracing::debug!(component = "swanctl", ?notification, "Daemon notification");
            if notify_tx.send(notification).is_err() {
                return Ok(());
            }
        }
    }

    let _ = child.wait().await;
    Ok(())
}

impl IkeDaemon for SwanctlDaemon {
    async fn apply(&self, config: ConnectionConfig) -> Result<(), DaemonError> {
        let path = self.connection_path(&config.name)?;
        let previous = read_existing(&path).await?;

        write_private(&path, &render_connection(&config)).await?;
        if let Err(e) = self.reload().await {
            self.restore(&path, previous).await;
            return Err(e);
        }
        tracing::info!(component = "swanctl", connection = %config.name, "Connection loaded");
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<(), DaemonError> {
        let path = self.connection_path(name)?;
        if !path.exists() {
            return Err(DaemonError::NotFound {
                name: name.to_string(),
            });
        }

        self.terminate(name).await;
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| DaemonError::WriteFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        self.reload().await
    }

    async fn sa_exists(&self, name: &str) -> Result<bool, DaemonError> {
        let output = self.swanctl.run(&["--list-sas", "--ike", name]).await?;
        Ok(lists_sa(&output, name))
    }

    async fn start_dpd(&self, name: &str) -> Result<(), DaemonError> {
        let swanctl = self.swanctl.clone();
        let notify_tx = self.notify_tx.clone();
        let name = name.to_string();

        // swanctl has no direct DPD trigger; a rekey exchange needs the peer
        tokio::spawn(async move {
            let alive = match swanctl.run(&["--rekey", "--ike", &name]).await {
                Ok(_) => true,
                Err(e) => {
                    tracing::debug!(component = "swanctl", connection = %name, error = %e, "Liveness check failed");
                    false
                }
            };
            let _ = notify_tx.send(DaemonNotification::DpdCompleted { name, alive });
        });

        Ok(())
    }

    async fn switch_gateway(&self, name: &str, address: &str) -> Result<(), DaemonError> {
        let path = self.connection_path(name)?;
        let contents = read_existing(&path)
            .await?
            .ok_or_else(|| DaemonError::NotFound {
                name: name.to_string(),
            })?;

        write_private(&path, &prefer_gateway(&contents, address)).await?;
        if let Err(e) = self.reload().await {
            self.restore(&path, Some(contents)).await;
            return Err(e);
        }
        self.terminate(name).await;
        self.swanctl.run(&["--initiate", "--ike", name]).await?;
        Ok(())
    }

    fn take_notifications(&self) -> Option<mpsc::UnboundedReceiver<DaemonNotification>> {
        self.notify_rx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }
}

/// Current contents of a file, `None` if it does not exist
async fn read_existing(path: &Path) -> Result<Option<String>, DaemonError> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(DaemonError::WriteFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        }),
    }
}

/// Write a file readable by its owner only, replacing it atomically
async fn write_private(path: &Path, contents: &str) -> Result<(), DaemonError> {
    let write_failed = |e: std::io::Error| DaemonError::WriteFailed {
        path: path.display().to_string(),
        reason: e.to_string(),
    };

    let tmp = path.with_extension("conf.tmp");
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(&tmp)
        .await
        .map_err(write_failed)?;
    tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))
        .await
        .map_err(write_failed)?;
    file.write_all(contents.as_bytes())
        .await
        .map_err(write_failed)?;
    file.sync_all().await.map_err(write_failed)?;
    drop(file);

    tokio::fs::rename(&tmp, path).await.map_err(write_failed)
}

/// Whether `swanctl --list-sas` output shows an IKE SA of the connection
fn lists_sa(output: &str, name: &str) -> bool {
    output
        .lines()
        .any(|line| line.strip_prefix(name).is_some_and(|rest| rest.starts_with(':')))
}

/// Rewrite the `remote_addrs` line so `address` comes first
fn prefer_gateway(contents: &str, address: &str) -> String {
    let mut out = String::with_capacity(contents.len());
    for line in contents.lines() {
        let trimmed = line.trim_start();
        let value = trimmed
            .strip_prefix(REMOTE_ADDRS_KEY)
            .and_then(|rest| rest.trim_start().strip_prefix('='));

        match value {
            Some(value) => {
                let indent = &line[..line.len() - trimmed.len()];
                let mut addrs: Vec<&str> = value
                    .split(',')
                    .map(str::trim)
                    .filter(|a| !a.is_empty())
                    .collect();
                match addrs.iter().position(|a| *a == address) {
                    Some(pos) => addrs.rotate_left(pos),
                    None => addrs.insert(0, address),
                }
                let _ = writeln!(out, "{}{} = {}", indent, REMOTE_ADDRS_KEY, addrs.join(","));
            }
            None => {
                out.push_str(line);
                out.push('\n');
            }
        }
    }
    out
}

fn join_selectors(selectors: &[TrafficSelector]) -> String {
    selectors
        .iter()
        .map(TrafficSelector::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

fn render_auth(out: &mut String, section: &str, auth: &AuthConfig) {
    let _ = writeln!(out, "        {} {{", section);
    let _ = writeln!(out, "            auth = {}", auth.method.as_tag());
    let _ = writeln!(out, "            id = \"{}\"", auth.id);
    if matches!(auth.method, AuthMethod::Eap(_)) {
        let _ = writeln!(out, "            eap_id = \"{}\"", auth.id);
    }
    if let Credential::Certificate(cert) = &auth.credential {
        let _ = writeln!(out, "            certs = \"{}\"", cert);
    }
    let _ = writeln!(out, "        }}");
}

/// Secrets are written hex-encoded so no quoting rules apply
fn hex_secret(secret: &str) -> String {
    let mut encoded = String::with_capacity(2 + secret.len() * 2);
    encoded.push_str("0x");
    for byte in secret.bytes() {
        let _ = write!(encoded, "{:02x}", byte);
    }
    encoded
}

/// Render a connection in swanctl.conf syntax, secrets included
///
/// Identities and certificate references are quoted; the translator has
/// already refused anything that could end a quoted value or a section.
fn render_connection(config: &ConnectionConfig) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Generated by ikebridge, do not edit");
    let _ = writeln!(out, "connections {{");
    let _ = writeln!(out, "    {} {{", config.name);
    let _ = writeln!(out, "        version = {}", config.version.as_u8());
    let _ = writeln!(out, "        local_addrs = {}", config.local_addrs.join(","));
    let _ = writeln!(
        out,
        "        {} = {}",
        REMOTE_ADDRS_KEY,
        config.remote_addrs.join(",")
    );
    let _ = writeln!(out, "        proposals = {}", config.proposals.join(","));
    if let Some(delay) = config.dpd_delay {
        let _ = writeln!(out, "        dpd_delay = {}s", delay);
    }
    render_auth(&mut out, "local", &config.local);
    render_auth(&mut out, "remote", &config.remote);

    let _ = writeln!(out, "        children {{");
    for child in &config.children {
        let _ = writeln!(out, "            {} {{", child.name);
        let _ = writeln!(out, "                local_ts = {}", join_selectors(&child.local_ts));
        let _ = writeln!(out, "                remote_ts = {}", join_selectors(&child.remote_ts));
        let _ = writeln!(
            out,
            "                esp_proposals = {}",
            child.esp_proposals.join(",")
        );
        let _ = writeln!(out, "                mode = {}", child.mode.as_str());
        let _ = writeln!(out, "                start_action = {}", child.start_action.as_str());
        let _ = writeln!(out, "                dpd_action = {}", child.dpd_action.as_str());
        let _ = writeln!(out, "            }}");
    }
    let _ = writeln!(out, "        }}");
    let _ = writeln!(out, "    }}");
    let _ = writeln!(out, "}}");

    let _ = writeln!(out, "secrets {{");
    if let Some(secret) = config.local.credential.expose_secret() {
        match config.local.method {
            AuthMethod::Eap(_) => {
                let _ = writeln!(out, "    eap-{} {{", config.name);
                let _ = writeln!(out, "        id = \"{}\"", config.local.id);
            }
            _ => {
                let _ = writeln!(out, "    ike-{} {{", config.name);
                let _ = writeln!(out, "        id-local = \"{}\"", config.local.id);
                let _ = writeln!(out, "        id-remote = \"{}\"", config.remote.id);
            }
        }
        let _ = writeln!(out, "        secret = {}", hex_secret(secret));
        let _ = writeln!(out, "    }}");
    }
    let _ = writeln!(out, "}}");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection;
    use serde_json::json;
    use tempfile::tempdir;

    fn sample() -> ConnectionConfig {
        connection::parse_value(&json!({
            "name": "home",
            "local_addrs": ["192.0.2.1"],
            "remote_addrs": ["10.0.0.1", "10.0.0.2", "10.0.0.3"],
            "proposals": ["aes256-sha256-modp2048"],
            "local": {"auth": "psk", "id": "moon", "secret": "s3cr\"et"},
            "remote": {"auth": "psk", "id": "sun"},
            "children": [{
                "name": "net",
                "local_ts": ["10.1.0.0/16"],
                "remote_ts": ["10.2.0.0/16"],
                "start_action": "start"
            }],
            "dpd_delay": 30
        }))
        .unwrap()
    }

    /// Stand-in swanctl that logs its arguments and prints `stdout`
    fn fake_swanctl(dir: &Path, stdout: &str, exit_code: i32) -> SwanctlConfig {
        let binary = dir.join("swanctl");
        let script = format!(
            "#!/bin/sh\necho \"$@\" >> {}\nprintf '%s' '{}'\nexit {}\n",
            dir.join("calls.log").display(),
            stdout,
            exit_code
        );
        std::fs::write(&binary, script).unwrap();
        std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o755)).unwrap();

        SwanctlConfig {
            binary,
            conf_dir: dir.join("conf"),
            command_timeout_secs: 5,
        }
    }

    /// Stand-in swanctl whose `--load-conns` fails while any connection file
    /// mentions the `bogus` proposal
    fn rejecting_swanctl(dir: &Path) -> SwanctlConfig {
        let binary = dir.join("swanctl");
        let script = format!(
            "#!/bin/sh\necho \"$@\" >> {calls}\n\
             if [ \"$1\" = \"--load-conns\" ] && grep -qs bogus {conns}/*.conf; then\n\
             echo 'loading connection failed: invalid proposal' >&2\nexit 1\nfi\nexit 0\n",
            calls = dir.join("calls.log").display(),
            conns = dir.join("conf/conns").display(),
        );
        std::fs::write(&binary, script).unwrap();
        std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o755)).unwrap();

        SwanctlConfig {
            binary,
            conf_dir: dir.join("conf"),
            command_timeout_secs: 5,
        }
    }

    fn with_proposal(name: &str, proposal: &str) -> ConnectionConfig {
        connection::parse_value(&json!({
            "name": name,
            "remote_addrs": ["10.0.0.1", "10.0.0.2"],
            "proposals": [proposal],
            "local": {"auth": "psk", "id": "moon", "secret": "s3cret"},
            "remote": {"auth": "psk", "id": "sun"}
        }))
        .unwrap()
    }

    #[test]
    fn test_render_connection() {
        let rendered = render_connection(&sample());

        assert!(rendered.contains("    home {\n"));
        assert!(rendered.contains("        version = 2\n"));
        assert!(rendered.contains("        remote_addrs = 10.0.0.1,10.0.0.2,10.0.0.3\n"));
        assert!(rendered.contains("        dpd_delay = 30s\n"));
        assert!(rendered.contains("                local_ts = 10.1.0.0/16\n"));
        assert!(rendered.contains("                start_action = start\n"));
        assert!(rendered.contains("            id = \"moon\"\n"));
        assert!(rendered.contains("        id-remote = \"sun\"\n"));
        // The raw secret never appears, quotes included
        assert!(!rendered.contains("s3cr"));
        assert!(rendered.contains(&hex_secret("s3cr\"et")));
    }

    #[test]
    fn test_hex_secret() {
        assert_eq!(hex_secret("ab"), "0x6162");
    }

    #[test]
    fn test_prefer_gateway() {
        let rendered = render_connection(&sample());
        let rewritten = prefer_gateway(&rendered, "10.0.0.3");

        assert!(rewritten.contains("        remote_addrs = 10.0.0.3,10.0.0.1,10.0.0.2\n"));
        assert_eq!(rendered.lines().count(), rewritten.lines().count());
    }

    #[test]
    fn test_lists_sa() {
        let output = "home: #3, ESTABLISHED, IKEv2, 1a2b_i* 3c4d_r\n  local  'moon' @ 192.0.2.1[4500]\n";
        assert!(lists_sa(output, "home"));
        assert!(!lists_sa(output, "hom"));
        assert!(!lists_sa("", "home"));
    }

    #[tokio::test]
    async fn test_apply_writes_private_file_and_reloads() {
        let dir = tempdir().unwrap();
        let daemon = SwanctlDaemon::new(&fake_swanctl(dir.path(), "", 0)).unwrap();

        daemon.apply(sample()).await.unwrap();

        let path = dir.path().join("conf/conns/home.conf");
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        let master = std::fs::read_to_string(dir.path().join("conf/swanctl.conf")).unwrap();
        assert!(master.contains("include conns/*.conf"));

        let calls = std::fs::read_to_string(dir.path().join("calls.log")).unwrap();
        assert!(calls.contains("--load-conns --file"));
        assert!(calls.contains("--load-creds --noprompt --file"));

        daemon.remove("home").await.unwrap();
        assert!(!path.exists());
        assert_eq!(
            daemon.remove("home").await,
            Err(DaemonError::NotFound {
                name: "home".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_failing_swanctl_reports_stderr_or_status() {
        let dir = tempdir().unwrap();
        let daemon = SwanctlDaemon::new(&fake_swanctl(dir.path(), "", 3)).unwrap();

        let err = daemon.apply(sample()).await.unwrap_err();
        assert!(matches!(err, DaemonError::CommandFailed { ref command, .. } if command == "load-conns"));
    }

    #[tokio::test]
    async fn test_sa_exists_parses_list_sas() {
        let dir = tempdir().unwrap();
        let daemon =
            SwanctlDaemon::new(&fake_swanctl(dir.path(), "home: #1, ESTABLISHED, IKEv2", 0))
                .unwrap();

        assert!(daemon.sa_exists("home").await.unwrap());
        assert!(!daemon.sa_exists("office").await.unwrap());
    }

    #[tokio::test]
    async fn test_rejected_new_connection_is_removed() {
        let dir = tempdir().unwrap();
        let daemon = SwanctlDaemon::new(&rejecting_swanctl(dir.path())).unwrap();

        let err = daemon.apply(with_proposal("alpha", "bogus")).await.unwrap_err();
        assert!(matches!(err, DaemonError::CommandFailed { ref command, .. } if command == "load-conns"));
        assert!(!dir.path().join("conf/conns/alpha.conf").exists());

        // Other connections are unaffected by the rejected one
        daemon.apply(with_proposal("beta", "aes256-sha256-modp2048")).await.unwrap();
        assert!(dir.path().join("conf/conns/beta.conf").exists());
    }

    #[tokio::test]
    async fn test_rejected_replacement_restores_previous_file() {
        let dir = tempdir().unwrap();
        let daemon = SwanctlDaemon::new(&rejecting_swanctl(dir.path())).unwrap();
        let path = dir.path().join("conf/conns/beta.conf");

        daemon.apply(with_proposal("beta", "aes256-sha256-modp2048")).await.unwrap();
        let installed = std::fs::read_to_string(&path).unwrap();

        assert!(daemon.apply(with_proposal("beta", "bogus")).await.is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), installed);
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        // Initial load, rejected load, reload of the restored file
        let calls = std::fs::read_to_string(dir.path().join("calls.log")).unwrap();
        assert_eq!(calls.matches("--load-conns").count(), 3);

        daemon.apply(with_proposal("gamma", "default")).await.unwrap();
    }

    #[tokio::test]
    async fn test_names_cannot_leave_conns_dir() {
        let dir = tempdir().unwrap();
        let daemon = SwanctlDaemon::new(&fake_swanctl(dir.path(), "", 0)).unwrap();
        let victim = dir.path().join("victim.conf");
        std::fs::write(&victim, "keep me").unwrap();

        for name in ["../../victim", "../victim", "..", ".hidden", ""] {
            assert_eq!(
                daemon.remove(name).await,
                Err(DaemonError::InvalidName {
                    name: name.to_string()
                }),
                "{:?}",
                name
            );
        }
        assert!(matches!(
            daemon.switch_gateway("../../victim", "10.0.0.2").await,
            Err(DaemonError::InvalidName { .. })
        ));
        assert_eq!(std::fs::read_to_string(&victim).unwrap(), "keep me");
    }
}
