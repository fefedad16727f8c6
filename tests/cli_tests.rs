//! Tests for the ikebridge command line
//!
//! These drive the built binary; none of them needs strongSwan.

use std::process::Command;

use tempfile::tempdir;

const IKEBRIDGE_BINARY: &str = env!("CARGO_BIN_EXE_ikebridge");

#[test]
fn test_help_lists_subcommands() {
    let output = Command::new(IKEBRIDGE_BINARY)
        .arg("--help")
        .output()
        .expect("Failed to run ikebridge");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for subcommand in ["daemon", "stop", "send", "monitor"] {
        assert!(stdout.contains(subcommand), "missing {}", subcommand);
    }
}

#[test]
fn test_send_without_bridge_fails() {
    let dir = tempdir().unwrap();
    let request = dir.path().join("request.json");
    std::fs::write(&request, r#"{"command":"reset-failover","name":"home"}"#).unwrap();

    let output = Command::new(IKEBRIDGE_BINARY)
        .arg("send")
        .arg(&request)
        .arg("--socket")
        .arg(dir.path().join("missing.sock"))
        .output()
        .expect("Failed to run ikebridge");

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to talk to ikebridge"), "{}", stderr);
}

#[test]
fn test_invalid_config_exits_with_2() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("config.toml");
    std::fs::write(&config, "[failover]\ndefault_max_retries = 0\n").unwrap();

    let output = Command::new(IKEBRIDGE_BINARY)
        .arg("daemon")
        .arg("--foreground")
        .arg("--config")
        .arg(&config)
        .arg("--pid-file")
        .arg(dir.path().join("ikebridge.pid"))
        .output()
        .expect("Failed to run ikebridge");

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("default_max_retries"), "{}", stderr);
}

#[test]
fn test_stop_without_daemon_fails() {
    let dir = tempdir().unwrap();

    let output = Command::new(IKEBRIDGE_BINARY)
        .arg("stop")
        .arg("--pid-file")
        .arg(dir.path().join("ikebridge.pid"))
        .output()
        .expect("Failed to run ikebridge");

    assert_eq!(output.status.code(), Some(1));
}
