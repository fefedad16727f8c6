//! Tests for bridge configuration parsing and validation

use std::path::PathBuf;

use ikebridge_core::config::toml_config::{load_config, load_config_from_path};
use ikebridge_core::config::{BridgeConfig, DEFAULT_SOCKET_PATH};
use ikebridge_core::error::{BridgeError, ConfigError};
use tempfile::tempdir;

#[test]
fn test_defaults_are_valid() {
    let config = BridgeConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.server.socket_path, PathBuf::from(DEFAULT_SOCKET_PATH));
    assert_eq!(config.server.max_message_bytes, 1024 * 1024);
    assert_eq!(config.failover.default_max_retries, 5);
    assert_eq!(config.swanctl.command_timeout_secs, 30);
    assert_eq!(config.logging.level, "info");
    assert!(!config.logging.journald);
}

#[test]
fn test_parse_partial_file() {
    let toml_str = r#"
        [failover]
        default_max_retries = 8

        [swanctl]
        binary = "/usr/sbin/swanctl"

        [logging]
        level = "debug"
        journald = true
    "#;

    let config: BridgeConfig = toml::from_str(toml_str).unwrap();
    assert!(config.validate().is_ok());
    assert_eq!(config.failover.default_max_retries, 8);
    assert_eq!(config.swanctl.binary, PathBuf::from("/usr/sbin/swanctl"));
    assert_eq!(config.swanctl.conf_dir, PathBuf::from("/etc/swanctl/ikebridge"));
    assert!(config.logging.journald);
    assert_eq!(config.server.event_queue_depth, 256);
}

#[test]
fn test_validation_messages() {
    let mut config = BridgeConfig::default();
    config.server.max_message_bytes = 100;
    assert_eq!(
        config.validate().unwrap_err(),
        "server.max_message_bytes must be at least 1024, got: 100"
    );

    let mut config = BridgeConfig::default();
    config.server.socket_path = PathBuf::from(format!("/tmp/{}.sock", "s".repeat(120)));
    assert!(config.validate().unwrap_err().contains("too long"));

    let mut config = BridgeConfig::default();
    config.server.event_queue_depth = 0;
    assert!(config.validate().is_err());

    let mut config = BridgeConfig::default();
    config.swanctl.command_timeout_secs = 0;
    assert_eq!(
        config.validate().unwrap_err(),
        "swanctl.command_timeout_secs must be between 1 and 600, got: 0"
    );
}

#[test]
fn test_level_filter() {
    let mut config = BridgeConfig::default();
    config.logging.level = "WARN".to_string();
    assert_eq!(
        config.logging.level_filter().unwrap(),
        tracing_subscriber::filter::LevelFilter::WARN
    );
}

#[test]
fn test_load_invalid_file() {
    let dir = tempdir().unwrap();

    let syntax = dir.path().join("syntax.toml");
    std::fs::write(&syntax, "[server\nsocket_path = 1").unwrap();
    assert!(matches!(
        load_config_from_path(&syntax),
        Err(BridgeError::Config(ConfigError::ValidationError { .. }))
    ));

    let range = dir.path().join("range.toml");
    std::fs::write(&range, "[failover]\ndefault_max_retries = 500\n").unwrap();
    match load_config_from_path(&range) {
        Err(BridgeError::Config(ConfigError::ValidationError { message })) => {
            assert!(message.contains("default_max_retries"))
        }
        other => panic!("unexpected result: {:?}", other.map(|_| ())),
    }

    assert!(matches!(
        load_config_from_path(dir.path().join("missing.toml")),
        Err(BridgeError::Config(ConfigError::LoadFailed { .. }))
    ));
}

// The only test touching the environment, so it cannot race with others
#[test]
fn test_environment_overrides() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        "[server]\nsocket_path = \"/run/ikebridge/control.sock\"\n",
    )
    .unwrap();

    std::env::set_var("IKEBRIDGE_CONFIG", &path);
    std::env::remove_var("IKEBRIDGE_SOCKET");
    let config = load_config().unwrap();
    assert_eq!(
        config.server.socket_path,
        PathBuf::from("/run/ikebridge/control.sock")
    );

    std::env::set_var("IKEBRIDGE_SOCKET", "/tmp/override.sock");
    let config = load_config().unwrap();
    assert_eq!(config.server.socket_path, PathBuf::from("/tmp/override.sock"));

    // A missing file falls back to the defaults
    std::env::set_var("IKEBRIDGE_CONFIG", dir.path().join("absent.toml"));
    std::env::remove_var("IKEBRIDGE_SOCKET");
    let config = load_config().unwrap();
    assert_eq!(config.failover.default_max_retries, 5);

    std::env::remove_var("IKEBRIDGE_CONFIG");
}
