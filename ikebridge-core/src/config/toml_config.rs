//! TOML configuration file I/O
//!
//! Loads the bridge configuration from TOML files.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::BridgeConfig;
use crate::error::{BridgeError, ConfigError};

/// Default configuration file
const DEFAULT_CONFIG_PATH: &str = "/etc/ikebridge/config.toml";

/// Get the configuration file path
///
/// Returns IKEBRIDGE_CONFIG if set, otherwise /etc/ikebridge/config.toml
pub fn get_config_path() -> PathBuf {
    std::env::var("IKEBRIDGE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Load configuration from the default location
///
/// A missing file is not an error: the built-in defaults are used.
pub fn load_config() -> Result<BridgeConfig, BridgeError> {
    let path = get_config_path();
    if path.exists() {
        load_config_from_path(&path)
    } else {
        debug!(path = %path.display(), "No configuration file, using defaults");
        let mut config = BridgeConfig::default();
        apply_env_overrides(&mut config);
        Ok(config)
    }
}

/// Load configuration from a specific TOML file
pub fn load_config_from_path<P: AsRef<Path>>(path: P) -> Result<BridgeConfig, BridgeError> {
    let contents = std::fs::read_to_string(&path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => BridgeError::Config(ConfigError::LoadFailed {
            path: path.as_ref().to_string_lossy().to_string(),
        }),
        _ => BridgeError::Config(ConfigError::IoError {
            message: format!("Failed to read config file: {}", e),
        }),
    })?;

    let mut config: BridgeConfig = toml::from_str(&contents).map_err(|e| {
        BridgeError::Config(ConfigError::ValidationError {
            message: format!("Failed to parse config file: {}", e),
        })
    })?;

    apply_env_overrides(&mut config);

    config
        .validate()
        .map_err(|e| BridgeError::Config(ConfigError::ValidationError { message: e }))?;

    info!(
        "Loaded configuration: socket={}, default_max_retries={}, swanctl_conf_dir={}",
        config.server.socket_path.display(),
        config.failover.default_max_retries,
        config.swanctl.conf_dir.display()
    );

    Ok(config)
}

/// IKEBRIDGE_SOCKET takes precedence over the configured socket path
fn apply_env_overrides(config: &mut BridgeConfig) {
    if let Ok(socket) = std::env::var("IKEBRIDGE_SOCKET") {
        if !socket.is_empty() {
            config.server.socket_path = PathBuf::from(socket);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_from_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("test_config.toml");
        std::fs::write(
            &config_path,
            "[failover]\ndefault_max_retries = 7\n\n[logging]\nlevel = \"debug\"\n",
        )
        .unwrap();

        let loaded_config = load_config_from_path(&config_path).unwrap();

        // IKEBRIDGE_SOCKET may be set in the environment running the tests
        let mut expected = BridgeConfig::default();
        expected.failover.default_max_retries = 7;
        expected.logging.level = "debug".to_string();
        assert_eq!(expected.failover, loaded_config.failover);
        assert_eq!(expected.swanctl, loaded_config.swanctl);
        assert_eq!(expected.logging, loaded_config.logging);
    }

    #[test]
    fn test_invalid_config_validation() {
        let mut retries = BridgeConfig::default();
        retries.failover.default_max_retries = 0;

        let mut level = BridgeConfig::default();
        level.logging.level = "loud".to_string();

        let mut conf_dir = BridgeConfig::default();
        conf_dir.swanctl.conf_dir = PathBuf::from("relative/dir");

        for config in [retries, level, conf_dir] {
            assert!(config.validate().is_err());
        }
    }
}
