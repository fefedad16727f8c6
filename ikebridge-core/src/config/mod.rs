//! Configuration module
//!
//! Handles the bridge's own settings (socket, failover defaults, swanctl
//! integration, logging), loaded from a TOML file.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub mod toml_config;

/// Well-known control socket path
pub const DEFAULT_SOCKET_PATH: &str = "/var/run/ikebridge.sock";

/// Bridge configuration structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BridgeConfig {
    /// Control socket settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Gateway failover defaults
    #[serde(default)]
    pub failover: FailoverConfig,

    /// strongSwan integration
    #[serde(default)]
    pub swanctl: SwanctlConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl BridgeConfig {
    /// Validate the entire configuration
    ///
    /// Returns the first validation error encountered.
    pub fn validate(&self) -> Result<(), String> {
        self.server.validate()?;
        self.failover.validate()?;
        self.swanctl.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

/// Control socket settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Path of the Unix-domain control socket
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,

    /// Largest single request accepted, in bytes
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,

    /// Events buffered per subscriber before it is considered stalled
    #[serde(default = "default_event_queue_depth")]
    pub event_queue_depth: usize,
}

fn default_socket_path() -> PathBuf {
    PathBuf::from(DEFAULT_SOCKET_PATH)
}
fn default_max_message_bytes() -> usize {
    1024 * 1024
}
fn default_event_queue_depth() -> usize {
    256
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            max_message_bytes: default_max_message_bytes(),
            event_queue_depth: default_event_queue_depth(),
        }
    }
}

impl ServerConfig {
    fn validate(&self) -> Result<(), String> {
        if self.socket_path.as_os_str().is_empty() {
            return Err("server.socket_path cannot be empty".to_string());
        }
        // sockaddr_un limits paths to 108 bytes including the terminator
        if self.socket_path.as_os_str().len() > 107 {
            return Err(format!(
                "server.socket_path is too long ({} bytes, max 107)",
                self.socket_path.as_os_str().len()
            ));
        }
        if self.max_message_bytes < 1024 {
            return Err(format!(
                "server.max_message_bytes must be at least 1024, got: {}",
                self.max_message_bytes
            ));
        }
        if self.event_queue_depth == 0 || self.event_queue_depth > 65536 {
            return Err(format!(
                "server.event_queue_depth must be between 1 and 65536, got: {}",
                self.event_queue_depth
            ));
        }
        Ok(())
    }
}

/// Gateway failover defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailoverConfig {
    /// Ceiling used when a connection document sets no `max_retries`
    #[serde(default = "default_max_retries")]
    pub default_max_retries: u32,
}

fn default_max_retries() -> u32 {
    5
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            default_max_retries: default_max_retries(),
        }
    }
}

impl FailoverConfig {
    fn validate(&self) -> Result<(), String> {
        if self.default_max_retries < 1 || self.default_max_retries > 100 {
            return Err(format!(
                "failover.default_max_retries must be between 1 and 100, got: {}",
                self.default_max_retries
            ));
        }
        Ok(())
    }
}

/// strongSwan integration settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwanctlConfig {
    /// swanctl executable
    #[serde(default = "default_swanctl_binary")]
    pub binary: PathBuf,

    /// Directory holding the generated swanctl.conf and connection files
    #[serde(default = "default_conf_dir")]
    pub conf_dir: PathBuf,

    /// Upper bound for any single swanctl invocation
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
}

fn default_swanctl_binary() -> PathBuf {
    PathBuf::from("swanctl")
}
fn default_conf_dir() -> PathBuf {
    PathBuf::from("/etc/swanctl/ikebridge")
}
fn default_command_timeout() -> u64 {
    30
}

impl Default for SwanctlConfig {
    fn default() -> Self {
        Self {
            binary: default_swanctl_binary(),
            conf_dir: default_conf_dir(),
            command_timeout_secs: default_command_timeout(),
        }
    }
}

impl SwanctlConfig {
    fn validate(&self) -> Result<(), String> {
        if self.binary.as_os_str().is_empty() {
            return Err("swanctl.binary cannot be empty".to_string());
        }
        if !self.conf_dir.is_absolute() {
            return Err(format!(
                "swanctl.conf_dir must be an absolute path, got: {}",
                self.conf_dir.display()
            ));
        }
        if self.command_timeout_secs < 1 || self.command_timeout_secs > 600 {
            return Err(format!(
                "swanctl.command_timeout_secs must be between 1 and 600, got: {}",
                self.command_timeout_secs
            ));
        }
        Ok(())
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Minimum level: error, warn, info, debug or trace
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Force journald output even when not started by systemd
    #[serde(default)]
    pub journald: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            journald: false,
        }
    }
}

impl LoggingConfig {
    fn validate(&self) -> Result<(), String> {
        self.level_filter().map(|_| ())
    }

    /// Parsed level filter
    pub fn level_filter(&self) -> Result<tracing_subscriber::filter::LevelFilter, String> {
        use tracing_subscriber::filter::LevelFilter;

        match self.level.to_ascii_lowercase().as_str() {
            "error" => Ok(LevelFilter::ERROR),
            "warn" => Ok(LevelFilter::WARN),
            "info" => Ok(LevelFilter::INFO),
            "debug" => Ok(LevelFilter::DEBUG),
            "trace" => Ok(LevelFilter::TRACE),
            other => Err(format!(
                "logging.level must be one of error, warn, info, debug, trace, got: {}",
                other
            )),
        }
    }
}
