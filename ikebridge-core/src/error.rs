//! Error types for the ikebridge control bridge
//!
//! This module defines all error types used throughout the bridge and the
//! mapping from each of them to the error code reported on the wire.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the bridge
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Errors related to bridge configuration loading/parsing
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Malformed wire input
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Structurally invalid connection document
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The IKE daemon rejected or failed an operation
    #[error("Daemon error: {0}")]
    Daemon(#[from] DaemonError),

    /// Gateway failover errors
    #[error("Failover error: {0}")]
    Failover(#[from] FailoverError),

    /// A dead-peer-detection check is already outstanding for the connection
    #[error("Dead peer detection already in progress for '{name}'")]
    Busy { name: String },

    /// Generic I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing errors
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl BridgeError {
    /// Wire error code reported to the client for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            BridgeError::Decode(_) => ErrorCode::MalformedRequest,
            BridgeError::Validation(_) => ErrorCode::ConfigInvalid,
            BridgeError::Daemon(DaemonError::NotFound { .. }) => ErrorCode::NotFound,
            BridgeError::Daemon(_) => ErrorCode::DaemonApiError,
            BridgeError::Failover(FailoverError::RetryExceeded { .. }) => ErrorCode::RetryExceeded,
            BridgeError::Failover(FailoverError::UnknownConnection { .. }) => ErrorCode::NotFound,
            BridgeError::Failover(FailoverError::NoGateways { .. }) => ErrorCode::ConfigInvalid,
            BridgeError::Busy { .. } => ErrorCode::Busy,
            BridgeError::Config(_) | BridgeError::Io(_) | BridgeError::Toml(_) => {
                ErrorCode::Internal
            }
        }
    }
}

/// Error codes carried by failed results on the control socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    MalformedRequest,
    ConfigInvalid,
    DaemonApiError,
    RetryExceeded,
    NotFound,
    Busy,
    Internal,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code = match self {
            ErrorCode::MalformedRequest => "malformed-request",
            ErrorCode::ConfigInvalid => "config-invalid",
            ErrorCode::DaemonApiError => "daemon-api-error",
            ErrorCode::RetryExceeded => "retry-exceeded",
            ErrorCode::NotFound => "not-found",
            ErrorCode::Busy => "busy",
            ErrorCode::Internal => "internal",
        };
        f.write_str(code)
    }
}

/// Bridge configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration file: {path}")]
    LoadFailed { path: String },

    #[error("Configuration validation error: {message}")]
    ValidationError { message: String },

    #[error("I/O error: {message}")]
    IoError { message: String },
}

/// Wire decoding errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Malformed request: {reason}")]
    MalformedRequest { reason: String },

    #[error("Message exceeds {limit} bytes")]
    Oversized { limit: usize },
}

/// Connection document validation errors
///
/// Every variant carries the path of the offending field, e.g.
/// `children[0].local_ts[1]`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required field: {path}")]
    MissingField { path: String },

    #[error("Field must not be empty: {path}")]
    Empty { path: String },

    #[error("Invalid address at {path}: {value}")]
    InvalidAddress { path: String, value: String },

    #[error("Invalid traffic selector at {path}: {value}")]
    InvalidSelector { path: String, value: String },

    #[error("Invalid value at {path}: {message}")]
    InvalidValue { path: String, message: String },

    #[error("Document is not a JSON object: {reason}")]
    NotAnObject { reason: String },
}

impl ValidationError {
    /// Path of the field that failed validation
    pub fn path(&self) -> &str {
        match self {
            ValidationError::MissingField { path }
            | ValidationError::Empty { path }
            | ValidationError::InvalidAddress { path, .. }
            | ValidationError::InvalidSelector { path, .. }
            | ValidationError::InvalidValue { path, .. } => path,
            ValidationError::NotAnObject { .. } => "",
        }
    }
}

/// IKE daemon adapter errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DaemonError {
    #[error("Connection or SA not found: {name}")]
    NotFound { name: String },

    #[error("Daemon command '{command}' failed: {reason}")]
    CommandFailed { command: String, reason: String },

    #[error("Failed to spawn daemon tool: {reason}")]
    SpawnFailed { reason: String },

    #[error("Daemon command timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Connection name '{name}' cannot be used as a file name")]
    InvalidName { name: String },

    #[error("Failed to write connection file {path}: {reason}")]
    WriteFailed { path: String, reason: String },
}

/// Gateway failover errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FailoverError {
    #[error("Connection '{name}' is not registered for failover")]
    UnknownConnection { name: String },

    #[error("Connection '{name}' has no remote gateways")]
    NoGateways { name: String },

    #[error("Retry limit ({max_retries}) exceeded for '{name}'")]
    RetryExceeded { name: String, max_retries: u32 },
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, BridgeError>;
