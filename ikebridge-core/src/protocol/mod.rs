//! Control socket wire protocol
//!
//! Requests, results and events are exchanged as self-delimiting JSON
//! documents on a Unix stream socket.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{BridgeError, ErrorCode};

pub mod codec;
pub mod framing;

pub use codec::{decode, decode_value, encode_event, encode_result};
pub use framing::FrameDecoder;

/// A decoded client request
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Install or replace a connection; carries the whole request document,
    /// which the config translator validates
    ApplyConfiguration(Value),

    /// Check that the peer of an established IKE SA is alive
    StartDpd { ike_sa_name: String },

    /// Remove a connection and its failover state
    RemoveConfiguration { name: String },

    /// Clear an exhausted failover counter
    ResetFailover { name: String },

    /// Attach this client to the event stream
    Subscribe,
}

impl Command {
    /// Wire name of the command, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Command::ApplyConfiguration(_) => "apply-configuration",
            Command::StartDpd { .. } => "start-dpd",
            Command::RemoveConfiguration { .. } => "remove-configuration",
            Command::ResetFailover { .. } => "reset-failover",
            Command::Subscribe => "subscribe",
        }
    }
}

/// Response to a single command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "lowercase")]
pub enum CommandResult {
    Ok,
    Fail { code: ErrorCode, reason: String },
}

impl CommandResult {
    /// Build a failure result with an explicit code
    pub fn fail(code: ErrorCode, reason: impl Into<String>) -> Self {
        CommandResult::Fail {
            code,
            reason: reason.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, CommandResult::Ok)
    }

    /// Error code of a failed result
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            CommandResult::Ok => None,
            CommandResult::Fail { code, .. } => Some(*code),
        }
    }
}

impl From<&BridgeError> for CommandResult {
    fn from(err: &BridgeError) -> Self {
        CommandResult::fail(err.code(), err.to_string())
    }
}

impl<T> From<crate::error::Result<T>> for CommandResult {
    fn from(result: crate::error::Result<T>) -> Self {
        match result {
            Ok(_) => CommandResult::Ok,
            Err(e) => CommandResult::from(&e),
        }
    }
}
