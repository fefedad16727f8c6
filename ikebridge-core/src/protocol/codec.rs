//! Command decoding and result/event encoding
//!
//! Pure functions, no I/O. Unknown fields are ignored so that newer clients
//! keep working against older bridges.

use serde::Deserialize;
use serde_json::Value;

use crate::connection::translator::validate_name;
use crate::error::DecodeError;
use crate::events::Event;
use crate::protocol::{Command, CommandResult};

/// Field carrying the command discriminator
const COMMAND_FIELD: &str = "command";

#[derive(Deserialize)]
struct StartDpdBody {
    ike_sa_name: String,
}

#[derive(Deserialize)]
struct NameBody {
    name: String,
}

/// Decode one request document from raw bytes
pub fn decode(bytes: &[u8]) -> Result<Command, DecodeError> {
    let value: Value = serde_json::from_slice(bytes).map_err(|e| malformed(e.to_string()))?;
    decode_value(value)
}

/// Decode one request document that has already been parsed as JSON
pub fn decode_value(value: Value) -> Result<Command, DecodeError> {
    let command = value
        .as_object()
        .ok_or_else(|| malformed("request must be a JSON object"))?
        .get(COMMAND_FIELD)
        .ok_or_else(|| malformed("missing 'command' field"))?
        .as_str()
        .ok_or_else(|| malformed("'command' must be a string"))?
        .to_string();

    match command.as_str() {
        "apply-configuration" => Ok(Command::ApplyConfiguration(value)),
        "start-dpd" => {
            let body: StartDpdBody = body(value, &command)?;
            Ok(Command::StartDpd {
                ike_sa_name: connection_name(body.ike_sa_name, "ike_sa_name")?,
            })
        }
        "remove-configuration" => {
            let body: NameBody = body(value, &command)?;
            Ok(Command::RemoveConfiguration {
                name: connection_name(body.name, "name")?,
            })
        }
        "reset-failover" => {
            let body: NameBody = body(value, &command)?;
            Ok(Command::ResetFailover {
                name: connection_name(body.name, "name")?,
            })
        }
        "subscribe" => Ok(Command::Subscribe),
        other => Err(malformed(format!("unknown command '{}'", other))),
    }
}

/// Encode a command result as one JSON document
pub fn encode_result(result: &CommandResult) -> Vec<u8> {
    match serde_json::to_vec(result) {
        Ok(bytes) => bytes,
        // Unreachable for the plain enum above; keep the wire total anyway
        Err(_) => br#"{"result":"fail","code":"internal","reason":"encoding failed"}"#.to_vec(),
    }
}

/// Encode an event as one JSON document
pub fn encode_event(event: &Event) -> Vec<u8> {
    serde_json::to_vec(&event.to_envelope()).unwrap_or_else(|_| {
        br#"{"event":"error","connection_name":"","reason":"encoding failed"}"#.to_vec()
    })
}

fn body<T: for<'de> Deserialize<'de>>(value: Value, command: &str) -> Result<T, DecodeError> {
    serde_json::from_value(value).map_err(|e| malformed(format!("invalid '{}' request: {}", command, e)))
}

/// Names that reach the daemon adapter follow the connection naming rules
fn connection_name(value: String, field: &str) -> Result<String, DecodeError> {
    validate_name(&value, field).map_err(|e| malformed(e.to_string()))?;
    Ok(value)
}

fn malformed(reason: impl Into<String>) -> DecodeError {
    DecodeError::MalformedRequest {
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_remove() {
        let command = decode(br#"{"command":"remove-configuration","name":"home"}"#).unwrap();
        assert_eq!(
            command,
            Command::RemoveConfiguration {
                name: "home".to_string()
            }
        );
    }

    #[test]
    fn test_decode_ignores_unknown_fields() {
        let command =
            decode(br#"{"command":"start-dpd","ike_sa_name":"home","client":"nm-plugin"}"#)
                .unwrap();
        assert_eq!(
            command,
            Command::StartDpd {
                ike_sa_name: "home".to_string()
            }
        );
    }

    #[test]
    fn test_decode_rejects_missing_discriminator() {
        let err = decode(br#"{"name":"home"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::MalformedRequest { .. }));
    }

    #[test]
    fn test_decode_rejects_unknown_command() {
        let err = decode(br#"{"command":"reboot"}"#).unwrap_err();
        assert_eq!(err.to_string(), "Malformed request: unknown command 'reboot'");
    }

    #[test]
    fn test_decode_rejects_unsafe_names() {
        for request in [
            r#"{"command":"remove-configuration","name":"../../victim"}"#,
            r#"{"command":"remove-configuration","name":".."}"#,
            r#"{"command":"reset-failover","name":"etc/passwd"}"#,
            r#"{"command":"start-dpd","ike_sa_name":"home }"}"#,
            r#"{"command":"remove-configuration","name":""}"#,
        ] {
            let err = decode(request.as_bytes()).unwrap_err();
            assert!(matches!(err, DecodeError::MalformedRequest { .. }), "{}", request);
        }

        let err = decode(br#"{"command":"remove-configuration","name":"../x"}"#).unwrap_err();
        assert!(err.to_string().contains("name"), "{}", err);
    }

    #[test]
    fn test_encode_results() {
        assert_eq!(encode_result(&CommandResult::Ok), br#"{"result":"ok"}"#.to_vec());

        let fail = CommandResult::fail(crate::error::ErrorCode::NotFound, "no such connection");
        let value: Value = serde_json::from_slice(&encode_result(&fail)).unwrap();
        assert_eq!(value["result"], "fail");
        assert_eq!(value["code"], "not-found");
        assert_eq!(value["reason"], "no such connection");
    }
}
