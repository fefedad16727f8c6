//! Lifecycle events streamed to subscribed clients

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

pub mod publisher;

pub use publisher::{EventPublisher, SubscriberId, Subscription};

/// Kind of lifecycle occurrence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    TunnelUp,
    TunnelDown,
    ConfigApplied,
    Error,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::TunnelUp => write!(f, "tunnel-up"),
            EventKind::TunnelDown => write!(f, "tunnel-down"),
            EventKind::ConfigApplied => write!(f, "config-applied"),
            EventKind::Error => write!(f, "error"),
        }
    }
}

/// A single lifecycle occurrence for one connection
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub kind: EventKind,
    pub connection_name: String,
    pub timestamp: DateTime<Utc>,
    pub payload: Map<String, Value>,
}

/// Wire shape: `{"event":..,"connection_name":..,"timestamp":..,...payload}`
#[derive(Serialize)]
pub(crate) struct EventEnvelope<'a> {
    event: EventKind,
    connection_name: &'a str,
    timestamp: String,
    #[serde(flatten)]
    payload: &'a Map<String, Value>,
}

impl Event {
    /// Create an event stamped with the current time
    pub fn new(kind: EventKind, connection_name: impl Into<String>) -> Self {
        Self {
            kind,
            connection_name: connection_name.into(),
            timestamp: Utc::now(),
            payload: Map::new(),
        }
    }

    /// Add a payload field
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.payload.insert(key.to_string(), value.into());
        self
    }

    pub(crate) fn to_envelope(&self) -> EventEnvelope<'_> {
        EventEnvelope {
            event: self.kind,
            connection_name: &self.connection_name,
            timestamp: self.timestamp.to_rfc3339(),
            payload: &self.payload,
        }
    }

    pub fn tunnel_up(connection_name: impl Into<String>) -> Self {
        Self::new(EventKind::TunnelUp, connection_name)
    }

    pub fn tunnel_down(connection_name: impl Into<String>) -> Self {
        Self::new(EventKind::TunnelDown, connection_name)
    }

    pub fn config_applied(connection_name: impl Into<String>) -> Self {
        Self::new(EventKind::ConfigApplied, connection_name)
    }

    /// Error event carrying a human readable message
    pub fn error(connection_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(EventKind::Error, connection_name).with("message", message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::encode_event;

    #[test]
    fn test_event_wire_shape() {
        let event = Event::tunnel_up("home")
            .with("ike_sa_id", 3)
            .with("remote_addr", "10.0.0.2");

        let value: Value = serde_json::from_slice(&encode_event(&event)).unwrap();
        assert_eq!(value["event"], "tunnel-up");
        assert_eq!(value["connection_name"], "home");
        assert_eq!(value["ike_sa_id"], 3);
        assert_eq!(value["remote_addr"], "10.0.0.2");
        assert!(value["timestamp"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn test_error_event_message() {
        let event = Event::error("home", "retry limit exceeded");
        assert_eq!(event.kind, EventKind::Error);
        assert_eq!(event.payload["message"], "retry limit exceeded");
        assert_eq!(event.kind.to_string(), "error");
    }
}
