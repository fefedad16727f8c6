//! `ikebridge monitor`: follow the lifecycle event stream

use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, Local};
use colored::Colorize;
use ikebridge_core::ipc::IpcClient;
use serde_json::Value;

pub fn run_monitor(socket: Option<PathBuf>) -> anyhow::Result<()> {
    let socket = super::resolve_socket(socket)?;
    let events = IpcClient::new(socket.clone())
        .subscribe()
        .with_context(|| format!("Failed to subscribe at {}", socket.display()))?;

    println!("Watching events on {} (Ctrl+C to stop)", socket.display());
    for event in events {
        let event = event.context("Event stream broken")?;
        println!("{}", format_event(&event));
    }

    println!("ikebridge closed the connection");
    Ok(())
}

fn format_event(event: &Value) -> String {
    let time = event["timestamp"]
        .as_str()
        .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
        .map(|ts| ts.with_timezone(&Local).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "--:--:--".to_string());

    let kind = event["event"].as_str().unwrap_or("unknown");
    let kind = match kind {
        "tunnel-up" => kind.green(),
        "tunnel-down" => kind.yellow(),
        "error" => kind.red(),
        _ => kind.cyan(),
    };

    let name = event["connection_name"].as_str().unwrap_or("-");

    let details: Vec<String> = event
        .as_object()
        .map(|fields| {
            fields
                .iter()
                .filter(|(key, _)| !matches!(key.as_str(), "event" | "connection_name" | "timestamp"))
                .map(|(key, value)| match value {
                    Value::String(s) => format!("{}={}", key, s),
                    other => format!("{}={}", key, other),
                })
                .collect()
        })
        .unwrap_or_default();

    format!("{} {} {} {}", time.dimmed(), kind.bold(), name, details.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_format_event_lists_payload() {
        colored::control::set_override(false);
        let line = format_event(&json!({
            "event": "tunnel-down",
            "connection_name": "home",
            "timestamp": "2024-05-01T10:00:00+00:00",
            "reason": "peer not responding",
            "retransmits": 5
        }));

        assert!(line.contains("tunnel-down home"));
        assert!(line.contains("reason=peer not responding"));
        assert!(line.contains("retransmits=5"));
    }
}
