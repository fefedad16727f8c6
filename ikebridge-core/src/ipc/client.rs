//! Blocking control socket client

use std::io::{BufRead, BufReader, Read, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::PathBuf;

use serde_json::Value;

use crate::error::BridgeError;
use crate::protocol::CommandResult;

fn invalid_data(reason: impl Into<String>) -> BridgeError {
    BridgeError::Io(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        reason.into(),
    ))
}

/// IPC client for talking to a running bridge
pub struct IpcClient {
    socket_path: PathBuf,
}

impl IpcClient {
    /// Create a new IPC client
    pub fn new(socket_path: PathBuf) -> Self {
        Self { socket_path }
    }

    /// Send raw request bytes and collect every reply
    ///
    /// The write side is closed after sending, so the server answers all
    /// requests in the payload and then hangs up.
    pub fn send_raw(&self, request: &[u8]) -> Result<Vec<CommandResult>, BridgeError> {
        let mut stream = UnixStream::connect(&self.socket_path)?;
        stream.write_all(request)?;
        stream.flush()?;
        stream.shutdown(Shutdown::Write)?;

        let mut buffer = Vec::new();
        stream.read_to_end(&mut buffer)?;

        serde_json::Deserializer::from_slice(&buffer)
            .into_iter::<CommandResult>()
            .map(|result| {
                result.map_err(|e| invalid_data(format!("Failed to decode reply: {}", e)))
            })
            .collect()
    }

    /// Send one command document and return its result
    pub fn send_command(&self, command: &Value) -> Result<CommandResult, BridgeError> {
        let request = serde_json::to_vec(command)
            .map_err(|e| invalid_data(format!("Failed to encode command: {}", e)))?;

        self.send_raw(&request)?
            .into_iter()
            .next()
            .ok_or_else(|| invalid_data("Connection closed without a reply"))
    }

    /// Attach to the event stream
    ///
    /// Returns once the server acknowledged the subscription.
    pub fn subscribe(&self) -> Result<EventStream, BridgeError> {
        let mut stream = UnixStream::connect(&self.socket_path)?;
        stream.write_all(br#"{"command":"subscribe"}"#)?;
        stream.flush()?;

        let mut events = EventStream {
            reader: BufReader::new(stream),
        };
        match events.next_document()? {
            Some(reply) => match serde_json::from_value::<CommandResult>(reply) {
                Ok(CommandResult::Ok) => Ok(events),
                Ok(CommandResult::Fail { code, reason }) => {
                    Err(invalid_data(format!("Subscribe rejected ({}): {}", code, reason)))
                }
                Err(e) => Err(invalid_data(format!("Unexpected subscribe reply: {}", e))),
            },
            None => Err(invalid_data("Connection closed without a reply")),
        }
    }
}

/// Events received after subscribing, one JSON document per line
pub struct EventStream {
    reader: BufReader<UnixStream>,
}

impl EventStream {
    fn next_document(&mut self) -> Result<Option<Value>, BridgeError> {
        let mut line = String::new();
        loop {
            line.clear();
            if self.reader.read_line(&mut line)? == 0 {
                return Ok(None);
            }
            if !line.trim().is_empty() {
                break;
            }
        }
        serde_json::from_str(line.trim())
            .map(Some)
            .map_err(|e| invalid_data(format!("Failed to decode event: {}", e)))
    }
}

impl Iterator for EventStream {
    type Item = Result<Value, BridgeError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_document().transpose()
    }
}
