//! Pattern-based parser for charon log lines streamed by `swanctl --log`
//!
//! Extracts DaemonNotifications from lines such as
//! `13[IKE] <home|1> IKE_SA home[1] established between 192.0.2.1[moon]...10.0.0.1[sun]`

use regex::Regex;

use crate::daemon::DaemonNotification;

/// Parser for charon log output
pub struct LogParser {
    /// Pattern for the `NN[GRP] <conn|id> message` line prefix
    prefix_pattern: Regex,
    /// Pattern for "IKE_SA home[1] established between a[..]...b[..]"
    ike_established_pattern: Regex,
    /// Pattern for "CHILD_SA net{1} established with SPIs x_i y_o and TS a === b"
    child_established_pattern: Regex,
    /// Pattern for "deleting IKE_SA home[1] between ..."
    ike_deleted_pattern: Regex,
    /// Pattern for "giving up after 5 retransmits"
    giving_up_pattern: Regex,
}

impl LogParser {
    /// Create a new LogParser with compiled regex patterns
    pub fn new() -> Self {
        Self {
            prefix_pattern: Regex::new(r"^\s*\d*\[(\w+)\]\s+<([^|>]+)\|(\d+)>\s+(.*)$")
                .expect("Failed to compile prefix pattern"),
            ike_established_pattern: Regex::new(
                r"IKE_SA \S+\[(\d+)\] established between ([^\[\s]+)\[[^\]]*\]\.\.\.([^\[\s]+)\[",
            )
            .expect("Failed to compile ike_established pattern"),
            child_established_pattern: Regex::new(
                r"CHILD_SA (\S+)\{\d+\} established with SPIs (\S+) (\S+) and TS (.+?) === (.+?)\s*$",
            )
            .expect("Failed to compile child_established pattern"),
            ike_deleted_pattern: Regex::new(r"deleting IKE_SA \S+\[(\d+)\]")
                .expect("Failed to compile ike_deleted pattern"),
            giving_up_pattern: Regex::new(r"giving up after (\d+) retransmits")
                .expect("Failed to compile giving_up pattern"),
        }
    }

    /// Parse one log line
    ///
    /// Returns `None` for lines that carry no lifecycle information or are
    /// not attributed to a connection.
    pub fn parse_line(&self, line: &str) -> Option<DaemonNotification> {
        let prefix = self.prefix_pattern.captures(line)?;
        let name = prefix.get(2)?.as_str().to_string();
        let unique_id: u32 = prefix.get(3)?.as_str().parse().ok()?;
        let message = prefix.get(4)?.as_str();

        if let Some(captures) = self.ike_established_pattern.captures(message) {
            return Some(DaemonNotification::IkeUp {
                name,
                ike_sa_id: captures[1].parse().unwrap_or(unique_id),
                local_addr: captures[2].to_string(),
                remote_addr: captures[3].to_string(),
            });
        }

        if let Some(captures) = self.child_established_pattern.captures(message) {
            return Some(DaemonNotification::ChildUp {
                name,
                child: captures[1].to_string(),
                spi_in: captures[2].trim_end_matches("_i").to_string(),
                spi_out: captures[3].trim_end_matches("_o").to_string(),
                local_ts: captures[4].to_string(),
                remote_ts: captures[5].to_string(),
            });
        }

        if let Some(captures) = self.ike_deleted_pattern.captures(message) {
            return Some(DaemonNotification::IkeDown {
                name,
                ike_sa_id: captures[1].parse().unwrap_or(unique_id),
                reason: "deleted".to_string(),
            });
        }

        if let Some(captures) = self.giving_up_pattern.captures(message) {
            return Some(DaemonNotification::PeerUnreachable {
                name,
                retransmits: captures[1].parse().unwrap_or(0),
            });
        }

        None
    }
}

impl Default for LogParser {
    fn default() -> Self {
        Self::new()
    }
}
