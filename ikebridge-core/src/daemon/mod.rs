//! IKE daemon adapters
//!
//! The bridge never negotiates SAs itself. It hands configurations to an
//! adapter and listens to the lifecycle notifications the adapter reports.
//! `SwanctlDaemon` drives strongSwan in production; `InMemoryDaemon` backs
//! the tests.

use std::future::Future;

use tokio::sync::mpsc;

use crate::connection::ConnectionConfig;
use crate::error::DaemonError;

pub mod log_parser;
pub mod memory;
pub mod swanctl;

pub use log_parser::LogParser;
pub use memory::InMemoryDaemon;
pub use swanctl::SwanctlDaemon;

/// Lifecycle notification reported by the daemon
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonNotification {
    /// IKE SA established with a gateway
    IkeUp {
        name: String,
        ike_sa_id: u32,
        local_addr: String,
        remote_addr: String,
    },

    /// Child SA installed
    ChildUp {
        name: String,
        child: String,
        spi_in: String,
        spi_out: String,
        local_ts: String,
        remote_ts: String,
    },

    /// IKE SA deleted
    IkeDown {
        name: String,
        ike_sa_id: u32,
        reason: String,
    },

    /// The current gateway stopped answering
    PeerUnreachable { name: String, retransmits: u32 },

    /// Outcome of a requested dead peer detection check
    DpdCompleted { name: String, alive: bool },
}

impl DaemonNotification {
    /// Connection the notification refers to
    pub fn connection_name(&self) -> &str {
        match self {
            DaemonNotification::IkeUp { name, .. }
            | DaemonNotification::ChildUp { name, .. }
            | DaemonNotification::IkeDown { name, .. }
            | DaemonNotification::PeerUnreachable { name, .. }
            | DaemonNotification::DpdCompleted { name, .. } => name,
        }
    }
}

/// Operations the bridge needs from the IKE daemon
///
/// Implementations own any timeout policy toward the daemon.
pub trait IkeDaemon: Send + Sync + 'static {
    /// Install or replace a connection
    fn apply(&self, config: ConnectionConfig)
        -> impl Future<Output = Result<(), DaemonError>> + Send;

    /// Remove a connection, terminating its SAs
    ///
    /// Returns `DaemonError::NotFound` if the daemon does not know the name.
    fn remove(&self, name: &str) -> impl Future<Output = Result<(), DaemonError>> + Send;

    /// Whether an IKE SA for the connection currently exists
    fn sa_exists(&self, name: &str) -> impl Future<Output = Result<bool, DaemonError>> + Send;

    /// Start a liveness check; the outcome is reported later as
    /// `DaemonNotification::DpdCompleted`
    fn start_dpd(&self, name: &str) -> impl Future<Output = Result<(), DaemonError>> + Send;

    /// Point the connection at another gateway and re-initiate it
    fn switch_gateway(
        &self,
        name: &str,
        address: &str,
    ) -> impl Future<Output = Result<(), DaemonError>> + Send;

    /// Take the notification stream; only the first call returns it
    fn take_notifications(&self) -> Option<mpsc::UnboundedReceiver<DaemonNotification>>;
}
