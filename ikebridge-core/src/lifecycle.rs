//! Lifecycle monitor
//!
//! Reads daemon notifications in arrival order, publishes the matching
//! events and drives gateway failover. Rotations run in their own tasks so a
//! slow gateway switch never holds up events of other connections; the
//! dispatcher's per-name lock keeps rotations of one connection in order.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::daemon::{DaemonNotification, IkeDaemon};
use crate::dispatcher::CommandDispatcher;
use crate::error::{BridgeError, FailoverError};
use crate::events::{Event, EventPublisher};

pub struct LifecycleMonitor<D: IkeDaemon> {
    dispatcher: Arc<CommandDispatcher<D>>,
    publisher: Arc<EventPublisher>,
}

impl<D: IkeDaemon> LifecycleMonitor<D> {
    pub fn new(dispatcher: Arc<CommandDispatcher<D>>, publisher: Arc<EventPublisher>) -> Self {
        Self {
            dispatcher,
            publisher,
        }
    }

    /// Process notifications until the daemon side of the channel closes
    pub async fn run(self, mut notifications: mpsc::UnboundedReceiver<DaemonNotification>) {
        info!(component = "lifecycle", "Lifecycle monitor started");
        while let Some(notification) = notifications.recv().await {
            if let Some(name) = self.observe(notification) {
                tokio::spawn(fail_over(
                    Arc::clone(&self.dispatcher),
                    Arc::clone(&self.publisher),
                    name,
                ));
            }
        }
        info!(component = "lifecycle", "Notification stream closed, lifecycle monitor stopped");
    }

    /// Handle one notification, waiting for any failover it triggers
    pub async fn handle(&self, notification: DaemonNotification) {
        if let Some(name) = self.observe(notification) {
            fail_over(Arc::clone(&self.dispatcher), Arc::clone(&self.publisher), name).await;
        }
    }

    /// Publish events for a notification
    ///
    /// Returns the connection whose gateway has to be rotated, if any.
    #[tracing::instrument(skip(self, notification), fields(connection = notification.connection_name()))]
    fn observe(&self, notification: DaemonNotification) -> Option<String> {
        match notification {
            DaemonNotification::IkeUp {
                name,
                ike_sa_id,
                local_addr,
                remote_addr,
            } => {
                info!(component = "lifecycle", gateway = %remote_addr, "IKE SA established");
                self.dispatcher.gateway_succeeded(&name);
                self.publisher.publish(
                    &Event::tunnel_up(name)
                        .with("ike_sa_id", ike_sa_id)
                        .with("local_addr", local_addr)
                        .with("remote_addr", remote_addr),
                );
                None
            }
            DaemonNotification::ChildUp {
                name,
                child,
                spi_in,
                spi_out,
                local_ts,
                remote_ts,
            } => {
                info!(component = "lifecycle", child = %child, "Child SA installed");
                self.dispatcher.gateway_succeeded(&name);
                self.publisher.publish(
                    &Event::tunnel_up(name)
                        .with("child", child)
                        .with("spi_in", spi_in)
                        .with("spi_out", spi_out)
                        .with("local_ts", local_ts)
                        .with("remote_ts", remote_ts),
                );
                None
            }
            DaemonNotification::IkeDown {
                name,
                ike_sa_id,
                reason,
            } => {
                info!(component = "lifecycle", reason = %reason, "IKE SA down");
                self.publisher.publish(
                    &Event::tunnel_down(name)
                        .with("ike_sa_id", ike_sa_id)
                        .with("reason", reason),
                );
                None
            }
            DaemonNotification::PeerUnreachable { name, retransmits } => {
                warn!(component = "lifecycle", retransmits, "Gateway not responding");
                self.publisher.publish(
                    &Event::tunnel_down(name.as_str())
                        .with("reason", "peer not responding")
                        .with("retransmits", retransmits),
                );
                Some(name)
            }
            DaemonNotification::DpdCompleted { name, alive } => {
                if !self.dispatcher.dpd_completed(&name) {
                    debug!(component = "lifecycle", "DPD result without pending request");
                }
                if alive {
                    debug!(component = "lifecycle", "Peer alive");
                    None
                } else {
                    warn!(component = "lifecycle", "Dead peer detected");
                    self.publisher
                        .publish(&Event::error(name.as_str(), "dead peer detected"));
                    Some(name)
                }
            }
        }
    }
}

async fn fail_over<D: IkeDaemon>(
    dispatcher: Arc<CommandDispatcher<D>>,
    publisher: Arc<EventPublisher>,
    name: String,
) {
    match dispatcher.gateway_failed(&name).await {
        Ok(gateway) => {
            info!(component = "lifecycle", connection = %name, gateway = %gateway, "Failover in progress");
        }
        Err(BridgeError::Failover(FailoverError::UnknownConnection { .. })) => {
            debug!(component = "lifecycle", connection = %name, "Connection not managed, no failover");
        }
        Err(e) => {
            warn!(component = "lifecycle", connection = %name, error = %e, "Failover stopped");
            publisher.publish(
                &Event::error(name.as_str(), e.to_string()).with("code", e.code().to_string()),
            );
        }
    }
}
