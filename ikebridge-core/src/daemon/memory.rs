//! In-memory IKE daemon
//!
//! Records every call and keeps connections in a map, without touching a
//! real daemon. Used to exercise the dispatcher, failover and server.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::mpsc;

use crate::connection::ConnectionConfig;
use crate::daemon::{DaemonNotification, IkeDaemon};
use crate::error::DaemonError;

/// Calls observed by the in-memory daemon, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonCall {
    Apply(String),
    Remove(String),
    StartDpd(String),
    SwitchGateway(String, String),
}

#[derive(Debug, Default)]
struct State {
    connections: HashMap<String, ConnectionConfig>,
    established: HashSet<String>,
    calls: Vec<DaemonCall>,
    failing_gateways: HashSet<String>,
    fail_next_apply: Option<String>,
    fail_next_remove: Option<String>,
    apply_delay: Option<Duration>,
    switch_delay: Option<Duration>,
}

/// Test double implementing [`IkeDaemon`] entirely in memory
#[derive(Debug, Clone)]
pub struct InMemoryDaemon {
    state: Arc<Mutex<State>>,
    notify_tx: mpsc::UnboundedSender<DaemonNotification>,
    notify_rx: Arc<Mutex<Option<mpsc::UnboundedReceiver<DaemonNotification>>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl Default for InMemoryDaemon {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDaemon {
    pub fn new() -> Self {
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        Self {
            state: Arc::new(Mutex::new(State::default())),
            notify_tx,
            notify_rx: Arc::new(Mutex::new(Some(notify_rx))),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make every apply sleep, to widen race windows in tests
    pub fn set_apply_delay(&self, delay: Duration) {
        self.state().apply_delay = Some(delay);
    }

    /// Make every gateway switch sleep before it completes
    pub fn set_switch_delay(&self, delay: Duration) {
        self.state().switch_delay = Some(delay);
    }

    /// Fail the next apply with the given reason
    pub fn fail_next_apply(&self, reason: &str) {
        self.state().fail_next_apply = Some(reason.to_string());
    }

    /// Fail the next remove with the given reason
    pub fn fail_next_remove(&self, reason: &str) {
        self.state().fail_next_remove = Some(reason.to_string());
    }

    /// Make `switch_gateway` to this address fail
    pub fn fail_gateway(&self, address: &str) {
        self.state().failing_gateways.insert(address.to_string());
    }

    /// Mark the IKE SA of a connection as established
    pub fn establish(&self, name: &str) {
        self.state().established.insert(name.to_string());
    }

    /// Inject a lifecycle notification
    pub fn notify(&self, notification: DaemonNotification) {
        let _ = self.notify_tx.send(notification);
    }

    /// Copy of an installed connection
    pub fn connection(&self, name: &str) -> Option<ConnectionConfig> {
        self.state().connections.get(name).cloned()
    }

    pub fn has_connection(&self, name: &str) -> bool {
        self.state().connections.contains_key(name)
    }

    /// All calls seen so far
    pub fn calls(&self) -> Vec<DaemonCall> {
        self.state().calls.clone()
    }

    /// Highest number of applies that ever ran at the same time
    pub fn max_concurrent_applies(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl IkeDaemon for InMemoryDaemon {
    async fn apply(&self, config: ConnectionConfig) -> Result<(), DaemonError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let (delay, failure) = {
            let mut state = self.state();
            state.calls.push(DaemonCall::Apply(config.name.clone()));
            (state.apply_delay, state.fail_next_apply.take())
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let result = match failure {
            Some(reason) => Err(DaemonError::CommandFailed {
                command: "apply".to_string(),
                reason,
            }),
            None => {
                self.state().connections.insert(config.name.clone(), config);
                Ok(())
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn remove(&self, name: &str) -> Result<(), DaemonError> {
        let mut state = self.state();
        state.calls.push(DaemonCall::Remove(name.to_string()));
        if let Some(reason) = state.fail_next_remove.take() {
            return Err(DaemonError::CommandFailed {
                command: "remove".to_string(),
                reason,
            });
        }
        state.established.remove(name);
        match state.connections.remove(name) {
            Some(_) => Ok(()),
            None => Err(DaemonError::NotFound {
                name: name.to_string(),
            }),
        }
    }

    async fn sa_exists(&self, name: &str) -> Result<bool, DaemonError> {
        Ok(self.state().established.contains(name))
    }

    async fn start_dpd(&self, name: &str) -> Result<(), DaemonError> {
        self.state().calls.push(DaemonCall::StartDpd(name.to_string()));
        Ok(())
    }

    async fn switch_gateway(&self, name: &str, address: &str) -> Result<(), DaemonError> {
        let delay = {
            let mut state = self.state();
            state
                .calls
                .push(DaemonCall::SwitchGateway(name.to_string(), address.to_string()));
            state.switch_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        if state.failing_gateways.contains(address) {
            return Err(DaemonError::CommandFailed {
                command: "initiate".to_string(),
                reason: format!("{} does not respond", address),
            });
        }
        match state.connections.get_mut(name) {
            Some(config) => {
                if let Some(pos) = config.remote_addrs.iter().position(|a| a == address) {
                    config.remote_addrs.rotate_left(pos);
                }
                Ok(())
            }
            None => Err(DaemonError::NotFound {
                name: name.to_string(),
            }),
        }
    }

    fn take_notifications(&self) -> Option<mpsc::UnboundedReceiver<DaemonNotification>> {
        self.notify_rx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }
}
