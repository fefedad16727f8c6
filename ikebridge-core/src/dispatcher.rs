//! Command dispatch
//!
//! Maps decoded commands onto the config translator, the failover manager
//! and the IKE daemon adapter. Apply, remove and gateway rotation for one
//! connection name are serialized by a per-name lock; different names run
//! in parallel.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

use crate::connection;
use crate::daemon::IkeDaemon;
use crate::error::{BridgeError, DaemonError, FailoverError, Result};
use crate::events::{Event, EventPublisher};
use crate::failover::{FailoverOutcome, GatewayFailoverManager};
use crate::protocol::{Command, CommandResult};

/// One async lock per connection name
#[derive(Debug, Default)]
struct NameLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl NameLocks {
    async fn acquire(&self, name: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            // Locks nobody holds or waits for can go
            locks.retain(|key, lock| key == name || Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(name.to_string()).or_default())
        };
        lock.lock_owned().await
    }
}

/// Executes control socket commands
pub struct CommandDispatcher<D: IkeDaemon> {
    daemon: Arc<D>,
    failover: Arc<GatewayFailoverManager>,
    publisher: Arc<EventPublisher>,
    locks: NameLocks,
    pending_dpd: Mutex<HashSet<String>>,
    default_max_retries: u32,
}

impl<D: IkeDaemon> CommandDispatcher<D> {
    /// Create a dispatcher
    ///
    /// `default_max_retries` applies to connections whose document does not
    /// set its own ceiling.
    pub fn new(
        daemon: Arc<D>,
        failover: Arc<GatewayFailoverManager>,
        publisher: Arc<EventPublisher>,
        default_max_retries: u32,
    ) -> Self {
        Self {
            daemon,
            failover,
            publisher,
            locks: NameLocks::default(),
            pending_dpd: Mutex::new(HashSet::new()),
            default_max_retries,
        }
    }

    pub fn daemon(&self) -> &Arc<D> {
        &self.daemon
    }

    pub fn failover(&self) -> &Arc<GatewayFailoverManager> {
        &self.failover
    }

    fn pending_dpd(&self) -> MutexGuard<'_, HashSet<String>> {
        self.pending_dpd
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Execute one command and build its result
    pub async fn dispatch(&self, command: Command) -> CommandResult {
        let kind = command.kind();
        let result = match command {
            Command::ApplyConfiguration(document) => self.apply(&document).await,
            Command::StartDpd { ike_sa_name } => self.start_dpd(&ike_sa_name).await,
            Command::RemoveConfiguration { name } => self.remove(&name).await,
            Command::ResetFailover { name } => self.reset_failover(&name),
            // Attaching to the event stream is the server's business
            Command::Subscribe => Ok(()),
        };

        match &result {
            Ok(()) => debug!(component = "dispatcher", command = kind, "Command succeeded"),
            Err(e) => warn!(
                component = "dispatcher",
                command = kind,
                code = %e.code(),
                error = %e,
                "Command failed"
            ),
        }

        CommandResult::from(result)
    }

    /// Validate and install a connection document
    ///
    /// The failover state is registered before the daemon is called and is
    /// left in place if the daemon fails, so a retry or a removal can clean
    /// it up.
    pub async fn apply(&self, document: &Value) -> Result<()> {
        let config = connection::parse_value(document)?;
        let name = config.name.clone();
        let remote_addrs = config.remote_addrs.clone();
        let max_retries = config.max_retries.unwrap_or(self.default_max_retries);

        let _guard = self.locks.acquire(&name).await;

        self.failover
            .register(&name, remote_addrs.clone(), max_retries)?;

        info!(
            component = "dispatcher",
            connection = %name,
            gateways = remote_addrs.len(),
            failover = config.is_failover_eligible(),
            children = config.children.len(),
            "Applying connection"
        );
        self.daemon.apply(config).await?;

        self.publisher.publish(
            &Event::config_applied(&name)
                .with("gateway", remote_addrs[0].clone())
                .with("remote_addrs", remote_addrs)
                .with("max_retries", max_retries),
        );
        Ok(())
    }

    /// Start a dead peer detection check without waiting for its outcome
    pub async fn start_dpd(&self, name: &str) -> Result<()> {
        if !self.daemon.sa_exists(name).await? {
            return Err(DaemonError::NotFound {
                name: name.to_string(),
            }
            .into());
        }

        if !self.pending_dpd().insert(name.to_string()) {
            return Err(BridgeError::Busy {
                name: name.to_string(),
            });
        }

        if let Err(e) = self.daemon.start_dpd(name).await {
            self.pending_dpd().remove(name);
            return Err(e.into());
        }

        info!(component = "dispatcher", connection = name, "Dead peer detection started");
        Ok(())
    }

    /// Remove a connection
    ///
    /// Failover state is dropped first and stays dropped even if the daemon
    /// call fails.
    pub async fn remove(&self, name: &str) -> Result<()> {
        let _guard = self.locks.acquire(name).await;

        let had_failover_state = self.failover.deregister(name).is_some();
        self.pending_dpd().remove(name);

        match self.daemon.remove(name).await {
            Ok(()) => {
                info!(component = "dispatcher", connection = name, "Connection removed");
                Ok(())
            }
            // An apply the daemon rejected leaves only failover state behind
            Err(DaemonError::NotFound { .. }) if had_failover_state => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Clear the failure counter of a connection
    pub fn reset_failover(&self, name: &str) -> Result<()> {
        self.failover.reset(name)?;
        Ok(())
    }

    /// A tunnel came up through the current gateway
    pub fn gateway_succeeded(&self, name: &str) {
        if let Err(e) = self.failover.on_success(name) {
            debug!(component = "dispatcher", connection = name, error = %e, "Ignoring success");
        }
    }

    /// A dead peer detection check finished; returns whether one was pending
    pub fn dpd_completed(&self, name: &str) -> bool {
        self.pending_dpd().remove(name)
    }

    /// The current gateway of a connection stopped responding
    ///
    /// Rotates to the next gateway and asks the daemon to use it. A daemon
    /// error while switching counts as another failure of that gateway.
    /// Returns the gateway now in use.
    pub async fn gateway_failed(&self, name: &str) -> Result<String> {
        let _guard = self.locks.acquire(name).await;

        loop {
            match self.failover.on_failure(name)? {
                FailoverOutcome::NextAddress(address) => {
                    match self.daemon.switch_gateway(name, &address).await {
                        Ok(()) => {
                            info!(
                                component = "dispatcher",
                                connection = name,
                                gateway = %address,
                                "Switched to next gateway"
                            );
                            return Ok(address);
                        }
                        Err(e) => {
                            warn!(
                                component = "dispatcher",
                                connection = name,
                                gateway = %address,
                                error = %e,
                                "Switching gateway failed"
                            );
                        }
                    }
                }
                FailoverOutcome::RetryExceeded => {
                    let max_retries = self.failover.snapshot(name)?.max_retries();
                    return Err(FailoverError::RetryExceeded {
                        name: name.to_string(),
                        max_retries,
                    }
                    .into());
                }
            }
        }
    }
}
