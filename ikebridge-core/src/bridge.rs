//! Wiring of the bridge components around one daemon adapter

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::warn;

use crate::config::BridgeConfig;
use crate::daemon::IkeDaemon;
use crate::dispatcher::CommandDispatcher;
use crate::error::BridgeError;
use crate::events::EventPublisher;
use crate::failover::GatewayFailoverManager;
use crate::ipc::ControlServer;
use crate::lifecycle::LifecycleMonitor;

/// Shared state of a running bridge
pub struct Bridge<D: IkeDaemon> {
    config: BridgeConfig,
    dispatcher: Arc<CommandDispatcher<D>>,
    publisher: Arc<EventPublisher>,
}

impl<D: IkeDaemon> Bridge<D> {
    pub fn new(daemon: D, config: BridgeConfig) -> Self {
        let publisher = Arc::new(EventPublisher::new(config.server.event_queue_depth));
        let dispatcher = Arc::new(CommandDispatcher::new(
            Arc::new(daemon),
            Arc::new(GatewayFailoverManager::new()),
            Arc::clone(&publisher),
            config.failover.default_max_retries,
        ));

        Self {
            config,
            dispatcher,
            publisher,
        }
    }

    pub fn dispatcher(&self) -> &Arc<CommandDispatcher<D>> {
        &self.dispatcher
    }

    pub fn publisher(&self) -> &Arc<EventPublisher> {
        &self.publisher
    }

    /// Start the task turning daemon notifications into events
    ///
    /// Returns `None` if the notification stream was already taken.
    pub fn spawn_lifecycle(&self) -> Option<JoinHandle<()>> {
        let Some(notifications) = self.dispatcher.daemon().take_notifications() else {
            warn!(component = "bridge", "Daemon notifications already taken");
            return None;
        };

        let monitor = LifecycleMonitor::new(Arc::clone(&self.dispatcher), Arc::clone(&self.publisher));
        Some(tokio::spawn(monitor.run(notifications)))
    }

    /// Bind the control socket configured for this bridge
    pub fn bind(&self) -> Result<ControlServer<D>, BridgeError> {
        ControlServer::bind(
            &self.config.server.socket_path,
            Arc::clone(&self.dispatcher),
            Arc::clone(&self.publisher),
            self.config.server.max_message_bytes,
        )
    }
}
