//! Gateway failover with a bounded retry ceiling
//!
//! This module provides GatewayFailoverManager, which tracks for every
//! connection the ordered list of redundant remote gateways, the gateway
//! currently in use and how many consecutive failures have been seen.
//!
//! Per connection the state machine is:
//!
//! - `Active(i)` + success → `Active(i)`, failure counter reset
//! - `Active(i)` + failure below the ceiling → `Active((i + 1) mod N)`
//! - `Active(i)` + failure at the ceiling → `Exhausted`, stays on `i` until
//!   a reset or a re-registration

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, info, warn};

use crate::error::FailoverError;

/// Failover bookkeeping for one connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailoverState {
    remote_addrs: Vec<String>,
    current_index: usize,
    failure_count: u32,
    max_retries: u32,
}

impl FailoverState {
    /// Ordered gateway list
    pub fn remote_addrs(&self) -> &[String] {
        &self.remote_addrs
    }

    /// Index of the gateway currently in use
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    /// Gateway currently in use
    pub fn current_address(&self) -> &str {
        &self.remote_addrs[self.current_index]
    }

    /// Consecutive failures since the last success or reset
    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    /// Configured ceiling
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Whether further failures would exceed the ceiling
    pub fn is_exhausted(&self) -> bool {
        self.remote_addrs.len() < 2 || self.failure_count >= self.max_retries
    }
}

/// Decision taken after a gateway failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailoverOutcome {
    /// Switch to this gateway
    NextAddress(String),

    /// No alternative left; the failure is terminal
    RetryExceeded,
}

/// Owns the failover state of every registered connection
#[derive(Debug, Default)]
pub struct GatewayFailoverManager {
    states: Mutex<HashMap<String, FailoverState>>,
}

impl GatewayFailoverManager {
    /// Create an empty manager
    pub fn new() -> Self {
        Self::default()
    }

    fn states(&self) -> MutexGuard<'_, HashMap<String, FailoverState>> {
        // Every critical section leaves the map consistent, so a poisoned
        // lock still holds valid data
        self.states.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Create or replace the failover state for a connection
    ///
    /// Re-registering always starts over at the first gateway, since the
    /// list may have changed between applies.
    #[tracing::instrument(skip(self, remote_addrs), fields(component = "failover", gateways = remote_addrs.len()))]
    pub fn register(
        &self,
        name: &str,
        remote_addrs: Vec<String>,
        max_retries: u32,
    ) -> Result<(), FailoverError> {
        if remote_addrs.is_empty() {
            return Err(FailoverError::NoGateways {
                name: name.to_string(),
            });
        }

        let state = FailoverState {
            remote_addrs,
            current_index: 0,
            failure_count: 0,
            max_retries,
        };

        let replaced = self.states().insert(name.to_string(), state).is_some();
        debug!(replaced, max_retries, "Registered failover state");
        Ok(())
    }

    /// Drop the failover state for a connection
    ///
    /// Returns the removed state, or `None` if the name was not registered.
    pub fn deregister(&self, name: &str) -> Option<FailoverState> {
        let removed = self.states().remove(name);
        if removed.is_some() {
            debug!(component = "failover", connection = name, "Deregistered failover state");
        }
        removed
    }

    /// Whether a connection is registered
    pub fn contains(&self, name: &str) -> bool {
        self.states().contains_key(name)
    }

    /// Gateway currently in use for a connection
    pub fn current_address(&self, name: &str) -> Result<String, FailoverError> {
        self.with_state(name, |state| state.current_address().to_string())
    }

    /// Copy of the current state for a connection
    pub fn snapshot(&self, name: &str) -> Result<FailoverState, FailoverError> {
        self.with_state(name, |state| state.clone())
    }

    /// Record a failure of the current gateway
    ///
    /// Below the ceiling the counter is incremented and the next gateway
    /// (wrapping around) becomes current. At the ceiling, or when there is
    /// only one gateway, nothing changes and `RetryExceeded` is returned.
    #[tracing::instrument(skip(self), fields(component = "failover"))]
    pub fn on_failure(&self, name: &str) -> Result<FailoverOutcome, FailoverError> {
        self.with_state(name, |state| {
            if state.remote_addrs.len() < 2 {
                warn!("Single gateway configured, no alternative to fail over to");
                return FailoverOutcome::RetryExceeded;
            }

            if state.failure_count >= state.max_retries {
                warn!(
                    failures = state.failure_count,
                    max_retries = state.max_retries,
                    "Failover retry ceiling reached"
                );
                return FailoverOutcome::RetryExceeded;
            }

            state.failure_count += 1;
            state.current_index = (state.current_index + 1) % state.remote_addrs.len();
            let next = state.current_address().to_string();

            info!(
                failures = state.failure_count,
                max_retries = state.max_retries,
                next_gateway = %next,
                "Rotating to next gateway"
            );
            FailoverOutcome::NextAddress(next)
        })
    }

    /// Record a successful connection through the current gateway
    pub fn on_success(&self, name: &str) -> Result<(), FailoverError> {
        self.with_state(name, |state| {
            if state.failure_count > 0 {
                debug!(
                    component = "failover",
                    connection = name,
                    previous_failures = state.failure_count,
                    "Gateway succeeded, resetting failure counter"
                );
            }
            state.failure_count = 0;
        })
    }

    /// Manually clear the failure counter, keeping the current gateway
    pub fn reset(&self, name: &str) -> Result<(), FailoverError> {
        self.with_state(name, |state| {
            state.failure_count = 0;
        })?;
        info!(component = "failover", connection = name, "Failover retries reset");
        Ok(())
    }

    fn with_state<T>(
        &self,
        name: &str,
        f: impl FnOnce(&mut FailoverState) -> T,
    ) -> Result<T, FailoverError> {
        let mut states = self.states();
        let state = states
            .get_mut(name)
            .ok_or_else(|| FailoverError::UnknownConnection {
                name: name.to_string(),
            })?;
        Ok(f(state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addrs(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_register_starts_at_first_gateway() {
        let manager = GatewayFailoverManager::new();
        manager
            .register("home", addrs(&["10.0.0.1", "10.0.0.2"]), 3)
            .unwrap();

        assert_eq!(manager.current_address("home").unwrap(), "10.0.0.1");
        let state = manager.snapshot("home").unwrap();
        assert_eq!(state.current_index(), 0);
        assert_eq!(state.failure_count(), 0);
        assert!(!state.is_exhausted());
    }

    #[test]
    fn test_register_rejects_empty_list() {
        let manager = GatewayFailoverManager::new();
        let err = manager.register("home", Vec::new(), 3).unwrap_err();
        assert_eq!(
            err,
            FailoverError::NoGateways {
                name: "home".to_string()
            }
        );
        assert!(!manager.contains("home"));
    }

    #[test]
    fn test_reregister_resets_position() {
        let manager = GatewayFailoverManager::new();
        manager
            .register("home", addrs(&["10.0.0.1", "10.0.0.2"]), 3)
            .unwrap();
        manager.on_failure("home").unwrap();
        assert_eq!(manager.current_address("home").unwrap(), "10.0.0.2");

        manager
            .register("home", addrs(&["10.0.0.2", "10.0.0.1"]), 3)
            .unwrap();
        let state = manager.snapshot("home").unwrap();
        assert_eq!(state.current_index(), 0);
        assert_eq!(state.failure_count(), 0);
        assert_eq!(state.current_address(), "10.0.0.2");
    }

    #[test]
    fn test_unknown_connection_is_an_error() {
        let manager = GatewayFailoverManager::new();
        let unknown = FailoverError::UnknownConnection {
            name: "ghost".to_string(),
        };

        assert_eq!(manager.on_failure("ghost").unwrap_err(), unknown);
        assert_eq!(manager.on_success("ghost").unwrap_err(), unknown);
        assert_eq!(manager.reset("ghost").unwrap_err(), unknown);
        assert_eq!(manager.current_address("ghost").unwrap_err(), unknown);
        assert!(manager.deregister("ghost").is_none());
    }
}
