//! Integration tests for gateway failover
//!
//! Covers rotation order, the retry ceiling and counter resets.

use std::sync::Arc;

use ikebridge_core::error::FailoverError;
use ikebridge_core::failover::{FailoverOutcome, GatewayFailoverManager};

fn addrs(list: &[&str]) -> Vec<String> {
    list.iter().map(|a| a.to_string()).collect()
}

fn next(manager: &GatewayFailoverManager, name: &str) -> FailoverOutcome {
    manager.on_failure(name).unwrap()
}

#[test]
fn test_three_gateways_rotate_in_order() {
    let manager = GatewayFailoverManager::new();
    manager
        .register("home", addrs(&["10.0.0.1", "10.0.0.2", "10.0.0.3"]), 5)
        .unwrap();

    assert_eq!(manager.current_address("home").unwrap(), "10.0.0.1");
    assert_eq!(next(&manager, "home"), FailoverOutcome::NextAddress("10.0.0.2".into()));
    assert_eq!(next(&manager, "home"), FailoverOutcome::NextAddress("10.0.0.3".into()));
    assert_eq!(next(&manager, "home"), FailoverOutcome::NextAddress("10.0.0.1".into()));
}

#[test]
fn test_every_gateway_visited_once_per_cycle() {
    for n in 2..=6 {
        let gateways: Vec<String> = (1..=n).map(|i| format!("192.0.2.{}", i)).collect();
        let manager = GatewayFailoverManager::new();
        manager.register("multi", gateways.clone(), n as u32).unwrap();

        let mut visited = vec![manager.current_address("multi").unwrap()];
        for _ in 0..n - 1 {
            match next(&manager, "multi") {
                FailoverOutcome::NextAddress(addr) => visited.push(addr),
                FailoverOutcome::RetryExceeded => panic!("ceiling reached early with {} gateways", n),
            }
        }

        assert_eq!(visited, gateways);
    }
}

#[test]
fn test_single_gateway_never_moves() {
    let manager = GatewayFailoverManager::new();
    manager.register("solo", addrs(&["203.0.113.9"]), 10).unwrap();

    for _ in 0..3 {
        assert_eq!(next(&manager, "solo"), FailoverOutcome::RetryExceeded);
    }

    let state = manager.snapshot("solo").unwrap();
    assert_eq!(state.current_index(), 0);
    assert_eq!(state.failure_count(), 0);
}

#[test]
fn test_ceiling_is_exact() {
    let manager = GatewayFailoverManager::new();
    manager
        .register("capped", addrs(&["10.0.0.1", "10.0.0.2"]), 3)
        .unwrap();

    for _ in 0..3 {
        assert!(matches!(next(&manager, "capped"), FailoverOutcome::NextAddress(_)));
    }
    let before = manager.snapshot("capped").unwrap();
    assert!(before.is_exhausted());

    assert_eq!(next(&manager, "capped"), FailoverOutcome::RetryExceeded);

    // Stays on the last gateway
    let after = manager.snapshot("capped").unwrap();
    assert_eq!(after.current_index(), before.current_index());
    assert_eq!(after.failure_count(), 3);
}

#[test]
fn test_success_and_reset_clear_counter_keep_index() {
    let manager = GatewayFailoverManager::new();
    manager
        .register("home", addrs(&["10.0.0.1", "10.0.0.2", "10.0.0.3"]), 2)
        .unwrap();

    next(&manager, "home");
    next(&manager, "home");
    assert_eq!(next(&manager, "home"), FailoverOutcome::RetryExceeded);

    manager.reset("home").unwrap();
    assert_eq!(manager.current_address("home").unwrap(), "10.0.0.3");
    assert_eq!(next(&manager, "home"), FailoverOutcome::NextAddress("10.0.0.1".into()));

    manager.on_success("home").unwrap();
    let state = manager.snapshot("home").unwrap();
    assert_eq!(state.failure_count(), 0);
    assert_eq!(state.current_address(), "10.0.0.1");
}

#[test]
fn test_reregister_starts_over() {
    let manager = GatewayFailoverManager::new();
    manager.register("home", addrs(&["10.0.0.1", "10.0.0.2"]), 5).unwrap();
    next(&manager, "home");

    manager.register("home", addrs(&["10.0.0.7", "10.0.0.8"]), 5).unwrap();
    let state = manager.snapshot("home").unwrap();
    assert_eq!(state.current_address(), "10.0.0.7");
    assert_eq!(state.failure_count(), 0);
}

#[test]
fn test_unknown_and_empty() {
    let manager = GatewayFailoverManager::new();

    assert_eq!(
        manager.on_failure("ghost"),
        Err(FailoverError::UnknownConnection {
            name: "ghost".to_string()
        })
    );
    assert!(manager.reset("ghost").is_err());
    assert!(manager.deregister("ghost").is_none());
    assert_eq!(
        manager.register("empty", Vec::new(), 5),
        Err(FailoverError::NoGateways {
            name: "empty".to_string()
        })
    );
    assert!(!manager.contains("empty"));
}

#[test]
fn test_names_are_independent_across_threads() {
    let manager = Arc::new(GatewayFailoverManager::new());
    for i in 0..8 {
        manager
            .register(&format!("conn-{}", i), addrs(&["10.0.0.1", "10.0.0.2"]), 100)
            .unwrap();
    }

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let manager = Arc::clone(&manager);
            std::thread::spawn(move || {
                for _ in 0..50 {
                    manager.on_failure(&format!("conn-{}", i)).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    for i in 0..8 {
        let state = manager.snapshot(&format!("conn-{}", i)).unwrap();
        assert_eq!(state.failure_count(), 50);
        assert_eq!(state.current_index(), 0);
    }
}
