//! Event fan-out to attached control socket clients
//!
//! Each subscriber owns a bounded queue drained by its connection's writer
//! task, so a slow or dead client never stalls delivery to the others: a
//! subscriber whose queue is closed or full is dropped from the fan-out set.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::events::Event;
use crate::protocol::encode_event;

/// Default per-subscriber queue depth
pub const DEFAULT_QUEUE_DEPTH: usize = 256;

/// Identifier of one subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Receiving side handed to a newly attached client
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriberId,
    /// Encoded event documents, without trailing newline
    pub receiver: mpsc::Receiver<Arc<[u8]>>,
}

/// Fans encoded events out to every subscriber
#[derive(Debug)]
pub struct EventPublisher {
    subscribers: Mutex<HashMap<SubscriberId, mpsc::Sender<Arc<[u8]>>>>,
    next_id: AtomicU64,
    queue_depth: usize,
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_DEPTH)
    }
}

impl EventPublisher {
    /// Create a publisher with the given per-subscriber queue depth
    pub fn new(queue_depth: usize) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            queue_depth: queue_depth.max(1),
        }
    }

    fn subscribers(&self) -> MutexGuard<'_, HashMap<SubscriberId, mpsc::Sender<Arc<[u8]>>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Attach a new subscriber
    pub fn subscribe(&self) -> Subscription {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, receiver) = mpsc::channel(self.queue_depth);
        self.subscribers().insert(id, tx);
        debug!(component = "publisher", subscriber = %id, "Subscriber attached");
        Subscription { id, receiver }
    }

    /// Detach a subscriber; returns whether it was still attached
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self.subscribers().remove(&id).is_some();
        if removed {
            debug!(component = "publisher", subscriber = %id, "Subscriber detached");
        }
        removed
    }

    /// Number of attached subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers().len()
    }

    /// Deliver an event to every subscriber
    ///
    /// Returns the number of subscribers the event was queued for.
    pub fn publish(&self, event: &Event) -> usize {
        let encoded: Arc<[u8]> = Arc::from(encode_event(event));
        let mut delivered = 0;

        self.subscribers().retain(|id, tx| match tx.try_send(Arc::clone(&encoded)) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(
                    component = "publisher",
                    subscriber = %id,
                    "Subscriber queue full, dropping subscriber"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(component = "publisher", subscriber = %id, "Subscriber gone, dropping");
                false
            }
        });

        debug!(
            component = "publisher",
            event = %event.kind,
            connection = %event.connection_name,
            delivered,
            "Published event"
        );
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_all_subscribers() {
        let publisher = EventPublisher::new(8);
        let mut a = publisher.subscribe();
        let mut b = publisher.subscribe();

        assert_eq!(publisher.publish(&Event::tunnel_up("home")), 2);

        let first = a.receiver.recv().await.unwrap();
        let second = b.receiver.recv().await.unwrap();
        assert_eq!(first, second);
        let value: serde_json::Value = serde_json::from_slice(&first).unwrap();
        assert_eq!(value["event"], "tunnel-up");
    }

    #[tokio::test]
    async fn test_full_queue_drops_only_that_subscriber() {
        let publisher = EventPublisher::new(1);
        let _stalled = publisher.subscribe();
        let mut healthy = publisher.subscribe();

        assert_eq!(publisher.publish(&Event::tunnel_up("home")), 2);
        let _ = healthy.receiver.recv().await.unwrap();

        // The stalled subscriber never drained its single slot
        assert_eq!(publisher.publish(&Event::tunnel_down("home")), 1);
        assert_eq!(publisher.subscriber_count(), 1);
        assert!(healthy.receiver.recv().await.is_some());
    }

    #[test]
    fn test_unsubscribe() {
        let publisher = EventPublisher::default();
        let sub = publisher.subscribe();
        assert!(publisher.unsubscribe(sub.id));
        assert!(!publisher.unsubscribe(sub.id));
        assert_eq!(publisher.publish(&Event::tunnel_up("home")), 0);
    }
}
