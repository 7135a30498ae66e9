//! Event bus using tokio broadcast channel
//!
//! Slow subscribers miss events rather than blocking the engine.

use tokio::sync::broadcast;

use super::TierEvent;

/// Default channel capacity
const DEFAULT_CAPACITY: usize = 1024;

/// Fire-and-forget broadcast of [`TierEvent`]s.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<TierEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to events emitted from now on.
    pub fn subscribe(&self) -> EventSubscriber {
        EventSubscriber {
            receiver: self.sender.subscribe(),
        }
    }

    /// Emit an event; dropped when nobody listens.
    pub fn emit(&self, event: TierEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Subscriber to event bus
pub struct EventSubscriber {
    receiver: broadcast::Receiver<TierEvent>,
}

impl EventSubscriber {
    /// Receive the next event; `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<TierEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Event subscriber lagged by {} events", n);
                    continue;
                }
            }
        }
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Option<TierEvent> {
        self.receiver.try_recv().ok()
    }

    /// Drain every event currently queued.
    pub fn drain(&mut self) -> Vec<TierEvent> {
        let mut out = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(event) => out.push(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Tier;
    use chrono::Utc;

    fn routed(id: &str) -> TierEvent {
        TierEvent::Routed {
            item_id: id.to_string(),
            tier: Tier::Fresh,
            priority: 0.7,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_event_bus_basic() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();
        bus.emit(routed("mem-1"));
        let received = sub.recv().await.unwrap();
        assert_eq!(received.subject_id(), "mem-1");
    }

    #[tokio::test]
    async fn test_no_subscribers_does_not_fail() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count(), 0);
        bus.emit(routed("mem-1"));
    }

    #[test]
    fn test_drain_collects_queued_events() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();
        bus.emit(routed("a"));
        bus.emit(routed("b"));
        let ids: Vec<String> = sub.drain().iter().map(|e| e.subject_id().to_string()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(sub.try_recv().is_none());
    }
}
