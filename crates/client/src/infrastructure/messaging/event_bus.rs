//! Event bus for session notifications.
//!
//! Push-based: subscribers register callbacks that are invoked for every
//! dispatched [`ClientEvent`].

use std::sync::Arc;

use inworld_domain::{InteractionEvent, Packet};
use tokio::sync::Mutex;

use super::connection::SessionStatus;

#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// A packet related to `character` arrived from the server
    PacketReceived { character: String, packet: Packet },
    /// The history of `character` changed or an interaction completed
    InteractionChanged {
        character: String,
        event: InteractionEvent,
    },
    StatusChanged(SessionStatus),
}

/// The bus holds strong references to subscribers, so they persist until
/// cleared or the bus is dropped.
#[derive(Clone)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<Box<dyn FnMut(ClientEvent) + Send + 'static>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub async fn subscribe(&self, callback: impl FnMut(ClientEvent) + Send + 'static) {
        self.subscribers.lock().await.push(Box::new(callback));
    }

    /// Each subscriber receives its own clone of the event.
    pub async fn dispatch(&self, event: ClientEvent) {
        let mut subscribers = self.subscribers.lock().await;
        for subscriber in subscribers.iter_mut() {
            subscriber(event.clone());
        }
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.lock().await.len()
    }

    pub async fn clear(&self) {
        self.subscribers.lock().await.clear();
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_subscribe_and_dispatch() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicU32::new(0));

        let count_clone = Arc::clone(&count);
        bus.subscribe(move |_event| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        })
        .await;

        assert_eq!(bus.subscriber_count().await, 1);

        bus.dispatch(ClientEvent::StatusChanged(SessionStatus::Connecting))
            .await;
        bus.dispatch(ClientEvent::StatusChanged(SessionStatus::Connected))
            .await;

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_multiple_subscribers_and_clear() {
        let bus = EventBus::new();
        let count1 = Arc::new(AtomicU32::new(0));
        let count2 = Arc::new(AtomicU32::new(0));

        let count1_clone = Arc::clone(&count1);
        bus.subscribe(move |_event| {
            count1_clone.fetch_add(1, Ordering::SeqCst);
        })
        .await;

        let count2_clone = Arc::clone(&count2);
        bus.subscribe(move |_event| {
            count2_clone.fetch_add(1, Ordering::SeqCst);
        })
        .await;

        bus.dispatch(ClientEvent::StatusChanged(SessionStatus::Idle))
            .await;

        assert_eq!(count1.load(Ordering::SeqCst), 1);
        assert_eq!(count2.load(Ordering::SeqCst), 1);

        bus.clear().await;
        bus.dispatch(ClientEvent::StatusChanged(SessionStatus::Idle))
            .await;
        assert_eq!(count1.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscriber_count().await, 0);
    }
}
