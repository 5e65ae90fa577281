//! Softphone event bus
//!
//! Fans controller events out to every subscriber (the WebSocket bridge,
//! tests, loggers). Publishing never blocks; a subscriber that falls more
//! than `capacity` events behind observes a lag error on its receiver.

use crate::domain::call::event::SoftphoneEvent;
use crate::domain::shared::events::{DomainEvent, EventMetadata};
use tokio::sync::broadcast;
use tracing::debug;

/// Event as delivered to subscribers
#[derive(Debug, Clone)]
pub struct PublishedEvent {
    pub metadata: EventMetadata,
    pub event: SoftphoneEvent,
}

impl PublishedEvent {
    /// Event name as seen by the dialing panel
    pub fn name(&self) -> &'static str {
        self.event.event_type()
    }

    /// `{"name": ..., "payload": ...}` frame
    pub fn to_frame(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name(),
            "payload": self.event.payload(),
            "occurredAt": self.metadata.occurred_at,
        })
    }
}

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PublishedEvent>,
}

impl EventBus {
    /// Create new event bus with specified capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: SoftphoneEvent) {
        let published = PublishedEvent {
            metadata: EventMetadata::new(event.event_type()),
            event,
        };

        debug!("Publishing {}", published.name());
        if self.tx.send(published).is_err() {
            debug!("No subscriber for softphone events");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}
