//! In-process publish/subscribe of domain changes.
//!
//! The core publishes into the bus; presentation layers (the SSE stream) subscribe
//! independently. Slow subscribers lag and drop old messages instead of blocking
//! publishers.

use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::broadcast;

use crate::entity::event::EventStatus;

const BUS_CAPACITY: usize = 256;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    EventTriggered {
        owner_id: String,
        event_id: String,
        contacts_notified: usize,
    },
    CheckInPerformed {
        owner_id: String,
        event_id: String,
        #[serde(with = "time::serde::rfc3339")]
        at: OffsetDateTime,
    },
    EventStatusChanged {
        owner_id: String,
        event_id: String,
        status: EventStatus,
    },
    ContactUpdated {
        owner_id: String,
        contact_id: String,
    },
}

impl DomainEvent {
    pub fn owner_id(&self) -> &str {
        match self {
            DomainEvent::EventTriggered { owner_id, .. }
            | DomainEvent::CheckInPerformed { owner_id, .. }
            | DomainEvent::EventStatusChanged { owner_id, .. }
            | DomainEvent::ContactUpdated { owner_id, .. } => owner_id,
        }
    }

    /// Name used as the SSE `event:` field.
    pub fn kind(&self) -> &'static str {
        match self {
            DomainEvent::EventTriggered { .. } => "event_triggered",
            DomainEvent::CheckInPerformed { .. } => "check_in_performed",
            DomainEvent::EventStatusChanged { .. } => "event_status_changed",
            DomainEvent::ContactUpdated { .. } => "contact_updated",
        }
    }
}

#[derive(Clone, Debug)]
pub struct DomainEventBus {
    sender: broadcast::Sender<DomainEvent>,
}

impl Default for DomainEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl DomainEventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BUS_CAPACITY);
        Self { sender }
    }

    /// Publishing with no subscribers is not an error.
    pub fn publish(&self, event: DomainEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.sender.subscribe()
    }
}
