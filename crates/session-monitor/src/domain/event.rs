use std::collections::BTreeMap;

use chrono::DateTime;
use chrono::Utc;
use uuid::Uuid;

/// Free-form string metadata attached to an event.
pub type Metadata = BTreeMap<String, String>;

/// Anything the [`EventDispatcher`](super::EventDispatcher) can route.
///
/// Routing is done purely on the name, so one dispatcher can carry events
/// from several domains as long as their names do not collide.
pub trait Event: Send + Sync {
    fn event_name(&self) -> &str;
}

/// Payload carried by a [`DomainEvent`]. Each variant maps to exactly one name.
pub trait EventPayload: Send + Sync {
    fn event_name(&self) -> &'static str;
}

/// An immutable, uniquely identified fact.
///
/// Two events are equal when their ids are equal; the payload is not compared.
#[derive(Debug, Clone)]
pub struct DomainEvent<P> {
    id: Uuid,
    payload: P,
    metadata: Metadata,
    occurred_at: DateTime<Utc>,
}

impl<P: EventPayload> DomainEvent<P> {
    pub fn new(payload: P) -> Self {
        Self::with_metadata(payload, Metadata::new())
    }

    pub fn with_metadata(payload: P, metadata: Metadata) -> Self {
        Self {
            id: Uuid::new_v4(),
            payload,
            metadata,
            occurred_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.payload.event_name()
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

impl<P> PartialEq for DomainEvent<P> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<P> Eq for DomainEvent<P> {}

impl<P: EventPayload> Event for DomainEvent<P> {
    fn event_name(&self) -> &str {
        self.name()
    }
}
