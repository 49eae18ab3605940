use super::event::DomainEvent;
use super::event::EventPayload;
use super::event::Metadata;

pub const AGGREGATE_NAME_KEY: &str = "aggregate-name";
pub const AGGREGATE_ID_KEY: &str = "aggregate-id";

/// An entity that stages events before they are published.
///
/// Every staged event is stamped with the aggregate's name and id so that
/// subscribers can correlate events from the same entity.
#[derive(Debug)]
pub struct Aggregate<P> {
    id: String,
    name: &'static str,
    events: Vec<DomainEvent<P>>,
}

impl<P: EventPayload> Aggregate<P> {
    pub fn new(id: impl Into<String>, name: &'static str) -> Self {
        Self {
            id: id.into(),
            name,
            events: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn add_event(&mut self, payload: P) {
        let metadata = Metadata::from([
            (AGGREGATE_NAME_KEY.to_string(), self.name.to_string()),
            (AGGREGATE_ID_KEY.to_string(), self.id.clone()),
        ]);
        self.events
            .push(DomainEvent::with_metadata(payload, metadata));
    }

    pub fn events(&self) -> &[DomainEvent<P>] {
        &self.events
    }

    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    /// Drains the staged events, leaving the aggregate empty.
    pub fn take_events(&mut self) -> Vec<DomainEvent<P>> {
        std::mem::take(&mut self.events)
    }
}
