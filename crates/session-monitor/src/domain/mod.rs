//! Domain event core and the node/pod projections flowing through it.
//!
//! - [`DomainEvent`]: immutable, id-identified fact with a typed payload
//! - [`EventDispatcher`]: ordered, fail-fast in-process fan-out
//! - [`Aggregate`]: staging area for events raised by one entity
//! - [`MonitorEvent`]: the closed set of payloads this service publishes

pub mod aggregate;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod node;
pub mod pod;

pub use aggregate::Aggregate;
pub use dispatcher::EventDispatcher;
pub use dispatcher::EventHandler;
pub use error::EventError;
pub use error::HandlerError;
pub use event::DomainEvent;
pub use event::Event;
pub use event::EventPayload;
pub use node::Node;
pub use node::NodeEvent;
pub use pod::Pod;
pub use pod::PodEvent;

/// Every payload published on the shared dispatcher.
#[derive(Debug, Clone, PartialEq, derive_more::From)]
pub enum MonitorEvent {
    Node(NodeEvent),
    Pod(PodEvent),
}

impl EventPayload for MonitorEvent {
    fn event_name(&self) -> &'static str {
        match self {
            Self::Node(event) => event.event_name(),
            Self::Pod(event) => event.event_name(),
        }
    }
}

pub type MonitorDomainEvent = DomainEvent<MonitorEvent>;
pub type MonitorDispatcher = EventDispatcher<MonitorDomainEvent>;
