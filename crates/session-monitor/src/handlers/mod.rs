//! Subscribers turning domain events into repository and session side effects.
//!
//! Each handler switches on the event variant; payloads of the other domain
//! are ignored.

#[cfg(test)]
pub(crate) mod mock;
pub mod node;
pub mod pod;

pub use node::LabelsCacheConfig;
pub use node::NodeDomainEventHandler;
pub use pod::PodDomainEventHandler;
