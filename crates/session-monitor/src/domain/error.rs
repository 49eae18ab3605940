use core::error::Error;
use std::collections::BTreeMap;

/// Errors surfaced by [`EventDispatcher::publish`](super::EventDispatcher::publish).
#[derive(Debug, derive_more::Display)]
pub enum EventError {
    #[display("Handler failed for event {event}")]
    HandlerFailed { event: String },
}

impl Error for EventError {}

/// Errors returned by domain event handlers.
#[derive(Debug, PartialEq, derive_more::Display)]
pub enum HandlerError {
    #[display("Node labels {labels:?} cannot be encoded")]
    BadNodeLabel { labels: BTreeMap<String, String> },
    #[display("Repository operation failed")]
    Repository,
    #[display("Session operation failed")]
    Session,
}

impl Error for HandlerError {}
