//! In-process, synchronous publish/subscribe.
//!
//! Delivery is ordered and fail-fast: events are handed out in the order they
//! were passed to [`EventDispatcher::publish`], each to the matching handlers in
//! subscription order, and the first handler error stops the whole call. There
//! is no rollback, so a failed publish leaves the effects of the successful
//! prefix in place.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use async_trait::async_trait;
use error_stack::Report;
use error_stack::ResultExt;
use tracing::debug;

use super::error::EventError;
use super::error::HandlerError;
use super::event::Event;

/// Receives events from an [`EventDispatcher`].
#[async_trait]
pub trait EventHandler<E>: Send + Sync {
    async fn handle_event(&self, event: &E) -> Result<(), Report<HandlerError>>;
}

struct Subscription<E> {
    handler: Arc<dyn EventHandler<E>>,
    /// `None` means the handler receives every event.
    filter: Option<HashSet<String>>,
}

impl<E> Subscription<E> {
    fn accepts(&self, name: &str) -> bool {
        self.filter
            .as_ref()
            .map_or(true, |filter| filter.contains(name))
    }
}

/// Fan-out of events to subscribed handlers.
///
/// Subscriptions are append-only. The subscriber list is guarded by a mutex
/// that is never held while a handler runs, so handlers may subscribe or
/// publish themselves.
pub struct EventDispatcher<E> {
    subscriptions: Mutex<Vec<Subscription<E>>>,
}

impl<E> Default for EventDispatcher<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> EventDispatcher<E> {
    pub fn new() -> Self {
        Self {
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    /// Registers `handler` for the given event names, or for every event when
    /// `event_names` is empty.
    pub fn subscribe(&self, handler: Arc<dyn EventHandler<E>>, event_names: &[&str]) {
        let filter = if event_names.is_empty() {
            None
        } else {
            Some(event_names.iter().map(|name| name.to_string()).collect())
        };

        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscription { handler, filter });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn handlers_for(&self, name: &str) -> Vec<Arc<dyn EventHandler<E>>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|subscription| subscription.accepts(name))
            .map(|subscription| subscription.handler.clone())
            .collect()
    }
}

impl<E: Event> EventDispatcher<E> {
    /// Delivers `events` in order and returns after every matching handler ran,
    /// or with the first handler error.
    pub async fn publish(&self, events: &[E]) -> Result<(), Report<EventError>> {
        for event in events {
            let name = event.event_name();
            let handlers = self.handlers_for(name);
            debug!(event = name, handlers = handlers.len(), "Publishing event");

            for handler in handlers {
                handler
                    .handle_event(event)
                    .await
                    .change_context_lazy(|| EventError::HandlerFailed {
                        event: name.to_string(),
                    })?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use similar_asserts::assert_eq;
    use test_log::test;

    use super::*;
    use crate::domain::event::DomainEvent;
    use crate::domain::event::EventPayload;

    #[derive(Debug, Clone)]
    struct Named(&'static str);

    impl EventPayload for Named {
        fn event_name(&self) -> &'static str {
            self.0
        }
    }

    type TestEvent = DomainEvent<Named>;

    #[derive(Default)]
    struct RecordingHandler {
        seen: Mutex<Vec<String>>,
        fail_on: Option<&'static str>,
    }

    impl RecordingHandler {
        fn failing_on(name: &'static str) -> Self {
            Self {
                seen: Mutex::new(Vec::new()),
                fail_on: Some(name),
            }
        }

        fn seen(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EventHandler<TestEvent> for RecordingHandler {
        async fn handle_event(&self, event: &TestEvent) -> Result<(), Report<HandlerError>> {
            self.seen.lock().unwrap().push(event.name().to_string());
            if self.fail_on == Some(event.name()) {
                return Err(Report::new(HandlerError::Repository));
            }
            Ok(())
        }
    }

    fn batch(names: &[&'static str]) -> Vec<TestEvent> {
        names.iter().map(|name| DomainEvent::new(Named(name))).collect()
    }

    #[test(tokio::test)]
    async fn filtered_handler_only_sees_named_events() {
        let dispatcher = EventDispatcher::new();
        let handler = Arc::new(RecordingHandler::default());
        dispatcher.subscribe(handler.clone(), &["event-1", "event-2"]);

        dispatcher
            .publish(&batch(&["event-1", "event-2", "bogus-event"]))
            .await
            .expect("publish should succeed");

        assert_eq!(handler.seen(), vec!["event-1", "event-2"]);
    }

    #[test(tokio::test)]
    async fn unfiltered_handler_sees_everything_in_order() {
        let dispatcher = EventDispatcher::new();
        let handler = Arc::new(RecordingHandler::default());
        dispatcher.subscribe(handler.clone(), &[]);

        dispatcher
            .publish(&batch(&["c", "a", "b"]))
            .await
            .expect("publish should succeed");

        assert_eq!(handler.seen(), vec!["c", "a", "b"]);
    }

    #[test(tokio::test)]
    async fn handlers_run_in_subscription_order() {
        struct Tagging {
            tag: &'static str,
            log: Arc<Mutex<Vec<&'static str>>>,
        }

        #[async_trait]
        impl EventHandler<TestEvent> for Tagging {
            async fn handle_event(&self, _: &TestEvent) -> Result<(), Report<HandlerError>> {
                self.log.lock().unwrap().push(self.tag);
                Ok(())
            }
        }

        let log = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = EventDispatcher::new();
        for tag in ["first", "second", "third"] {
            dispatcher.subscribe(
                Arc::new(Tagging {
                    tag,
                    log: log.clone(),
                }),
                &[],
            );
        }

        dispatcher.publish(&batch(&["x"])).await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test(tokio::test)]
    async fn first_error_stops_delivery() {
        let dispatcher = EventDispatcher::new();
        let failing = Arc::new(RecordingHandler::failing_on("event-2"));
        let after = Arc::new(RecordingHandler::default());
        dispatcher.subscribe(failing.clone(), &[]);
        dispatcher.subscribe(after.clone(), &[]);

        let err = dispatcher
            .publish(&batch(&["event-1", "event-2", "event-3"]))
            .await
            .expect_err("second event should fail");

        assert!(matches!(
            err.current_context(),
            EventError::HandlerFailed { event } if event == "event-2"
        ));
        assert_eq!(
            err.downcast_ref::<HandlerError>(),
            Some(&HandlerError::Repository)
        );
        assert_eq!(failing.seen(), vec!["event-1", "event-2"]);
        assert_eq!(after.seen(), vec!["event-1"]);
    }

    #[test(tokio::test)]
    async fn handlers_can_subscribe_while_handling() {
        struct Subscriber {
            dispatcher: Arc<EventDispatcher<TestEvent>>,
        }

        #[async_trait]
        impl EventHandler<TestEvent> for Subscriber {
            async fn handle_event(&self, _: &TestEvent) -> Result<(), Report<HandlerError>> {
                self.dispatcher
                    .subscribe(Arc::new(RecordingHandler::default()), &["late"]);
                Ok(())
            }
        }

        let dispatcher = Arc::new(EventDispatcher::new());
        dispatcher.subscribe(
            Arc::new(Subscriber {
                dispatcher: dispatcher.clone(),
            }),
            &["join"],
        );

        dispatcher.publish(&batch(&["join"])).await.unwrap();

        assert_eq!(dispatcher.subscriber_count(), 2);
    }
}
