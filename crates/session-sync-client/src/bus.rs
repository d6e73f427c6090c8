//! Event bus: fans decoded envelopes out to subscribers.
//!
//! Delivery order for one publish: wildcard subscribers first, then
//! subscribers of the event's type, each group in registration order. A
//! handler that fails (returns `Err` or panics) is logged and skipped; it
//! never stops delivery to the others and never reaches the publisher.
//!
//! The bus is single-threaded (`Rc`); handlers run to completion inside
//! [`EventBus::publish`].

use std::{
    cell::RefCell,
    panic::{AssertUnwindSafe, catch_unwind},
    rc::{Rc, Weak},
};

use serde_json::Value;
use session_sync_core::{Event, EventType};
use session_sync_transport::{
    DecodeError, Envelope, PROTOCOL_VERSION, decode_record, protocol::now_millis,
};
use thiserror::Error;

/// Handler error.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{0}")]
    Failed(String),
    #[error("Handler is already running")]
    Reentrant,
    #[error("Handler panicked: {0}")]
    Panicked(String),
}

/// An event as delivered to subscribers.
#[derive(Debug, Clone)]
pub struct BusEvent {
    /// Raw envelope (tag, payload, timestamp).
    pub envelope: Envelope,
    /// Typed event.
    pub event: Event,
    /// Session whose stream carried the event, if it came from a prompt stream.
    pub origin: Option<String>,
}

impl BusEvent {
    /// Pair a decoded envelope with its event.
    #[must_use]
    pub const fn new(envelope: Envelope, event: Event) -> Self {
        Self {
            envelope,
            event,
            origin: None,
        }
    }

    /// Build an envelope around a locally produced event.
    #[must_use]
    pub fn local(event: Event) -> Self {
        let envelope = Envelope {
            v: PROTOCOL_VERSION,
            event_type: event.event_type().as_str().to_string(),
            data: event.to_payload().unwrap_or(Value::Null),
            ts: now_millis(),
        };
        Self::new(envelope, event)
    }

    /// Decode one wire record; a record that does not decode becomes an `error` event.
    #[must_use]
    pub fn from_record(record: &str) -> Self {
        match decode_record(record) {
            Ok((envelope, event)) => Self::new(envelope, event),
            Err(e) => {
                tracing::warn!("Undecodable record: {e}");
                Self::decode_fault(&e)
            }
        }
    }

    /// `error` event describing a record that could not be decoded.
    #[must_use]
    pub fn decode_fault(err: &DecodeError) -> Self {
        Self::local(Event::error("DecodeError", err.to_string()))
    }

    /// Tag the event with the session whose stream carried it.
    #[must_use]
    pub fn with_origin(mut self, origin: Option<&str>) -> Self {
        self.origin = origin.map(ToString::to_string);
        self
    }

    /// Type of the carried event.
    #[must_use]
    pub fn event_type(&self) -> EventType {
        self.event.event_type()
    }
}

/// Outcome of one publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Handlers that ran to completion.
    pub delivered: usize,
    /// Handlers that failed.
    pub faults: usize,
}

type Handler = Rc<RefCell<dyn FnMut(&BusEvent) -> Result<(), HandlerError>>>;

#[derive(Clone, PartialEq, Eq)]
enum Filter {
    All,
    Type(EventType),
}

struct Entry {
    id: u64,
    filter: Filter,
    handler: Handler,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    entries: Vec<Entry>,
}

/// Single-threaded publish/subscribe bus. Cloning shares the subscriber list.
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Rc<RefCell<Registry>>,
}

impl EventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to one event type.
    ///
    /// Subscribing to a type outside the catalog never fires; unknown tags
    /// only reach wildcard subscribers.
    pub fn subscribe<F>(&self, event_type: EventType, handler: F) -> Subscription
    where
        F: FnMut(&BusEvent) -> Result<(), HandlerError> + 'static,
    {
        self.add(Filter::Type(event_type), Rc::new(RefCell::new(handler)))
    }

    /// Subscribe to every event, including unknown tags.
    pub fn subscribe_all<F>(&self, handler: F) -> Subscription
    where
        F: FnMut(&BusEvent) -> Result<(), HandlerError> + 'static,
    {
        self.add(Filter::All, Rc::new(RefCell::new(handler)))
    }

    fn add(&self, filter: Filter, handler: Handler) -> Subscription {
        let mut registry = self.registry.borrow_mut();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.entries.push(Entry {
            id,
            filter,
            handler,
        });
        Subscription {
            id,
            registry: Rc::downgrade(&self.registry),
        }
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.registry.borrow().entries.len()
    }

    /// Deliver an event to its subscribers.
    ///
    /// Subscriptions added or removed by a handler take effect from the next publish.
    pub fn publish(&self, event: &BusEvent) -> PublishReport {
        let event_type = event.event_type();
        let handlers: Vec<Handler> = {
            let registry = self.registry.borrow();
            let wildcard = registry
                .entries
                .iter()
                .filter(|entry| entry.filter == Filter::All);
            let typed = registry.entries.iter().filter(|entry| {
                event_type.is_known() && entry.filter == Filter::Type(event_type.clone())
            });
            wildcard
                .chain(typed)
                .map(|entry| Rc::clone(&entry.handler))
                .collect()
        };

        let mut report = PublishReport::default();
        for handler in handlers {
            match run_handler(&handler, event) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.faults += 1;
                    tracing::error!(event_type = %event_type, "Event handler failed: {e}");
                }
            }
        }
        report
    }

    /// Decode one wire record and publish it.
    ///
    /// A record that does not decode is published as an `error` event instead.
    pub fn publish_record(&self, record: &str, origin: Option<&str>) -> PublishReport {
        self.publish(&BusEvent::from_record(record).with_origin(origin))
    }

    fn remove(registry: &Weak<RefCell<Registry>>, id: u64) {
        if let Some(registry) = registry.upgrade() {
            registry.borrow_mut().entries.retain(|entry| entry.id != id);
        }
    }
}

fn run_handler(handler: &Handler, event: &BusEvent) -> Result<(), HandlerError> {
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let mut handler = handler
            .try_borrow_mut()
            .map_err(|_| HandlerError::Reentrant)?;
        (&mut *handler)(event)
    }));
    outcome.unwrap_or_else(|panic| {
        let message = panic
            .downcast_ref::<&str>()
            .map(ToString::to_string)
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_default();
        Err(HandlerError::Panicked(message))
    })
}

/// Handle returned by subscribe. Dropping it keeps the subscription alive.
#[derive(Clone)]
pub struct Subscription {
    id: u64,
    registry: Weak<RefCell<Registry>>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

impl Subscription {
    /// Remove the subscription. Calling it again is a no-op.
    pub fn unsubscribe(&self) {
        EventBus::remove(&self.registry, self.id);
    }

    /// Convert into a guard that unsubscribes on drop.
    #[must_use]
    pub const fn guard(self) -> SubscriptionGuard {
        SubscriptionGuard(self)
    }
}

/// Unsubscribes when dropped.
#[derive(Debug)]
pub struct SubscriptionGuard(Subscription);

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.0.unsubscribe();
    }
}
