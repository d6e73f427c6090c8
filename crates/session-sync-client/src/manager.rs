//! Session manager: the session list and its message engines, kept together.
//!
//! Every user action that changes which sessions are open also creates,
//! closes or rekeys the matching [`MessageEngine`] in the same call. A
//! `session.deleted` event tears the deleted session's engine down.

use std::{cell::RefCell, rc::Rc};

use session_sync_core::{Event, EventType, SessionInfo, SyncConfig};

use crate::{
    bus::{EventBus, HandlerError, SubscriptionGuard},
    messages::MessageEngine,
    registry::EngineRegistry,
    sessions::SessionEngine,
};

/// Owns the bus, the session engine and one message engine per open session.
pub struct SyncManager {
    bus: EventBus,
    sessions: SessionEngine,
    registry: Rc<RefCell<EngineRegistry>>,
    _deleted: SubscriptionGuard,
}

impl SyncManager {
    /// Create a manager with its own bus.
    #[must_use]
    pub fn new(config: SyncConfig) -> Self {
        Self::with_bus(EventBus::new(), config)
    }

    /// Create a manager on an existing bus.
    #[must_use]
    pub fn with_bus(bus: EventBus, config: SyncConfig) -> Self {
        let sessions = SessionEngine::attach(&bus);
        let registry = Rc::new(RefCell::new(EngineRegistry::new(bus.clone(), config)));

        let weak = Rc::downgrade(&registry);
        let deleted = bus
            .subscribe(EventType::SessionDeleted, move |event| {
                let Event::SessionDeleted(change) = &event.event else {
                    return Ok(());
                };
                let Some(registry) = weak.upgrade() else {
                    return Ok(());
                };
                let mut registry = registry
                    .try_borrow_mut()
                    .map_err(|_| HandlerError::Failed("engine registry is busy".to_string()))?;
                registry.close(&change.info.id);
                Ok(())
            })
            .guard();

        Self {
            bus,
            sessions,
            registry,
            _deleted: deleted,
        }
    }

    #[must_use]
    pub const fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// The session list.
    #[must_use]
    pub const fn sessions(&self) -> &SessionEngine {
        &self.sessions
    }

    /// The message engine of an open session.
    #[must_use]
    pub fn engine(&self, session_id: &str) -> Option<Rc<MessageEngine>> {
        self.registry.borrow().get(session_id)
    }

    /// Number of live message engines.
    #[must_use]
    pub fn engine_count(&self) -> usize {
        self.registry.borrow().len()
    }

    /// Open a session and return its message engine.
    pub fn open(&self, session_id: &str) -> Rc<MessageEngine> {
        self.sessions.open(session_id);
        self.registry.borrow_mut().get_or_create(session_id)
    }

    /// Open a session, make it active and return its message engine.
    pub fn set_active(&self, session_id: &str) -> Rc<MessageEngine> {
        self.sessions.set_active(session_id);
        self.registry.borrow_mut().get_or_create(session_id)
    }

    /// Start a local session and return its message engine.
    pub fn create_ephemeral(&self, title: Option<String>) -> Rc<MessageEngine> {
        let local_id = self.sessions.create_ephemeral(title);
        self.registry.borrow_mut().get_or_create(&local_id)
    }

    /// Close a session and drop its message engine.
    ///
    /// Returns false if the session was neither open nor had an engine.
    pub fn close(&self, session_id: &str) -> bool {
        let closed = self.sessions.close(session_id);
        let dropped = self.registry.borrow_mut().close(session_id);
        closed || dropped
    }

    /// Swap a local session for its server-issued one.
    ///
    /// The session list and the engine registry move to the new id in this
    /// one call. Returns the engine now serving the session, or `None` if
    /// `local_id` is unknown.
    pub fn promote(&self, local_id: &str, server: SessionInfo) -> Option<Rc<MessageEngine>> {
        let new_id = server.id.clone();
        if !self.sessions.promote(local_id, server) {
            return None;
        }

        let mut registry = self.registry.borrow_mut();
        if new_id == local_id {
            return Some(registry.get_or_create(&new_id));
        }
        Some(registry.rekey(local_id, &new_id))
    }
}
