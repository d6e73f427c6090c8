//! Session reconciliation engine.
//!
//! Keeps the global session list sorted by id, plus two user-driven
//! projections: the ids the user has open, and the active one. Incoming
//! events only ever shrink the open list (on `session.deleted`); everything
//! else about it comes from explicit user actions.

use std::{
    cell::{Ref, RefCell},
    rc::{Rc, Weak},
};

use session_sync_core::{
    ClientError, ErrorInfo, Event, EventType, SessionInfo,
    locator::{find_sorted, locate, remove_sorted},
};
use uuid::Uuid;

use crate::{
    bus::{BusEvent, EventBus, HandlerError, SubscriptionGuard},
    endpoint::Endpoint,
    messages::Applied,
};

/// Prefix of locally generated session ids.
pub const LOCAL_ID_PREFIX: &str = "local-";

/// Plain state of the session list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    sessions: Vec<SessionInfo>,
    visible: Vec<String>,
    active: Option<String>,
    loading: bool,
    last_error: Option<ErrorInfo>,
}

impl SessionState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All known sessions, ascending by id.
    #[must_use]
    pub fn sessions(&self) -> &[SessionInfo] {
        &self.sessions
    }

    #[must_use]
    pub fn session(&self, id: &str) -> Option<&SessionInfo> {
        find_sorted(&self.sessions, id)
    }

    /// Ids the user has open, in the order they were opened.
    #[must_use]
    pub fn visible(&self) -> &[String] {
        &self.visible
    }

    #[must_use]
    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    #[must_use]
    pub const fn is_loading(&self) -> bool {
        self.loading
    }

    #[must_use]
    pub const fn last_error(&self) -> Option<&ErrorInfo> {
        self.last_error.as_ref()
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    /// Apply one event. Message events and unknown tags are ignored.
    pub fn apply(&mut self, event: &Event) -> Applied {
        match event {
            Event::SessionCreated(change) | Event::SessionUpdated(change) => {
                self.upsert(change.info.clone())
            }
            Event::SessionDeleted(change) => self.delete(&change.info.id),
            _ => Applied::Ignored,
        }
    }

    fn upsert(&mut self, info: SessionInfo) -> Applied {
        let location = locate(&self.sessions, &info.id);
        if location.found {
            self.sessions[location.index].merge(info);
            Applied::Updated
        } else {
            self.sessions.insert(location.index, info.normalized());
            Applied::Inserted
        }
    }

    fn delete(&mut self, id: &str) -> Applied {
        let removed = remove_sorted(&mut self.sessions, id).is_some();
        self.visible.retain(|visible| visible != id);
        if self.active.as_deref() == Some(id) {
            self.active = None;
        }
        if removed {
            Applied::Removed
        } else {
            Applied::Unchanged
        }
    }

    /// Create a session that exists only locally until it is promoted.
    ///
    /// The new session is opened and becomes active. Returns its local id.
    pub fn create_ephemeral(&mut self, title: Option<String>) -> String {
        let id = format!("{LOCAL_ID_PREFIX}{}", Uuid::new_v4());
        let mut info = SessionInfo::new(id.clone(), title);
        info.ephemeral = true;
        self.upsert(info);
        self.open(&id);
        self.active = Some(id.clone());
        id
    }

    /// Add `id` to the open list. Returns false if it was already open.
    pub fn open(&mut self, id: &str) -> bool {
        if self.visible.iter().any(|visible| visible == id) {
            return false;
        }
        self.visible.push(id.to_string());
        true
    }

    /// Remove `id` from the open list.
    ///
    /// Closing the active session makes the nearest remaining open one active.
    pub fn close(&mut self, id: &str) -> bool {
        let Some(position) = self.visible.iter().position(|visible| visible == id) else {
            return false;
        };
        self.visible.remove(position);
        if self.active.as_deref() == Some(id) {
            let next = position.min(self.visible.len().saturating_sub(1));
            self.active = self.visible.get(next).cloned();
        }
        true
    }

    /// Make `id` the active session, opening it if needed.
    pub fn set_active(&mut self, id: &str) {
        self.open(id);
        self.active = Some(id.to_string());
    }

    /// Replace an ephemeral session with its server-issued counterpart.
    ///
    /// The local entry is removed, the server entry inserted (keeping the
    /// local title if the server has none), and the open list and active
    /// pointer are rewritten to the new id in the same step. Returns false
    /// and changes nothing if `local_id` is unknown.
    pub fn promote(&mut self, local_id: &str, server: SessionInfo) -> bool {
        let Some(local) = remove_sorted(&mut self.sessions, local_id) else {
            return false;
        };

        let mut server = server.normalized();
        server.ephemeral = false;
        if server.title.is_none() {
            server.title = local.title;
        }
        let new_id = server.id.clone();

        let location = locate(&self.sessions, &new_id);
        if location.found {
            // The server's session.created may have arrived first.
            self.sessions[location.index].merge(server);
        } else {
            self.sessions.insert(location.index, server);
        }

        let already_open = new_id != local_id && self.visible.iter().any(|id| *id == new_id);
        if already_open {
            self.visible.retain(|id| id != local_id);
        } else if let Some(slot) = self.visible.iter_mut().find(|id| *id == local_id) {
            slot.clone_from(&new_id);
        }
        if self.active.as_deref() == Some(local_id) {
            self.active = Some(new_id.clone());
        }

        tracing::debug!(local_id, session_id = %new_id, "Promoted ephemeral session");
        true
    }

    fn merge_all(&mut self, sessions: Vec<SessionInfo>) {
        for info in sessions {
            self.upsert(info);
        }
    }

    fn record_error(&mut self, err: &ClientError) {
        self.last_error = Some(ErrorInfo::new(err.name(), err.to_string()));
    }
}

const HANDLED: [EventType; 3] = [
    EventType::SessionCreated,
    EventType::SessionUpdated,
    EventType::SessionDeleted,
];

/// The session list, attached to an event bus.
pub struct SessionEngine {
    state: Rc<RefCell<SessionState>>,
    subscriptions: RefCell<Vec<SubscriptionGuard>>,
}

impl SessionEngine {
    /// Create the engine and subscribe it to `bus`.
    #[must_use]
    pub fn attach(bus: &EventBus) -> Self {
        let state = Rc::new(RefCell::new(SessionState::new()));
        let subscriptions = HANDLED
            .into_iter()
            .map(|event_type| {
                let weak = Rc::downgrade(&state);
                bus.subscribe(event_type, move |event| handle(&weak, event))
                    .guard()
            })
            .collect();

        Self {
            state,
            subscriptions: RefCell::new(subscriptions),
        }
    }

    /// Borrow the current state.
    ///
    /// # Panics
    /// Panics if called from inside one of this engine's own event handlers.
    #[must_use]
    pub fn state(&self) -> Ref<'_, SessionState> {
        self.state.borrow()
    }

    pub fn create_ephemeral(&self, title: Option<String>) -> String {
        self.state.borrow_mut().create_ephemeral(title)
    }

    pub fn open(&self, id: &str) -> bool {
        self.state.borrow_mut().open(id)
    }

    pub fn close(&self, id: &str) -> bool {
        self.state.borrow_mut().close(id)
    }

    pub fn set_active(&self, id: &str) {
        self.state.borrow_mut().set_active(id);
    }

    /// See [`SessionState::promote`].
    pub fn promote(&self, local_id: &str, server: SessionInfo) -> bool {
        self.state.borrow_mut().promote(local_id, server)
    }

    pub fn clear_error(&self) {
        self.state.borrow_mut().clear_error();
    }

    /// Stop receiving events. Idempotent.
    pub fn detach(&self) {
        self.subscriptions.borrow_mut().clear();
    }

    /// Load the session list and merge it in.
    ///
    /// Local sessions not known to the server are kept.
    ///
    /// # Errors
    /// Returns error if the endpoint goes away or the request fails; the
    /// error is also kept as the engine's last error.
    pub async fn fetch_all(&self, endpoint: &Endpoint) -> Result<(), ClientError> {
        {
            let mut state = self.state.borrow_mut();
            state.loading = true;
            state.last_error = None;
        }

        let result = match endpoint.client().await {
            Ok(client) => client.sessions().await,
            Err(e) => Err(e),
        };

        let mut state = self.state.borrow_mut();
        state.loading = false;
        match result {
            Ok(sessions) => {
                tracing::debug!(count = sessions.len(), "Loaded sessions");
                state.merge_all(sessions);
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Session list failed: {e}");
                state.record_error(&e);
                Err(e)
            }
        }
    }
}

fn handle(state: &Weak<RefCell<SessionState>>, event: &BusEvent) -> Result<(), HandlerError> {
    let Some(state) = state.upgrade() else {
        return Ok(());
    };
    let mut state = state
        .try_borrow_mut()
        .map_err(|_| HandlerError::Failed("session state is busy".to_string()))?;
    state.apply(&event.event);
    Ok(())
}
