//! Message reconciliation engine.
//!
//! One engine per session. It keeps the session's messages, and each
//! message's parts, sorted ascending by id and applies events so that
//! replaying any event is harmless:
//! - `message.updated` merges into the existing message or inserts a new one
//! - `message.part.updated` replaces or inserts the part, creating a
//!   placeholder message when the owner is not known yet
//! - removals of unknown ids do nothing
//! - `stream.end` clears the sending flag

use std::{
    cell::{Ref, RefCell},
    rc::{Rc, Weak},
};

use session_sync_core::{
    Attachment, ClientError, ErrorInfo, Event, EventType, Message, MessageInfo, Part,
    PromptRequest, SyncConfig,
    locator::{Upsert, find_sorted, locate, remove_sorted, upsert_sorted},
};

use crate::{
    bus::{BusEvent, EventBus, HandlerError, SubscriptionGuard},
    endpoint::Endpoint,
    reader::{ReadOutcome, read_stream},
};

/// Effect of applying one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Inserted,
    Updated,
    Removed,
    /// The event referred to something that is not there.
    Unchanged,
    /// The event is not for this engine.
    Ignored,
}

/// Plain state of one session's messages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageState {
    session_id: String,
    messages: Vec<Message>,
    loading: bool,
    sending: bool,
    last_error: Option<ErrorInfo>,
}

impl MessageState {
    /// Empty state for `session_id`.
    #[must_use]
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Messages, ascending by id.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Look up a message by id.
    #[must_use]
    pub fn message(&self, id: &str) -> Option<&Message> {
        find_sorted(&self.messages, id)
    }

    #[must_use]
    pub const fn is_loading(&self) -> bool {
        self.loading
    }

    #[must_use]
    pub const fn is_sending(&self) -> bool {
        self.sending
    }

    #[must_use]
    pub const fn last_error(&self) -> Option<&ErrorInfo> {
        self.last_error.as_ref()
    }

    /// Hide the last error (explicit user action).
    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    /// Whether `event` belongs to this session.
    ///
    /// Payload session ids win; events without one (`stream.end`, `error`)
    /// are accepted unless they came from another session's stream.
    #[must_use]
    pub fn accepts(&self, event: &BusEvent) -> bool {
        match event.event.session_id() {
            Some(session_id) => session_id == self.session_id,
            None => event
                .origin
                .as_deref()
                .is_none_or(|origin| origin == self.session_id),
        }
    }

    /// Apply one event. Session events and unknown tags are ignored.
    pub fn apply(&mut self, event: &Event) -> Applied {
        if event.session_id().is_some_and(|id| id != self.session_id) {
            return Applied::Ignored;
        }

        match event {
            Event::MessageUpdated(update) => self.update_message(update.info.clone()),
            Event::PartUpdated(update) => self.update_part(update.part.clone()),
            Event::MessageRemoved(removal) => self.remove_message(&removal.message_id),
            Event::PartRemoved(removal) => self.remove_part(&removal.message_id, &removal.part_id),
            Event::StreamEnd(_) => {
                self.sending = false;
                Applied::Updated
            }
            Event::Error(info) => {
                self.last_error = Some(info.clone());
                Applied::Updated
            }
            Event::SessionCreated(_)
            | Event::SessionUpdated(_)
            | Event::SessionDeleted(_)
            | Event::Unknown { .. } => Applied::Ignored,
        }
    }

    fn update_message(&mut self, mut info: MessageInfo) -> Applied {
        if info.session_id.is_none() {
            info.session_id = Some(self.session_id.clone());
        }
        let location = locate(&self.messages, &info.id);
        if location.found {
            self.messages[location.index].info.merge(info);
            Applied::Updated
        } else {
            self.messages
                .insert(location.index, Message::new(info.normalized()));
            Applied::Inserted
        }
    }

    fn update_part(&mut self, part: Part) -> Applied {
        let location = locate(&self.messages, &part.message_id);
        if !location.found {
            tracing::debug!(
                session_id = %self.session_id,
                message_id = %part.message_id,
                "Part for unknown message, inserting placeholder"
            );
            let session_id = part
                .session_id
                .clone()
                .unwrap_or_else(|| self.session_id.clone());
            let info = MessageInfo::placeholder(part.message_id.clone(), Some(session_id));
            self.messages.insert(location.index, Message::new(info));
        }

        let parts = &mut self.messages[location.index].parts;
        to_applied(upsert_sorted(parts, part, |existing, incoming| {
            *existing = incoming;
        }))
    }

    fn remove_message(&mut self, message_id: &str) -> Applied {
        if remove_sorted(&mut self.messages, message_id).is_some() {
            Applied::Removed
        } else {
            tracing::debug!(
                session_id = %self.session_id,
                message_id,
                "Remove for unknown message"
            );
            Applied::Unchanged
        }
    }

    fn remove_part(&mut self, message_id: &str, part_id: &str) -> Applied {
        let location = locate(&self.messages, message_id);
        if !location.found {
            return Applied::Unchanged;
        }
        let parts = &mut self.messages[location.index].parts;
        if remove_sorted(parts, part_id).is_some() {
            Applied::Removed
        } else {
            Applied::Unchanged
        }
    }

    /// Replace everything with a bulk-loaded snapshot.
    pub fn replace_all(&mut self, mut messages: Vec<Message>) {
        messages.retain(|m| {
            m.info
                .session_id
                .as_deref()
                .is_none_or(|id| id == self.session_id)
        });
        for message in &mut messages {
            message.parts.sort_by(|a, b| a.id.cmp(&b.id));
            message.parts.dedup_by(|a, b| a.id == b.id);
        }
        messages.sort_by(|a, b| a.info.id.cmp(&b.info.id));
        messages.dedup_by(|a, b| a.info.id == b.info.id);
        self.messages = messages;
    }

    fn record_error(&mut self, err: &ClientError) {
        self.last_error = Some(ErrorInfo::new(err.name(), err.to_string()));
    }
}

const fn to_applied(result: Upsert) -> Applied {
    match result {
        Upsert::Inserted(_) => Applied::Inserted,
        Upsert::Updated(_) => Applied::Updated,
    }
}

/// Event types the message engine subscribes to.
const HANDLED: [EventType; 6] = [
    EventType::MessageUpdated,
    EventType::MessagePartUpdated,
    EventType::MessageRemoved,
    EventType::MessagePartRemoved,
    EventType::StreamEnd,
    EventType::Error,
];

/// A session's message store, attached to an event bus.
///
/// Dropping the engine (or calling [`MessageEngine::detach`]) removes its
/// subscriptions; the state goes with it.
pub struct MessageEngine {
    session_id: String,
    state: Rc<RefCell<MessageState>>,
    bus: EventBus,
    config: SyncConfig,
    subscriptions: RefCell<Vec<SubscriptionGuard>>,
}

impl MessageEngine {
    /// Create an engine for `session_id` and subscribe it to `bus`.
    #[must_use]
    pub fn attach(session_id: impl Into<String>, bus: &EventBus, config: SyncConfig) -> Self {
        let session_id = session_id.into();
        let state = Rc::new(RefCell::new(MessageState::new(session_id.clone())));

        let subscriptions = HANDLED
            .into_iter()
            .map(|event_type| {
                let weak = Rc::downgrade(&state);
                bus.subscribe(event_type, move |event| handle(&weak, event))
                    .guard()
            })
            .collect();

        Self {
            session_id,
            state,
            bus: bus.clone(),
            config,
            subscriptions: RefCell::new(subscriptions),
        }
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Borrow the current state.
    ///
    /// # Panics
    /// Panics if called from inside one of this engine's own event handlers.
    #[must_use]
    pub fn state(&self) -> Ref<'_, MessageState> {
        self.state.borrow()
    }

    /// Copy of the current messages.
    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        self.state.borrow().messages.clone()
    }

    /// Hide the last error.
    pub fn clear_error(&self) {
        self.state.borrow_mut().clear_error();
    }

    /// Stop receiving events. Idempotent.
    pub fn detach(&self) {
        self.subscriptions.borrow_mut().clear();
    }

    /// Whether the engine still listens to the bus.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        !self.subscriptions.borrow().is_empty()
    }

    /// Load every message of the session, replacing the local copy.
    ///
    /// Waits for the endpoint to be connected.
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
            Ok(client) => client.messages(&self.session_id).await,
            Err(e) => Err(e),
        };

        let mut state = self.state.borrow_mut();
        state.loading = false;
        match result {
            Ok(messages) => {
                tracing::debug!(
                    session_id = %self.session_id,
                    count = messages.len(),
                    "Loaded messages"
                );
                state.replace_all(messages);
                Ok(())
            }
            Err(e) => {
                state.record_error(&e);
                Err(e)
            }
        }
    }

    /// Send a user turn and read its stream to the end.
    ///
    /// `sending` is set for the duration of the turn and cleared by the
    /// stream's `stream.end`. If the stream cannot be opened or breaks off
    /// first, `sending` is cleared here and the error is kept.
    ///
    /// # Errors
    /// Returns error if the endpoint goes away, the request fails or the
    /// stream ends abnormally.
    pub async fn send(
        &self,
        endpoint: &Endpoint,
        content: impl Into<String>,
        attachments: Vec<Attachment>,
    ) -> Result<(), ClientError> {
        {
            let mut state = self.state.borrow_mut();
            state.sending = true;
            state.last_error = None;
        }
        let request = PromptRequest::with_attachments(content, attachments);

        let result = self.run_turn(endpoint, request).await;
        if let Err(e) = &result {
            tracing::warn!(session_id = %self.session_id, "Send failed: {e}");
            let mut state = self.state.borrow_mut();
            state.sending = false;
            state.record_error(e);
        }
        result
    }

    async fn run_turn(
        &self,
        endpoint: &Endpoint,
        request: PromptRequest,
    ) -> Result<(), ClientError> {
        let client = endpoint.client().await?;
        let stream = client.prompt(&self.session_id, request).await?;

        match read_stream(stream, &self.bus, Some(&self.session_id), &self.config).await {
            ReadOutcome::Ended { .. } => Ok(()),
            ReadOutcome::Closed => Err(ClientError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "stream closed before stream.end",
            ))),
            ReadOutcome::Failed(e) => Err(ClientError::Io(e)),
        }
    }
}

fn handle(state: &Weak<RefCell<MessageState>>, event: &BusEvent) -> Result<(), HandlerError> {
    let Some(state) = state.upgrade() else {
        return Ok(());
    };
    let mut state = state
        .try_borrow_mut()
        .map_err(|_| HandlerError::Failed("message state is busy".to_string()))?;
    if state.accepts(event) {
        state.apply(&event.event);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::{StreamExt, stream};
    use serde_json::json;
    use session_sync_core::{ByteStream, RuntimeClient, SessionInfo};
    use session_sync_transport::encode_event;

    use super::*;

    fn event(tag: &str, data: serde_json::Value) -> Event {
        Event::from_payload(tag, data).unwrap()
    }

    fn ids(state: &MessageState) -> Vec<&str> {
        state.messages().iter().map(Message::id).collect()
    }

    fn updated(id: &str) -> Event {
        event("message.updated", json!({"info": {"id": id, "sessionID": "s1"}}))
    }

    #[test]
    fn message_update_is_idempotent() {
        let mut once = MessageState::new("s1");
        once.apply(&event("message.updated", json!({"info": {"id": "m1"}})));

        let mut twice = MessageState::new("s1");
        twice.apply(&event("message.updated", json!({"info": {"id": "m1"}})));
        twice.apply(&event("message.updated", json!({"info": {"id": "m1"}})));

        assert_eq!(once, twice);
        assert_eq!(ids(&twice), ["m1"]);
    }

    #[test]
    fn out_of_order_updates_stay_sorted() {
        let mut state = MessageState::new("s1");
        for id in ["m1", "m3", "m2"] {
            state.apply(&updated(id));
        }
        assert_eq!(ids(&state), ["m1", "m2", "m3"]);
    }

    #[test]
    fn part_before_message_creates_placeholder() {
        let mut state = MessageState::new("s1");
        let applied = state.apply(&event(
            "message.part.updated",
            json!({"part": {
                "id": "p1", "messageID": "m5", "sessionID": "s1", "type": "text", "text": "hi"
            }}),
        ));
        assert_eq!(applied, Applied::Inserted);

        let message = state.message("m5").unwrap();
        assert_eq!(message.info.role, Some(session_sync_core::Role::Assistant));
        assert_eq!(message.parts.len(), 1);
        assert_eq!(message.parts[0].text_content(), Some("hi"));

        state.apply(&event("message.updated", json!({"info": {"id": "m5", "cost": 3}})));
        let message = state.message("m5").unwrap();
        assert_eq!(message.info.field("cost"), Some(&json!(3)));
        assert_eq!(message.parts.len(), 1);
        assert_eq!(message.parts[0].text_content(), Some("hi"));
        assert_eq!(state.messages().len(), 1);
    }

    #[test]
    fn message_update_merges_shallowly() {
        let mut state = MessageState::new("s1");
        state.apply(&event(
            "message.updated",
            json!({"info": {"id": "m1", "role": "assistant", "cost": 1, "error": {"name": "x"}}}),
        ));
        state.apply(&event(
            "message.updated",
            json!({"info": {"id": "m1", "cost": 2, "error": null}}),
        ));

        let info = &state.message("m1").unwrap().info;
        assert_eq!(info.role, Some(session_sync_core::Role::Assistant));
        assert_eq!(info.field("cost"), Some(&json!(2)));
        assert_eq!(info.field("error"), None);
    }

    #[test]
    fn part_update_replaces_whole_snapshot() {
        let mut state = MessageState::new("s1");
        state.apply(&event(
            "message.part.updated",
            json!({"part": {
                "id": "p1", "messageID": "m1", "sessionID": "s1", "type": "tool",
                "state": {"status": "running"}, "title": "ls"
            }}),
        ));
        let applied = state.apply(&event(
            "message.part.updated",
            json!({"part": {
                "id": "p1", "messageID": "m1", "sessionID": "s1", "type": "tool",
                "state": {"status": "completed"}
            }}),
        ));
        assert_eq!(applied, Applied::Updated);

        let part = &state.message("m1").unwrap().parts[0];
        assert_eq!(part.payload["state"]["status"], "completed");
        assert!(!part.payload.contains_key("title"));
    }

    #[test]
    fn streamed_parts_stay_sorted() {
        let mut state = MessageState::new("s1");
        for (id, text) in [("p2", "b"), ("p1", "a"), ("p3", "c"), ("p2", "bb")] {
            state.apply(&Event::part_updated(Part::text(id, "m1", "s1", text)));
        }
        let parts = &state.message("m1").unwrap().parts;
        let texts: Vec<_> = parts.iter().filter_map(Part::text_content).collect();
        assert_eq!(texts, ["a", "bb", "c"]);
    }

    #[test]
    fn removing_unknown_message_is_noop() {
        let mut state = MessageState::new("s1");
        state.apply(&updated("m1"));
        state.apply(&updated("m2"));
        let before = state.clone();

        let applied = state.apply(&event(
            "message.removed",
            json!({"sessionID": "s1", "messageID": "ghost"}),
        ));
        assert_eq!(applied, Applied::Unchanged);
        assert_eq!(state, before);
        assert_eq!(ids(&state), ["m1", "m2"]);
    }

    #[test]
    fn removals() {
        let mut state = MessageState::new("s1");
        state.apply(&Event::part_updated(Part::text("p1", "m1", "s1", "a")));
        state.apply(&Event::part_updated(Part::text("p2", "m1", "s1", "b")));

        let removed = |message: &str, part: &str| {
            event(
                "message.part.removed",
                json!({"sessionID": "s1", "messageID": message, "partID": part}),
            )
        };
        assert_eq!(state.apply(&removed("m1", "p1")), Applied::Removed);
        assert_eq!(state.apply(&removed("m1", "p1")), Applied::Unchanged);
        assert_eq!(state.apply(&removed("ghost", "p2")), Applied::Unchanged);
        assert_eq!(state.message("m1").unwrap().parts.len(), 1);

        assert_eq!(
            state.apply(&event("message.removed", json!({"sessionID": "s1", "messageID": "m1"}))),
            Applied::Removed
        );
        assert!(state.messages().is_empty());
    }

    #[test]
    fn stream_end_clears_sending() {
        for data in [json!({"reason": "ok"}), json!({})] {
            let mut state = MessageState::new("s1");
            state.sending = true;
            state.apply(&event("stream.end", data));
            assert!(!state.is_sending());
        }
    }

    #[test]
    fn other_sessions_are_ignored() {
        let mut state = MessageState::new("s1");
        state.apply(&updated("m1"));
        let before = state.clone();

        let foreign = [
            event("message.updated", json!({"info": {"id": "m9", "sessionID": "s2"}})),
            event(
                "message.part.updated",
                json!({"part": {"id": "p1", "messageID": "m1", "sessionID": "s2", "type": "text"}}),
            ),
            event("message.removed", json!({"sessionID": "s2", "messageID": "m1"})),
        ];
        for e in &foreign {
            assert_eq!(state.apply(e), Applied::Ignored);
        }
        assert_eq!(state, before);
    }

    #[test]
    fn origin_scopes_events_without_session_id() {
        let state = MessageState::new("s1");
        let end = BusEvent::local(Event::stream_end(None));
        assert!(state.accepts(&end));
        assert!(state.accepts(&end.clone().with_origin(Some("s1"))));
        assert!(!state.accepts(&end.with_origin(Some("s2"))));
    }

    #[test]
    fn error_event_is_kept_until_cleared() {
        let mut state = MessageState::new("s1");
        state.apply(&Event::error("ProviderError", "boom"));
        assert_eq!(state.last_error().unwrap().message, "boom");
        state.apply(&updated("m1"));
        assert!(state.last_error().is_some());
        state.clear_error();
        assert!(state.last_error().is_none());
    }

    #[test]
    fn replace_all_sorts_and_filters() {
        let mut state = MessageState::new("s1");
        let mut m2 = Message::new(MessageInfo::new("m2"));
        m2.parts = vec![Part::text("p2", "m2", "s1", "b"), Part::text("p1", "m2", "s1", "a")];
        let mut foreign = MessageInfo::new("m0");
        foreign.session_id = Some("s2".to_string());

        state.replace_all(vec![m2, Message::new(MessageInfo::new("m1")), Message::new(foreign)]);
        assert_eq!(ids(&state), ["m1", "m2"]);
        assert_eq!(state.message("m2").unwrap().parts[0].id, "p1");
    }

    // Engine-level tests.

    fn stream_of(events: &[Event]) -> ByteStream {
        let wire: String = events
            .iter()
            .map(|e| format!("{}\n", encode_event(e).unwrap()))
            .collect();
        stream::iter(vec![Ok::<_, std::io::Error>(Bytes::from(wire))]).boxed_local()
    }

    struct FakeClient {
        turn: RefCell<Option<Vec<Event>>>,
        history: Vec<Message>,
        prompts: Cell<usize>,
    }

    impl FakeClient {
        fn new(turn: Vec<Event>) -> Self {
            Self {
                turn: RefCell::new(Some(turn)),
                history: Vec::new(),
                prompts: Cell::new(0),
            }
        }
    }

    #[async_trait(?Send)]
    impl RuntimeClient for FakeClient {
        async fn prompt(
            &self,
            _session_id: &str,
            _request: PromptRequest,
        ) -> Result<ByteStream, ClientError> {
            self.prompts.set(self.prompts.get() + 1);
            let events = self
                .turn
                .borrow_mut()
                .take()
                .ok_or_else(|| ClientError::Request("no turn scripted".to_string()))?;
            Ok(stream_of(&events))
        }

        async fn messages(&self, _session_id: &str) -> Result<Vec<Message>, ClientError> {
            Ok(self.history.clone())
        }

        async fn sessions(&self) -> Result<Vec<SessionInfo>, ClientError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn send_streams_a_turn_through_the_bus() {
        let bus = EventBus::new();
        let engine = MessageEngine::attach("s1", &bus, SyncConfig::default());
        let client = Rc::new(FakeClient::new(vec![
            Event::part_updated(Part::text("p1", "m2", "s1", "Hel")),
            Event::part_updated(Part::text("p1", "m2", "s1", "Hello")),
            event(
                "message.updated",
                json!({"info": {"id": "m2", "sessionID": "s1", "role": "assistant", "cost": 0.01}}),
            ),
            Event::stream_end(None),
        ]));
        let endpoint = Endpoint::connected_to(client.clone());

        engine.send(&endpoint, "hi", Vec::new()).await.unwrap();

        let state = engine.state();
        assert!(!state.is_sending());
        assert!(state.last_error().is_none());
        let message = state.message("m2").unwrap();
        assert_eq!(message.parts[0].text_content(), Some("Hello"));
        assert_eq!(message.info.field("cost"), Some(&json!(0.01)));
        assert_eq!(client.prompts.get(), 1);
    }

    #[tokio::test]
    async fn stream_error_is_surfaced() {
        let bus = EventBus::new();
        let engine = MessageEngine::attach("s1", &bus, SyncConfig::default());
        let endpoint = Endpoint::connected_to(Rc::new(FakeClient::new(vec![
            Event::error("ProviderError", "rate limited"),
            Event::stream_end(Some("error".to_string())),
        ])));

        engine.send(&endpoint, "hi", Vec::new()).await.unwrap();
        let error = engine.state().last_error().cloned().unwrap();
        assert_eq!(error.message, "rate limited");
        assert!(!engine.state().is_sending());
    }

    #[tokio::test]
    async fn stream_without_end_records_error() {
        let bus = EventBus::new();
        let engine = MessageEngine::attach("s1", &bus, SyncConfig::default());
        let endpoint = Endpoint::connected_to(Rc::new(FakeClient::new(vec![Event::part_updated(
            Part::text("p1", "m1", "s1", "partial"),
        )])));

        let result = engine.send(&endpoint, "hi", Vec::new()).await;
        assert!(matches!(result, Err(ClientError::Io(_))));
        let state = engine.state();
        assert!(!state.is_sending());
        assert_eq!(state.last_error().unwrap().name, "TransportError");
        assert_eq!(state.messages().len(), 1);
    }

    #[tokio::test]
    async fn failed_prompt_clears_sending() {
        let bus = EventBus::new();
        let engine = MessageEngine::attach("s1", &bus, SyncConfig::default());
        let client = FakeClient {
            turn: RefCell::new(None),
            history: Vec::new(),
            prompts: Cell::new(0),
        };
        let endpoint = Endpoint::connected_to(Rc::new(client));

        assert!(engine.send(&endpoint, "hi", Vec::new()).await.is_err());
        assert!(!engine.state().is_sending());
        assert_eq!(engine.state().last_error().unwrap().name, "RequestError");
    }

    #[tokio::test]
    async fn fetch_all_loads_history_and_clears_error() {
        let bus = EventBus::new();
        let engine = MessageEngine::attach("s1", &bus, SyncConfig::default());
        let mut client = FakeClient::new(Vec::new());
        client.history = vec![
            Message::new(MessageInfo::new("m2")),
            Message::new(MessageInfo::new("m1")),
        ];
        let endpoint = Endpoint::connected_to(Rc::new(client));

        engine.state.borrow_mut().apply(&Event::error("E", "old"));
        engine.fetch_all(&endpoint).await.unwrap();

        let state = engine.state();
        assert_eq!(ids(&state), ["m1", "m2"]);
        assert!(state.last_error().is_none());
        assert!(!state.is_loading());
    }

    #[tokio::test]
    async fn fetch_all_without_connection_fails() {
        let bus = EventBus::new();
        let engine = MessageEngine::attach("s1", &bus, SyncConfig::default());
        let (feeder, endpoint) = crate::endpoint::endpoint();
        drop(feeder);

        assert!(matches!(
            engine.fetch_all(&endpoint).await,
            Err(ClientError::NotConnected)
        ));
        assert_eq!(engine.state().last_error().unwrap().name, "NotConnectedError");
    }

    #[test]
    fn engines_only_see_their_session() {
        let bus = EventBus::new();
        let s1 = MessageEngine::attach("s1", &bus, SyncConfig::default());
        let s2 = MessageEngine::attach("s2", &bus, SyncConfig::default());

        bus.publish(&BusEvent::local(event(
            "message.updated",
            json!({"info": {"id": "m1", "sessionID": "s2"}}),
        )));
        assert!(s1.messages().is_empty());
        assert_eq!(s2.messages().len(), 1);
    }

    #[test]
    fn detach_stops_updates() {
        let bus = EventBus::new();
        let engine = MessageEngine::attach("s1", &bus, SyncConfig::default());
        assert_eq!(bus.subscriber_count(), HANDLED.len());

        engine.detach();
        engine.detach();
        assert!(!engine.is_attached());
        assert_eq!(bus.subscriber_count(), 0);

        bus.publish(&BusEvent::local(updated("m1")));
        assert!(engine.messages().is_empty());
    }

    #[test]
    fn dropping_engine_unsubscribes() {
        let bus = EventBus::new();
        let engine = MessageEngine::attach("s1", &bus, SyncConfig::default());
        drop(engine);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
