//! Message engines by session id.

use std::{collections::HashMap, rc::Rc};

use session_sync_core::SyncConfig;

use crate::{bus::EventBus, messages::MessageEngine};

/// Owns one [`MessageEngine`] per open session.
pub struct EngineRegistry {
    bus: EventBus,
    config: SyncConfig,
    engines: HashMap<String, Rc<MessageEngine>>,
}

impl EngineRegistry {
    /// Create an empty registry whose engines attach to `bus`.
    #[must_use]
    pub fn new(bus: EventBus, config: SyncConfig) -> Self {
        Self {
            bus,
            config,
            engines: HashMap::new(),
        }
    }

    /// The engine for `session_id`, creating it on first use.
    pub fn get_or_create(&mut self, session_id: &str) -> Rc<MessageEngine> {
        let engine = self.engines.entry(session_id.to_string()).or_insert_with(|| {
            tracing::debug!(session_id, "Creating message engine");
            Rc::new(MessageEngine::attach(
                session_id,
                &self.bus,
                self.config.clone(),
            ))
        });
        Rc::clone(engine)
    }

    #[must_use]
    pub fn get(&self, session_id: &str) -> Option<Rc<MessageEngine>> {
        self.engines.get(session_id).cloned()
    }

    /// Detach and drop the engine for `session_id`.
    ///
    /// Returns false if there was none. Handles still held elsewhere keep
    /// their last state but no longer receive events.
    pub fn close(&mut self, session_id: &str) -> bool {
        match self.engines.remove(session_id) {
            Some(engine) => {
                engine.detach();
                tracing::debug!(session_id, "Closed message engine");
                true
            }
            None => false,
        }
    }

    /// Rename an engine's key, e.g. after an ephemeral session is promoted.
    ///
    /// The old engine is closed; the new id gets a fresh engine on next use.
    pub fn rekey(&mut self, old_id: &str, new_id: &str) -> Rc<MessageEngine> {
        self.close(old_id);
        self.get_or_create(new_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.engines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    /// Ids with a live engine, in no particular order.
    pub fn session_ids(&self) -> impl Iterator<Item = &str> {
        self.engines.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use session_sync_core::Event;

    use super::*;
    use crate::bus::BusEvent;

    fn registry() -> (EventBus, EngineRegistry) {
        let bus = EventBus::new();
        let registry = EngineRegistry::new(bus.clone(), SyncConfig::default());
        (bus, registry)
    }

    #[test]
    fn creates_once_per_session() {
        let (_bus, mut registry) = registry();
        let a = registry.get_or_create("s1");
        let b = registry.get_or_create("s1");
        registry.get_or_create("s2");

        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 2);
        assert!(registry.get("s3").is_none());
    }

    #[test]
    fn close_detaches_from_bus() {
        let (bus, mut registry) = registry();
        let engine = registry.get_or_create("s1");
        assert!(bus.subscriber_count() > 0);

        assert!(registry.close("s1"));
        assert!(!registry.close("s1"));
        assert!(registry.is_empty());
        assert_eq!(bus.subscriber_count(), 0);

        let event = Event::from_payload(
            "message.updated",
            json!({"info": {"id": "m1", "sessionID": "s1"}}),
        )
        .unwrap();
        bus.publish(&BusEvent::local(event));
        assert!(engine.messages().is_empty());
    }

    #[test]
    fn rekey_replaces_engine() {
        let (_bus, mut registry) = registry();
        let old = registry.get_or_create("local-1");
        let new = registry.rekey("local-1", "ses_1");

        assert!(!old.is_attached());
        assert_eq!(new.session_id(), "ses_1");
        assert_eq!(registry.session_ids().collect::<Vec<_>>(), ["ses_1"]);
    }
}
