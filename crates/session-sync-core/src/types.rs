//! Domain types shared by the relay and the reconciliation engines.
//!
//! Wire field names follow the runtime's spelling (`sessionID`, `messageID`).
//! Anything a type does not model explicitly is kept in a flattened
//! `fields`/`payload` map so that newer runtimes round-trip losslessly.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::locator::Keyed;

/// Author of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Message written by the user.
    User,
    /// Message produced by the agent.
    Assistant,
    /// Role not known to this client.
    #[serde(untagged)]
    Other(String),
}

/// Message metadata as carried by `message.updated`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageInfo {
    /// Message id, sortable in creation order.
    pub id: String,
    /// Owning session.
    #[serde(rename = "sessionID", default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Author role.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    /// Every other field (cost, tokens, time, model ids, ...).
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl MessageInfo {
    /// Create bare message info with just an id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            session_id: None,
            role: None,
            fields: Map::new(),
        }
    }

    /// Minimal stand-in for a message that is only known through one of its parts.
    #[must_use]
    pub fn placeholder(id: impl Into<String>, session_id: Option<String>) -> Self {
        let mut fields = Map::new();
        fields.insert("cost".to_string(), json!(0));
        fields.insert(
            "tokens".to_string(),
            json!({
                "input": 0,
                "output": 0,
                "reasoning": 0,
                "cache": { "read": 0, "write": 0 }
            }),
        );
        fields.insert("time".to_string(), json!({ "created": 0 }));

        Self {
            id: id.into(),
            session_id,
            role: Some(Role::Assistant),
            fields,
        }
    }

    /// Shallow merge: fields present in `incoming` overwrite, absent fields
    /// are kept, and an explicit `null` removes the field.
    pub fn merge(&mut self, incoming: Self) {
        if incoming.session_id.is_some() {
            self.session_id = incoming.session_id;
        }
        if incoming.role.is_some() {
            self.role = incoming.role;
        }
        merge_fields(&mut self.fields, incoming.fields);
    }

    /// Drop `null` fields so freshly inserted info looks like merged info.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.fields.retain(|_, v| !v.is_null());
        self
    }

    /// Get a metadata field.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

/// One piece of a message: text, tool call, file, step marker, ...
///
/// Updates always carry the whole part, so a stored part is replaced, never merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    /// Part id, sortable in creation order.
    pub id: String,
    /// Owning message.
    #[serde(rename = "messageID")]
    pub message_id: String,
    /// Owning session.
    #[serde(rename = "sessionID", default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Part type tag (`text`, `tool`, `file`, ...).
    #[serde(rename = "type")]
    pub kind: String,
    /// Type-specific payload.
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Part {
    /// Create a text part.
    #[must_use]
    pub fn text(
        id: impl Into<String>,
        message_id: impl Into<String>,
        session_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        let mut payload = Map::new();
        payload.insert("text".to_string(), Value::String(text.into()));
        Self {
            id: id.into(),
            message_id: message_id.into(),
            session_id: Some(session_id.into()),
            kind: "text".to_string(),
            payload,
        }
    }

    /// Text content, for parts that have one.
    #[must_use]
    pub fn text_content(&self) -> Option<&str> {
        self.payload.get("text").and_then(Value::as_str)
    }
}

/// A message together with its ordered parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub info: MessageInfo,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Message {
    /// Wrap info with no parts yet.
    #[must_use]
    pub const fn new(info: MessageInfo) -> Self {
        Self {
            info,
            parts: Vec::new(),
        }
    }

    /// Message id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.info.id
    }
}

/// UI-level session record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Server-issued id, or a local id while ephemeral.
    pub id: String,
    /// Display title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// True until the runtime has issued a real id for this session.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub ephemeral: bool,
    /// Every other field (time, version, parent id, ...).
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl SessionInfo {
    /// Create session info with an id and optional title.
    #[must_use]
    pub fn new(id: impl Into<String>, title: Option<String>) -> Self {
        Self {
            id: id.into(),
            title,
            ephemeral: false,
            fields: Map::new(),
        }
    }

    /// Shallow merge with the same null rule as [`MessageInfo::merge`].
    pub fn merge(&mut self, incoming: Self) {
        if incoming.title.is_some() {
            self.title = incoming.title;
        }
        self.ephemeral = self.ephemeral && incoming.ephemeral;
        merge_fields(&mut self.fields, incoming.fields);
    }

    /// Drop `null` fields.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.fields.retain(|_, v| !v.is_null());
        self
    }
}

fn merge_fields(target: &mut Map<String, Value>, incoming: Map<String, Value>) {
    for (key, value) in incoming {
        if value.is_null() {
            target.remove(&key);
        } else {
            target.insert(key, value);
        }
    }
}

impl Keyed for Message {
    fn key(&self) -> &str {
        &self.info.id
    }
}

impl Keyed for Part {
    fn key(&self) -> &str {
        &self.id
    }
}

impl Keyed for SessionInfo {
    fn key(&self) -> &str {
        &self.id
    }
}
