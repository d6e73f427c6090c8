//! Typed event catalog.
//!
//! Every envelope tag maps to one [`Event`] variant. Tags this client does
//! not know become [`Event::Unknown`] and keep their raw payload.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{MessageInfo, Part, SessionInfo};

/// Event type tag as written on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventType {
    MessageUpdated,
    MessagePartUpdated,
    MessageRemoved,
    MessagePartRemoved,
    SessionCreated,
    SessionUpdated,
    SessionDeleted,
    StreamEnd,
    Error,
    /// A tag outside the catalog.
    Unknown(String),
}

impl EventType {
    /// Every tag in the catalog.
    pub const KNOWN: [Self; 9] = [
        Self::MessageUpdated,
        Self::MessagePartUpdated,
        Self::MessageRemoved,
        Self::MessagePartRemoved,
        Self::SessionCreated,
        Self::SessionUpdated,
        Self::SessionDeleted,
        Self::StreamEnd,
        Self::Error,
    ];

    /// Parse a wire tag. Never fails; unknown tags are kept verbatim.
    #[must_use]
    pub fn parse(tag: &str) -> Self {
        match tag {
            "message.updated" => Self::MessageUpdated,
            "message.part.updated" => Self::MessagePartUpdated,
            "message.removed" => Self::MessageRemoved,
            "message.part.removed" => Self::MessagePartRemoved,
            "session.created" => Self::SessionCreated,
            "session.updated" => Self::SessionUpdated,
            "session.deleted" => Self::SessionDeleted,
            "stream.end" => Self::StreamEnd,
            "error" => Self::Error,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Wire tag.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::MessageUpdated => "message.updated",
            Self::MessagePartUpdated => "message.part.updated",
            Self::MessageRemoved => "message.removed",
            Self::MessagePartRemoved => "message.part.removed",
            Self::SessionCreated => "session.created",
            Self::SessionUpdated => "session.updated",
            Self::SessionDeleted => "session.deleted",
            Self::StreamEnd => "stream.end",
            Self::Error => "error",
            Self::Unknown(tag) => tag,
        }
    }

    /// Whether this tag is part of the catalog.
    #[must_use]
    pub const fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of `message.updated`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageUpdated {
    pub info: MessageInfo,
}

/// Payload of `message.part.updated`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartUpdated {
    /// Full snapshot of the part.
    pub part: Part,
    /// Text appended since the previous snapshot, if the runtime sent one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<String>,
}

/// Payload of `message.removed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRemoved {
    #[serde(rename = "sessionID")]
    pub session_id: String,
    #[serde(rename = "messageID")]
    pub message_id: String,
}

/// Payload of `message.part.removed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartRemoved {
    #[serde(rename = "sessionID")]
    pub session_id: String,
    #[serde(rename = "messageID")]
    pub message_id: String,
    #[serde(rename = "partID")]
    pub part_id: String,
}

/// Payload of `session.created`, `session.updated` and `session.deleted`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionChanged {
    pub info: SessionInfo,
}

/// Payload of `stream.end`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamEnd {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Payload of `error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub name: String,
    pub message: String,
}

impl ErrorInfo {
    #[must_use]
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

/// A decoded event.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    MessageUpdated(MessageUpdated),
    PartUpdated(PartUpdated),
    MessageRemoved(MessageRemoved),
    PartRemoved(PartRemoved),
    SessionCreated(SessionChanged),
    SessionUpdated(SessionChanged),
    SessionDeleted(SessionChanged),
    StreamEnd(StreamEnd),
    Error(ErrorInfo),
    /// Tag outside the catalog, delivered to wildcard subscribers only.
    Unknown { event_type: String, data: Value },
}

impl Event {
    /// `stream.end` with an optional reason.
    #[must_use]
    pub const fn stream_end(reason: Option<String>) -> Self {
        Self::StreamEnd(StreamEnd { reason })
    }

    /// `error` event.
    #[must_use]
    pub fn error(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error(ErrorInfo::new(name, message))
    }

    /// `message.updated` event.
    #[must_use]
    pub const fn message_updated(info: MessageInfo) -> Self {
        Self::MessageUpdated(MessageUpdated { info })
    }

    /// `message.part.updated` event without a delta.
    #[must_use]
    pub const fn part_updated(part: Part) -> Self {
        Self::PartUpdated(PartUpdated { part, delta: None })
    }

    /// The tag this event travels under.
    #[must_use]
    pub fn event_type(&self) -> EventType {
        match self {
            Self::MessageUpdated(_) => EventType::MessageUpdated,
            Self::PartUpdated(_) => EventType::MessagePartUpdated,
            Self::MessageRemoved(_) => EventType::MessageRemoved,
            Self::PartRemoved(_) => EventType::MessagePartRemoved,
            Self::SessionCreated(_) => EventType::SessionCreated,
            Self::SessionUpdated(_) => EventType::SessionUpdated,
            Self::SessionDeleted(_) => EventType::SessionDeleted,
            Self::StreamEnd(_) => EventType::StreamEnd,
            Self::Error(_) => EventType::Error,
            Self::Unknown { event_type, .. } => EventType::Unknown(event_type.clone()),
        }
    }

    /// Session the event refers to, when the payload names one.
    ///
    /// For `session.*` events this is the session's own id.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::MessageUpdated(p) => p.info.session_id.as_deref(),
            Self::PartUpdated(p) => p.part.session_id.as_deref(),
            Self::MessageRemoved(p) => Some(p.session_id.as_str()),
            Self::PartRemoved(p) => Some(p.session_id.as_str()),
            Self::SessionCreated(p) | Self::SessionUpdated(p) | Self::SessionDeleted(p) => {
                Some(p.info.id.as_str())
            }
            Self::StreamEnd(_) | Self::Error(_) | Self::Unknown { .. } => None,
        }
    }

    /// Decode a payload received under `tag`.
    ///
    /// # Errors
    /// Returns error if the payload does not match the shape the tag requires.
    pub fn from_payload(tag: &str, data: Value) -> Result<Self, serde_json::Error> {
        let event = match EventType::parse(tag) {
            EventType::MessageUpdated => Self::MessageUpdated(serde_json::from_value(data)?),
            EventType::MessagePartUpdated => Self::PartUpdated(serde_json::from_value(data)?),
            EventType::MessageRemoved => Self::MessageRemoved(serde_json::from_value(data)?),
            EventType::MessagePartRemoved => Self::PartRemoved(serde_json::from_value(data)?),
            EventType::SessionCreated => Self::SessionCreated(serde_json::from_value(data)?),
            EventType::SessionUpdated => Self::SessionUpdated(serde_json::from_value(data)?),
            EventType::SessionDeleted => Self::SessionDeleted(serde_json::from_value(data)?),
            EventType::StreamEnd if data.is_null() => Self::StreamEnd(StreamEnd::default()),
            EventType::StreamEnd => Self::StreamEnd(serde_json::from_value(data)?),
            EventType::Error => Self::Error(serde_json::from_value(data)?),
            EventType::Unknown(event_type) => Self::Unknown { event_type, data },
        };
        Ok(event)
    }

    /// Encode the payload half of the envelope.
    ///
    /// # Errors
    /// Returns error if a payload field cannot be represented as JSON.
    pub fn to_payload(&self) -> Result<Value, serde_json::Error> {
        match self {
            Self::MessageUpdated(p) => serde_json::to_value(p),
            Self::PartUpdated(p) => serde_json::to_value(p),
            Self::MessageRemoved(p) => serde_json::to_value(p),
            Self::PartRemoved(p) => serde_json::to_value(p),
            Self::SessionCreated(p) | Self::SessionUpdated(p) | Self::SessionDeleted(p) => {
                serde_json::to_value(p)
            }
            Self::StreamEnd(p) => serde_json::to_value(p),
            Self::Error(p) => serde_json::to_value(p),
            Self::Unknown { data, .. } => Ok(data.clone()),
        }
    }
}
