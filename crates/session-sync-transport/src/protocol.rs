//! Envelope wire protocol.
//!
//! One record per stream unit:
//!
//! ```text
//! {"v":1,"type":"message.part.updated","data":{...},"ts":1718000000000}
//! ```
//!
//! A stream is closed by exactly one `stream.end` record, or by the
//! transport going away.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use session_sync_core::{Event, EventType};
use thiserror::Error;

/// Envelope version written by this crate and the highest one it accepts.
pub const PROTOCOL_VERSION: u32 = 1;

/// Decode error.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Unsupported envelope version: {0}")]
    UnsupportedVersion(u32),
    #[error("Invalid payload for {event_type}: {source}")]
    Payload {
        event_type: String,
        source: serde_json::Error,
    },
    #[error("Record exceeds {max} bytes")]
    TooLarge { max: usize },
    #[error("Record is not valid UTF-8")]
    InvalidUtf8,
}

/// Versioned wire envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Protocol version.
    pub v: u32,
    /// Event type tag.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Event payload.
    #[serde(default)]
    pub data: Value,
    /// Emission time (Unix epoch milliseconds).
    #[serde(default)]
    pub ts: i64,
}

/// Current time in Unix epoch milliseconds.
#[must_use]
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

impl Envelope {
    /// Wrap an event, stamped with the current time.
    ///
    /// # Errors
    /// Returns error if the payload cannot be represented as JSON.
    pub fn from_event(event: &Event) -> Result<Self, serde_json::Error> {
        Ok(Self {
            v: PROTOCOL_VERSION,
            event_type: event.event_type().as_str().to_string(),
            data: event.to_payload()?,
            ts: now_millis(),
        })
    }

    /// Parsed type tag.
    #[must_use]
    pub fn kind(&self) -> EventType {
        EventType::parse(&self.event_type)
    }

    /// Whether this envelope terminates its stream.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.kind() == EventType::StreamEnd
    }

    /// Serialize to a single-line record.
    ///
    /// # Errors
    /// Returns error if serialization fails.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse a record, rejecting versions newer than [`PROTOCOL_VERSION`].
    ///
    /// # Errors
    /// Returns error if the record is not an envelope or its version is unsupported.
    pub fn decode(record: &str) -> Result<Self, DecodeError> {
        let envelope: Self = serde_json::from_str(record)?;
        if envelope.v == 0 || envelope.v > PROTOCOL_VERSION {
            return Err(DecodeError::UnsupportedVersion(envelope.v));
        }
        Ok(envelope)
    }

    /// Decode the typed event carried by this envelope.
    ///
    /// # Errors
    /// Returns error if the payload does not match the shape its tag requires.
    pub fn event(&self) -> Result<Event, DecodeError> {
        Event::from_payload(&self.event_type, self.data.clone()).map_err(|source| {
            DecodeError::Payload {
                event_type: self.event_type.clone(),
                source,
            }
        })
    }
}

/// Encode an event straight to a record.
///
/// # Errors
/// Returns error if serialization fails.
pub fn encode_event(event: &Event) -> Result<String, serde_json::Error> {
    Envelope::from_event(event)?.encode()
}

/// Decode a record into its envelope and typed event.
///
/// # Errors
/// Returns error if either the envelope or its payload is malformed.
pub fn decode_record(record: &str) -> Result<(Envelope, Event), DecodeError> {
    let envelope = Envelope::decode(record)?;
    let event = envelope.event()?;
    Ok((envelope, event))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use session_sync_core::{MessageInfo, Part};

    #[test]
    fn encode_uses_wire_field_names() {
        let record = encode_event(&Event::stream_end(Some("ok".to_string())))
            .unwrap();
        let value: Value = serde_json::from_str(&record).unwrap();
        assert_eq!(value["v"], 1);
        assert_eq!(value["type"], "stream.end");
        assert_eq!(value["data"], json!({"reason": "ok"}));
        assert!(value["ts"].as_i64().unwrap() > 0);
        assert!(!record.contains('\n'));
    }

    #[test]
    fn decode_typed_event() {
        let part = Part::text("p1", "m1", "s1", "hi");
        let record = encode_event(&Event::part_updated(part.clone())).unwrap();
        let (envelope, event) = decode_record(&record).unwrap();
        assert_eq!(envelope.kind(), EventType::MessagePartUpdated);
        assert_eq!(event, Event::part_updated(part));
    }

    #[test]
    fn decode_accepts_missing_data_and_ts() {
        let envelope = Envelope::decode(r#"{"v":1,"type":"stream.end"}"#).unwrap();
        assert!(envelope.is_terminal());
        assert_eq!(envelope.event().unwrap(), Event::stream_end(None));
    }

    #[test]
    fn decode_rejects_future_version() {
        let err = Envelope::decode(r#"{"v":2,"type":"stream.end","data":{},"ts":0}"#).unwrap_err();
        assert!(matches!(err, DecodeError::UnsupportedVersion(2)));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(
            Envelope::decode("not json"),
            Err(DecodeError::Malformed(_))
        ));
        assert!(matches!(
            Envelope::decode(r#"{"type":"stream.end"}"#),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn payload_mismatch_names_the_type() {
        let err = decode_record(r#"{"v":1,"type":"message.updated","data":{"info":7},"ts":0}"#)
            .unwrap_err();
        let DecodeError::Payload { event_type, .. } = err else {
            panic!("expected payload error");
        };
        assert_eq!(event_type, "message.updated");
    }

    #[test]
    fn message_info_survives_the_wire() {
        let info: MessageInfo =
            serde_json::from_value(json!({"id": "m1", "sessionID": "s1", "cost": 3})).unwrap();
        let record = encode_event(&Event::message_updated(info.clone())).unwrap();
        let (_, event) = decode_record(&record).unwrap();
        assert_eq!(event, Event::message_updated(info));
    }
}
