//! Stream reader: pulls records off a prompt stream and publishes them.
//!
//! Records are published strictly in wire order. Reading stops at the first
//! `stream.end`; anything after it is not read.

use futures::StreamExt;
use session_sync_core::{ByteStream, Event, SyncConfig};
use session_sync_transport::{DecodeError, Frame, RecordDecoder};

use crate::bus::{BusEvent, EventBus};

/// How a stream finished.
#[derive(Debug)]
pub enum ReadOutcome {
    /// A `stream.end` record arrived.
    Ended { reason: Option<String> },
    /// The transport closed without a `stream.end`.
    Closed,
    /// The transport failed.
    Failed(std::io::Error),
}

impl ReadOutcome {
    /// Whether the stream was terminated by its own `stream.end`.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        matches!(self, Self::Ended { .. })
    }
}

/// Read `stream` to its end, publishing every record on `bus`.
///
/// `origin` tags each published event with the session the stream belongs to.
pub async fn read_stream(
    mut stream: ByteStream,
    bus: &EventBus,
    origin: Option<&str>,
    config: &SyncConfig,
) -> ReadOutcome {
    let mut decoder = RecordDecoder::new(config.max_record_bytes);

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::warn!(?origin, "Stream transport failed: {e}");
                return ReadOutcome::Failed(e);
            }
        };
        for frame in decoder.push(&chunk) {
            if let Some(outcome) = dispatch(frame, bus, origin, config) {
                return outcome;
            }
        }
    }

    if let Some(frame) = decoder.finish() {
        if let Some(outcome) = dispatch(frame, bus, origin, config) {
            return outcome;
        }
    }
    tracing::debug!(?origin, "Stream closed without stream.end");
    ReadOutcome::Closed
}

fn dispatch(
    frame: Frame,
    bus: &EventBus,
    origin: Option<&str>,
    config: &SyncConfig,
) -> Option<ReadOutcome> {
    let event = match frame {
        Frame::Record(record) => BusEvent::from_record(&record),
        Frame::Oversized => BusEvent::decode_fault(&DecodeError::TooLarge {
            max: config.max_record_bytes,
        }),
        Frame::InvalidUtf8 => BusEvent::decode_fault(&DecodeError::InvalidUtf8),
    }
    .with_origin(origin);

    bus.publish(&event);

    match event.event {
        Event::StreamEnd(end) => Some(ReadOutcome::Ended { reason: end.reason }),
        _ => None,
    }
}
