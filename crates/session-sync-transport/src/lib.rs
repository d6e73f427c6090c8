//! Transport layer for session sync streams.
//!
//! Provides:
//! - Wire protocol (versioned JSON envelopes)
//! - Record framing (NDJSON and SSE `data:` lines)
//! - Outgoing sink abstraction for the relay
//! - SSE response adapter (feature: sse)

pub mod framing;
pub mod protocol;
pub mod sink;

#[cfg(feature = "sse")]
pub mod sse;

pub use framing::{Frame, RecordDecoder};
pub use protocol::{DecodeError, Envelope, PROTOCOL_VERSION, decode_record, encode_event};
pub use sink::{EnvelopeSink, SinkError};
