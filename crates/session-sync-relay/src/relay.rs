//! Streaming relay: underlying update stream in, envelopes out.
//!
//! Guarantees, for every stream it serves:
//! - exactly one `stream.end` record is attempted, and nothing is written after it
//! - a provider fault becomes an in-band `error` record followed by `stream.end`
//! - a failed write closes the channel for good
//!
//! Nothing here returns an error to the caller; [`RelayReport`] is informational.

use std::panic::AssertUnwindSafe;

use futures::{FutureExt, StreamExt};
use serde_json::Value;
use session_sync_core::{Event, PromptRequest};
use session_sync_transport::{Envelope, EnvelopeSink, PROTOCOL_VERSION, protocol::now_millis};

use crate::provider::{ProviderError, UpdateProvider};

/// How a relayed stream finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// The underlying call resolved.
    Completed,
    /// The underlying call was rejected; an `error` record was sent.
    Failed(ProviderError),
    /// The channel stopped accepting writes before the call finished.
    ChannelClosed,
}

/// Summary of one relayed stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayReport {
    pub outcome: RelayOutcome,
    /// Records accepted by the channel, `stream.end` included.
    pub records_written: usize,
}

/// One stream's relay.
pub struct StreamingRelay<S> {
    sink: Option<S>,
    session_id: String,
    records_written: usize,
}

impl<S: EnvelopeSink> StreamingRelay<S> {
    /// Bind a relay to an open channel.
    #[must_use]
    pub fn new(sink: S, session_id: impl Into<String>) -> Self {
        Self {
            sink: Some(sink),
            session_id: session_id.into(),
            records_written: 0,
        }
    }

    /// Session this stream belongs to.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Whether the stream has ended (terminal record sent or channel failed).
    #[must_use]
    pub const fn is_ended(&self) -> bool {
        self.sink.is_none()
    }

    /// Records accepted by the channel so far.
    #[must_use]
    pub const fn records_written(&self) -> usize {
        self.records_written
    }

    /// Encode and emit one record. Returns `false` if nothing was written.
    ///
    /// `stream.end` cannot be written this way; use [`Self::end`].
    pub async fn write(&mut self, event_type: &str, data: Value) -> bool {
        if self.is_ended() {
            return false;
        }
        if event_type == "stream.end" {
            tracing::debug!(session_id = %self.session_id, "stream.end must go through end()");
            return false;
        }

        let envelope = Envelope {
            v: PROTOCOL_VERSION,
            event_type: event_type.to_string(),
            data,
            ts: now_millis(),
        };
        self.emit(&envelope).await
    }

    /// Emit a typed event.
    pub async fn write_event(&mut self, event: &Event) -> bool {
        match event.to_payload() {
            Ok(data) => self.write(event.event_type().as_str(), data).await,
            Err(e) => {
                tracing::warn!(
                    session_id = %self.session_id,
                    "Failed to encode {}: {e}",
                    event.event_type()
                );
                false
            }
        }
    }

    /// Emit `stream.end` and close the channel. Idempotent.
    pub async fn end(&mut self, reason: Option<String>) {
        if self.is_ended() {
            return;
        }
        let data = reason.map_or_else(
            || serde_json::json!({}),
            |r| serde_json::json!({ "reason": r }),
        );
        let envelope = Envelope {
            v: PROTOCOL_VERSION,
            event_type: "stream.end".to_string(),
            data,
            ts: now_millis(),
        };
        self.emit(&envelope).await;
        // Dropping the sink closes the channel.
        self.sink = None;
    }

    /// Report a provider fault in-band, then end the stream.
    pub async fn fail(&mut self, err: &ProviderError) {
        tracing::warn!(session_id = %self.session_id, "Provider call failed: {err}");
        let event = Event::error(err.name.clone(), err.message.clone());
        self.write_event(&event).await;
        self.end(Some("error".to_string())).await;
    }

    /// Drive the underlying call to completion, relaying every update.
    pub async fn run<P>(mut self, provider: &P, request: PromptRequest) -> RelayReport
    where
        P: UpdateProvider + ?Sized,
    {
        let outcome = self.pump(provider, request).await;
        // No-op when fail() already ended the stream.
        self.end(None).await;

        tracing::debug!(
            session_id = %self.session_id,
            records = self.records_written,
            ?outcome,
            "Relay finished"
        );
        RelayReport {
            outcome,
            records_written: self.records_written,
        }
    }

    async fn pump<P>(&mut self, provider: &P, request: PromptRequest) -> RelayOutcome
    where
        P: UpdateProvider + ?Sized,
    {
        let started = AssertUnwindSafe(provider.start(&self.session_id, request))
            .catch_unwind()
            .await;
        let mut updates = match started {
            Ok(Ok(updates)) => updates,
            Ok(Err(err)) => return self.failed(err).await,
            Err(panic) => return self.failed(ProviderError::panicked(panic.as_ref())).await,
        };

        loop {
            if self.is_ended() {
                return RelayOutcome::ChannelClosed;
            }
            let next = AssertUnwindSafe(updates.next()).catch_unwind().await;
            match next {
                Ok(None) => return RelayOutcome::Completed,
                Ok(Some(Ok(event))) => self.forward(&event).await,
                Ok(Some(Err(err))) => return self.failed(err).await,
                Err(panic) => return self.failed(ProviderError::panicked(panic.as_ref())).await,
            }
        }
    }

    async fn failed(&mut self, err: ProviderError) -> RelayOutcome {
        self.fail(&err).await;
        RelayOutcome::Failed(err)
    }

    async fn forward(&mut self, event: &Event) {
        if matches!(event, Event::StreamEnd(_)) {
            tracing::debug!(session_id = %self.session_id, "Dropping provider stream.end");
            return;
        }
        if let Some(other) = event.session_id() {
            if other != self.session_id {
                tracing::debug!(
                    session_id = %self.session_id,
                    other,
                    "Skipping {} for another session",
                    event.event_type()
                );
                return;
            }
        }
        self.write_event(event).await;
    }

    async fn emit(&mut self, envelope: &Envelope) -> bool {
        let record = match envelope.encode() {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(session_id = %self.session_id, "Failed to encode envelope: {e}");
                return false;
            }
        };
        let Some(sink) = self.sink.as_mut() else {
            return false;
        };
        match sink.send_record(record).await {
            Ok(()) => {
                self.records_written += 1;
                true
            }
            Err(e) => {
                tracing::warn!(
                    session_id = %self.session_id,
                    "Channel write failed, closing stream: {e}"
                );
                self.sink = None;
                false
            }
        }
    }
}

/// Open a stream: relay `request` for `session_id` from `provider` into `channel`.
pub async fn open<S, P>(
    channel: S,
    session_id: impl Into<String>,
    request: PromptRequest,
    provider: &P,
) -> RelayReport
where
    S: EnvelopeSink,
    P: UpdateProvider + ?Sized,
{
    StreamingRelay::new(channel, session_id)
        .run(provider, request)
        .await
}
