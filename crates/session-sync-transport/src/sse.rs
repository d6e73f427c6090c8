//! Server-Sent Events transport for relay streams.

use std::convert::Infallible;

use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Turn the receiving half of a relay channel into an SSE response.
///
/// Each record becomes one `data:` event; the response ends when the relay
/// drops its sender after `stream.end`.
///
/// # Example
/// ```ignore
/// let (tx, rx) = mpsc::channel(64);
/// tokio::spawn(relay.open(tx, session_id, request));
/// sse_response(rx)
/// ```
#[must_use]
pub fn sse_response(
    rx: mpsc::Receiver<String>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let events =
        ReceiverStream::new(rx).map(|record| Ok(SseEvent::default().data(record)));
    Sse::new(events).keep_alive(KeepAlive::default())
}
