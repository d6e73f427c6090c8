//! Outgoing channel abstraction used by the relay.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Sink error.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Channel closed")]
    Closed,
    #[error("Write failed: {0}")]
    Write(String),
}

/// Destination for encoded records of one stream.
///
/// A failed write is final: the relay never writes to the same sink again.
#[async_trait]
pub trait EnvelopeSink: Send {
    /// Write one record.
    async fn send_record(&mut self, record: String) -> Result<(), SinkError>;
}

#[async_trait]
impl EnvelopeSink for mpsc::Sender<String> {
    async fn send_record(&mut self, record: String) -> Result<(), SinkError> {
        self.send(record).await.map_err(|_| SinkError::Closed)
    }
}

#[async_trait]
impl EnvelopeSink for mpsc::UnboundedSender<String> {
    async fn send_record(&mut self, record: String) -> Result<(), SinkError> {
        self.send(record).map_err(|_| SinkError::Closed)
    }
}
