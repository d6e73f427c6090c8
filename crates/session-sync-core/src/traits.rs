//! Collaborator traits for the client side.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::LocalBoxStream;
use thiserror::Error;

use crate::{Message, PromptRequest, SessionInfo};

/// Raw chunks of an event stream, as they come off the network.
pub type ByteStream = LocalBoxStream<'static, Result<Bytes, std::io::Error>>;

/// Client error.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Not connected to a session runtime")]
    NotConnected,
    #[error("Request failed: {0}")]
    Request(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid response: {0}")]
    InvalidResponse(#[from] serde_json::Error),
}

impl ClientError {
    /// Short error class, used as the `name` of surfaced errors.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::NotConnected => "NotConnectedError",
            Self::Request(_) => "RequestError",
            Self::Io(_) => "TransportError",
            Self::InvalidResponse(_) => "DecodeError",
        }
    }
}

/// Client-facing calls of a session runtime.
///
/// Implementations wrap whatever endpoint the sandbox exposes. Everything on
/// the consumer side runs on one thread, so the trait is not `Send`.
#[async_trait(?Send)]
pub trait RuntimeClient {
    /// Send a prompt and open the stream of envelopes it produces.
    async fn prompt(&self, session_id: &str, request: PromptRequest)
    -> Result<ByteStream, ClientError>;

    /// Load every message of a session.
    async fn messages(&self, session_id: &str) -> Result<Vec<Message>, ClientError>;

    /// Load every session.
    async fn sessions(&self) -> Result<Vec<SessionInfo>, ClientError>;
}
