//! The underlying session SDK, as seen by the relay.

use std::any::Any;

use async_trait::async_trait;
use futures::stream::BoxStream;
use session_sync_core::{ErrorInfo, Event, PromptRequest};
use thiserror::Error;

/// Fault raised by the underlying SDK call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{name}: {message}")]
pub struct ProviderError {
    /// Error class (`ProviderError`, `TimeoutError`, ...).
    pub name: String,
    /// Human-readable message.
    pub message: String,
}

impl ProviderError {
    /// Create a provider error with an explicit class name.
    #[must_use]
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Wrap any error under the generic `ProviderError` class.
    #[must_use]
    pub fn other(err: &(dyn std::error::Error + 'static)) -> Self {
        Self::new("ProviderError", err.to_string())
    }

    /// Convert a caught panic payload.
    #[must_use]
    pub fn panicked(payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(ToString::to_string)
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "provider panicked".to_string());
        Self::new("PanicError", message)
    }
}

impl From<ProviderError> for ErrorInfo {
    fn from(err: ProviderError) -> Self {
        Self::new(err.name, err.message)
    }
}

/// Updates produced by one underlying call.
///
/// Running out of items is the call's successful resolution; an `Err` item
/// is its rejection and nothing after it is read.
pub type UpdateStream = BoxStream<'static, Result<Event, ProviderError>>;

/// Source of truth for a relayed stream.
#[async_trait]
pub trait UpdateProvider: Send + Sync {
    /// Start the underlying call for `session_id`.
    async fn start(
        &self,
        session_id: &str,
        request: PromptRequest,
    ) -> Result<UpdateStream, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payloads_keep_their_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(ProviderError::panicked(payload.as_ref()).message, "boom");

        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(ProviderError::panicked(payload.as_ref()).message, "bang");

        let payload: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(
            ProviderError::panicked(payload.as_ref()).message,
            "provider panicked"
        );
    }

    #[test]
    fn converts_to_error_payload() {
        let info: ErrorInfo = ProviderError::new("TimeoutError", "too slow").into();
        assert_eq!(info, ErrorInfo::new("TimeoutError", "too slow"));
    }
}
