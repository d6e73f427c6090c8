//! Connection slot for the runtime client.
//!
//! The sandbox lifecycle side owns the [`EndpointFeeder`] and hands a client
//! in only once the remote runtime is healthy. Engines hold the [`Endpoint`]
//! and wait on it; until a client is present they are "not connected".

use std::rc::Rc;

use session_sync_core::{ClientError, RuntimeClient};
use tokio::sync::watch;

/// Shared runtime client.
pub type SharedClient = Rc<dyn RuntimeClient>;

/// Read side of the connection slot.
#[derive(Clone)]
pub struct Endpoint {
    rx: watch::Receiver<Option<SharedClient>>,
}

/// Write side of the connection slot.
pub struct EndpointFeeder {
    tx: watch::Sender<Option<SharedClient>>,
}

/// Create an empty (not connected) slot.
#[must_use]
pub fn endpoint() -> (EndpointFeeder, Endpoint) {
    let (tx, rx) = watch::channel(None);
    (EndpointFeeder { tx }, Endpoint { rx })
}

impl EndpointFeeder {
    /// Make a client available.
    pub fn connect(&self, client: SharedClient) {
        self.tx.send_replace(Some(client));
    }

    /// Withdraw the client, e.g. when the sandbox goes away.
    pub fn disconnect(&self) {
        self.tx.send_replace(None);
    }
}

impl Endpoint {
    /// An endpoint that is connected from the start.
    #[must_use]
    pub fn connected_to(client: SharedClient) -> Self {
        let (_tx, rx) = watch::channel(Some(client));
        Self { rx }
    }

    /// The current client, without waiting.
    #[must_use]
    pub fn current(&self) -> Option<SharedClient> {
        self.rx.borrow().clone()
    }

    /// Whether a client is present.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// Wait until a client is present.
    ///
    /// # Errors
    /// Returns `NotConnected` if the feeder is gone and no client is present.
    pub async fn client(&self) -> Result<SharedClient, ClientError> {
        let mut rx = self.rx.clone();
        let slot = rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| ClientError::NotConnected)?;
        slot.clone().ok_or(ClientError::NotConnected)
    }
}
