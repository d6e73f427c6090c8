//! Consumer-side session sync.
//!
//! Provides:
//! - `EventBus` - Typed publish/subscribe with per-handler fault isolation
//! - `read_stream` - Feeds a prompt stream into the bus in wire order
//! - `MessageEngine` - Per-session message and part reconciliation
//! - `SessionEngine` - Global session list with open/active projections
//! - `EngineRegistry` - Message engines keyed by session id
//! - `SyncManager` - Keeps the session list and the engine registry in step
//! - `Endpoint` - Slot the runtime client is handed through once reachable
//!
//! Everything here is single-threaded; run it on a current-thread runtime
//! or inside a `LocalSet`.

pub mod bus;
pub mod endpoint;
pub mod manager;
pub mod messages;
pub mod reader;
pub mod registry;
pub mod sessions;

pub use bus::{BusEvent, EventBus, HandlerError, PublishReport, Subscription, SubscriptionGuard};
pub use endpoint::{Endpoint, EndpointFeeder, SharedClient, endpoint};
pub use manager::SyncManager;
pub use messages::{Applied, MessageEngine, MessageState};
pub use reader::{ReadOutcome, read_stream};
pub use registry::EngineRegistry;
pub use sessions::{LOCAL_ID_PREFIX, SessionEngine, SessionState};
