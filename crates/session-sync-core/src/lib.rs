//! Core abstractions for keeping client state in sync with a session runtime.
//!
//! This crate provides the fundamental building blocks:
//! - `Message`, `Part`, `SessionInfo` - Domain types
//! - `Event` - Typed event catalog
//! - `locator` - Sorted-index helpers for id-ordered collections
//! - `PromptRequest` - User turn sent to the runtime
//! - `RuntimeClient` - Client-facing runtime calls

pub mod config;
pub mod event;
pub mod locator;
pub mod request;
pub mod traits;
pub mod types;

pub use config::SyncConfig;
pub use event::{ErrorInfo, Event, EventType};
pub use locator::{Keyed, Location, locate};
pub use request::{Attachment, PromptRequest};
pub use traits::{ByteStream, ClientError, RuntimeClient};
pub use types::{Message, MessageInfo, Part, Role, SessionInfo};
