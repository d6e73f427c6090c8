//! Producer-side streaming relay.
//!
//! Provides:
//! - `StreamingRelay` - Bridges an underlying update stream onto the wire
//! - `UpdateProvider` - Trait the underlying session SDK is adapted to

pub mod provider;
pub mod relay;

pub use provider::{ProviderError, UpdateProvider, UpdateStream};
pub use relay::{RelayOutcome, RelayReport, StreamingRelay, open};
