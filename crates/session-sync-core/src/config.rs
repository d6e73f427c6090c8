//! Runtime configuration.

use serde::{Deserialize, Serialize};

/// Default upper bound for a single wire record (8 MiB).
pub const DEFAULT_MAX_RECORD_BYTES: usize = 8 * 1024 * 1024;

/// Environment variable overriding [`SyncConfig::max_record_bytes`].
pub const MAX_RECORD_BYTES_ENV: &str = "SESSION_SYNC_MAX_RECORD_BYTES";

/// Tunables shared by the stream reader and the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Records longer than this are discarded and reported as decode faults.
    pub max_record_bytes: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_record_bytes: DEFAULT_MAX_RECORD_BYTES,
        }
    }
}

impl SyncConfig {
    /// Defaults overlaid with values from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Overlay values from `lookup`. Unparseable values are ignored.
    #[must_use]
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(raw) = lookup(MAX_RECORD_BYTES_ENV) {
            match raw.trim().parse::<usize>() {
                Ok(value) if value > 0 => self.max_record_bytes = value,
                _ => tracing::warn!("Ignoring invalid {MAX_RECORD_BYTES_ENV}={raw:?}"),
            }
        }
        self
    }
}
