//! Configuration for the outbox.
//!
//! Configuration can be built in code, deserialized (JSON, or any serde
//! format), or loaded from environment variables:
//!
//! | variable | meaning | default |
//! |----------|---------|---------|
//! | `OUTBOX_SYNCED_KINDS` | comma-separated whitelist | required |
//! | `OUTBOX_BATCH_SIZE` | entries per drained batch | `50` |
//! | `OUTBOX_DRAIN_INTERVAL_MS` | delay between drain cycles | `5000` |

use crate::{error::Result, schema::SyncedKinds, Error};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

pub const DEFAULT_BATCH_SIZE: usize = 50;
pub const DEFAULT_DRAIN_INTERVAL_MS: u64 = 5_000;

/// Outbox configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OutboxConfig {
    /// Record kinds whose mutations are captured
    pub synced_kinds: SyncedKinds,
    /// Maximum entries pushed per batch
    pub batch_size: usize,
    /// Delay between drain cycles, in milliseconds
    pub drain_interval_ms: u64,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            synced_kinds: SyncedKinds::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            drain_interval_ms: DEFAULT_DRAIN_INTERVAL_MS,
        }
    }
}

impl OutboxConfig {
    /// Configuration with default drain settings.
    pub fn new(synced_kinds: SyncedKinds) -> Self {
        Self {
            synced_kinds,
            ..Default::default()
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> std::result::Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> std::result::Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let synced_kinds: SyncedKinds = lookup("OUTBOX_SYNCED_KINDS")
            .ok_or(ConfigError::MissingSyncedKinds)?
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .collect();
        if synced_kinds.is_empty() {
            return Err(ConfigError::MissingSyncedKinds);
        }

        let batch_size = match lookup("OUTBOX_BATCH_SIZE") {
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .map_err(|_| ConfigError::InvalidBatchSize(raw))?,
            None => DEFAULT_BATCH_SIZE,
        };

        let drain_interval_ms = match lookup("OUTBOX_DRAIN_INTERVAL_MS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidDrainInterval(raw))?,
            None => DEFAULT_DRAIN_INTERVAL_MS,
        };

        Ok(Self {
            synced_kinds,
            batch_size,
            drain_interval_ms,
        })
    }

    /// Check the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        if self.synced_kinds.is_empty() {
            return Err(Error::Config("no synchronized kinds configured".into()));
        }
        self.synced_kinds.validate()?;
        if self.batch_size == 0 {
            return Err(Error::Config("batch size must be positive".into()));
        }
        if self.drain_interval_ms == 0 {
            return Err(Error::Config("drain interval must be positive".into()));
        }
        Ok(())
    }

    pub fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.drain_interval_ms)
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("OUTBOX_SYNCED_KINDS environment variable is required")]
    MissingSyncedKinds,

    #[error("Invalid OUTBOX_BATCH_SIZE value: {0}")]
    InvalidBatchSize(String),

    #[error("Invalid OUTBOX_DRAIN_INTERVAL_MS value: {0}")]
    InvalidDrainInterval(String),
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e.to_string())
    }
}
