//! Client state configuration.
//!
//! All fields have defaults, so an empty JSON object is a valid config.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::error::ConfigError;
use crate::message::header::{DeliveryMode, DEFAULT_PRIORITY, MAX_PRIORITY};
use crate::state::session::AcknowledgeMode;

/// What `add_child` does when the child is already attached to the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateChildPolicy {
    /// Leave the tree as it is and log a warning.
    #[default]
    Warn,
    /// Fail with `StateError::DuplicateChild`.
    Reject,
}

/// Configuration for the client state layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientStateConfig {
    /// Handling of duplicate child insertion
    pub duplicate_child_policy: DuplicateChildPolicy,
    /// Acknowledge mode for sessions created from defaults
    pub default_acknowledge_mode: AcknowledgeMode,
    /// Cap on concurrently active local transactions (unbounded if absent)
    pub max_active_transactions: Option<usize>,
    /// Delivery mode new producers start with
    pub default_delivery_mode: DeliveryMode,
    /// Priority new producers start with (0-9)
    pub default_priority: u8,
    /// Time-to-live new producers start with, 0 meaning unlimited
    pub default_time_to_live_ms: u64,
}

impl Default for ClientStateConfig {
    fn default() -> Self {
        Self {
            duplicate_child_policy: DuplicateChildPolicy::Warn,
            default_acknowledge_mode: AcknowledgeMode::Auto,
            max_active_transactions: None,
            default_delivery_mode: DeliveryMode::Persistent,
            default_priority: DEFAULT_PRIORITY,
            default_time_to_live_ms: 0,
        }
    }
}

impl ClientStateConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading client state config");
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_priority > MAX_PRIORITY {
            return Err(ConfigError::Invalid {
                field: "default_priority",
                reason: format!("{} is outside 0..={MAX_PRIORITY}", self.default_priority),
            });
        }
        Ok(())
    }
}
