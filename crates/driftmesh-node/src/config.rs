//! Node runtime configuration.

use serde::{Deserialize, Serialize};

use driftmesh_types::{DriftError, Result};

/// Runtime parameters of a [`Node`](crate::node::Node). DTN routing
/// parameters live separately in
/// [`DtnSettings`](driftmesh_types::config::DtnSettings) so they can be
/// hot-reloaded.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Name shown to peers in handshakes and link advertisements.
    pub display_name: String,

    /// Interval between expiry sweeps of the message store.
    pub prune_interval_secs: u64,

    /// Capacity of the command channel.
    pub command_channel_size: usize,

    /// Capacity of the node event channel towards consumers.
    pub event_channel_size: usize,

    /// Capacity of the inbound link event channel.
    pub link_channel_size: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            display_name: "driftmesh".into(),
            prune_interval_secs: 3600,
            command_channel_size: 256,
            event_channel_size: 1024,
            link_channel_size: 1024,
        }
    }
}

impl NodeConfig {
    /// Defaults with the given display name.
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.display_name.trim().is_empty() {
            return Err(DriftError::ConfigError {
                reason: "display_name must not be empty".into(),
            });
        }
        if self.display_name.contains('|') {
            return Err(DriftError::ConfigError {
                reason: "display_name must not contain '|'".into(),
            });
        }
        if self.prune_interval_secs == 0 {
            return Err(DriftError::ConfigError {
                reason: "prune_interval_secs must be greater than 0".into(),
            });
        }
        if self.command_channel_size == 0
            || self.event_channel_size == 0
            || self.link_channel_size == 0
        {
            return Err(DriftError::ConfigError {
                reason: "channel sizes must be greater than 0".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(NodeConfig::default().validate().is_ok());
    }

    #[test]
    fn default_prune_interval_is_hourly() {
        assert_eq!(NodeConfig::default().prune_interval_secs, 3600);
    }

    #[test]
    fn separator_in_name_rejected() {
        let c = NodeConfig {
            display_name: "a|b".into(),
            ..NodeConfig::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn zero_prune_interval_rejected() {
        let c = NodeConfig {
            prune_interval_secs: 0,
            ..NodeConfig::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn zero_channel_size_rejected() {
        let c = NodeConfig {
            event_channel_size: 0,
            ..NodeConfig::default()
        };
        assert!(c.validate().is_err());
    }
}
