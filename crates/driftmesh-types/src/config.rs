//! DTN settings with sensible defaults and hot reload.
//!
//! The routing engine reads the TTL window and hop budget at the
//! moment it originates an envelope, and the message store reads the
//! storage limit at the moment it inserts one. Both go through a
//! [`SettingsHandle`] so a new value takes effect on the next read.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::{DriftError, Result};

/// One day, in milliseconds.
pub const DEFAULT_TTL_MS: i64 = 24 * 60 * 60 * 1000;

/// Default relay budget for freshly originated envelopes.
pub const DEFAULT_HOP_BUDGET: u32 = 15;

/// Default soft bound on the number of stored envelopes.
pub const DEFAULT_STORAGE_LIMIT: usize = 100;

/// Tunable parameters of the DTN layer.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DtnSettings {
    /// Lifetime of an envelope after origination, in milliseconds.
    /// The envelope's absolute `ttl` is `timestamp + ttl_ms`.
    pub ttl_ms: i64,

    /// Initial `hop_count` of an originated envelope.
    pub hop_budget: u32,

    /// Number of envelopes the store holds before it starts evicting
    /// the oldest one on insert.
    pub storage_limit: usize,
}

impl Default for DtnSettings {
    fn default() -> Self {
        Self {
            ttl_ms: DEFAULT_TTL_MS,
            hop_budget: DEFAULT_HOP_BUDGET,
            storage_limit: DEFAULT_STORAGE_LIMIT,
        }
    }
}

impl DtnSettings {
    /// Validates all configuration values.
    ///
    /// # Errors
    ///
    /// [`DriftError::ConfigError`] if any value is outside its range.
    pub fn validate(&self) -> Result<()> {
        if self.ttl_ms <= 0 {
            return Err(DriftError::ConfigError {
                reason: "ttl_ms must be greater than 0".into(),
            });
        }

        if self.hop_budget == 0 {
            return Err(DriftError::ConfigError {
                reason: "hop_budget must be at least 1".into(),
            });
        }

        if self.storage_limit == 0 {
            return Err(DriftError::ConfigError {
                reason: "storage_limit must be at least 1".into(),
            });
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SettingsHandle
// ---------------------------------------------------------------------------

/// Shared, hot-reloadable view of [`DtnSettings`].
///
/// Cloning the handle shares the same underlying value. Updates
/// replace the whole struct; readers always see a consistent
/// snapshot.
#[derive(Clone, Debug, Default)]
pub struct SettingsHandle {
    inner: Arc<RwLock<DtnSettings>>,
}

impl SettingsHandle {
    /// Creates a handle after validating `settings`.
    pub fn new(settings: DtnSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            inner: Arc::new(RwLock::new(settings)),
        })
    }

    /// Returns a copy of the current settings.
    ///
    /// A poisoned lock still holds the last fully written value, so
    /// it is read through rather than reported.
    pub fn snapshot(&self) -> DtnSettings {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Replaces the settings with `settings` once it validates.
    ///
    /// # Errors
    ///
    /// - [`DriftError::ConfigError`] if `settings` is invalid; the
    ///   previous value stays in effect.
    /// - [`DriftError::StorageError`] if the lock is poisoned.
    pub fn replace(&self, settings: DtnSettings) -> Result<()> {
        settings.validate()?;
        let mut guard = self.inner.write().map_err(|_| DriftError::StorageError {
            reason: "settings lock poisoned".into(),
        })?;
        *guard = settings;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        assert!(DtnSettings::default().validate().is_ok());
    }

    #[test]
    fn default_values() {
        let s = DtnSettings::default();
        assert_eq!(s.ttl_ms, 86_400_000);
        assert_eq!(s.hop_budget, 15);
        assert_eq!(s.storage_limit, 100);
    }

    #[test]
    fn zero_ttl_rejected() {
        let s = DtnSettings {
            ttl_ms: 0,
            ..DtnSettings::default()
        };
        assert!(s.validate().is_err());
    }

    #[test]
    fn zero_hop_budget_rejected() {
        let s = DtnSettings {
            hop_budget: 0,
            ..DtnSettings::default()
        };
        assert!(s.validate().is_err());
    }

    #[test]
    fn zero_storage_limit_rejected() {
        let s = DtnSettings {
            storage_limit: 0,
            ..DtnSettings::default()
        };
        assert!(s.validate().is_err());
    }

    #[test]
    fn partial_json_fills_defaults() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let s: DtnSettings = serde_json::from_str(r#"{"hop_budget": 3}"#)?;
        assert_eq!(s.hop_budget, 3);
        assert_eq!(s.storage_limit, DEFAULT_STORAGE_LIMIT);
        assert_eq!(s.ttl_ms, DEFAULT_TTL_MS);
        Ok(())
    }

    #[test]
    fn handle_replace_is_visible_to_clones() -> Result<()> {
        let handle = SettingsHandle::new(DtnSettings::default())?;
        let reader = handle.clone();
        handle.replace(DtnSettings {
            hop_budget: 4,
            ..DtnSettings::default()
        })?;
        assert_eq!(reader.snapshot().hop_budget, 4);
        Ok(())
    }

    #[test]
    fn handle_rejects_invalid_replacement() -> Result<()> {
        let handle = SettingsHandle::new(DtnSettings::default())?;
        let bad = DtnSettings {
            storage_limit: 0,
            ..DtnSettings::default()
        };
        assert!(handle.replace(bad).is_err());
        assert_eq!(handle.snapshot().storage_limit, DEFAULT_STORAGE_LIMIT);
        Ok(())
    }
}
