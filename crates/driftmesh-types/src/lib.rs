//! Core shared types for the driftmesh delay-tolerant routing engine.
//!
//! Identifiers, the workspace error type and the DTN settings live
//! here so every other crate agrees on them.

pub mod config;

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// MessageId
// ---------------------------------------------------------------------------

/// Globally unique envelope identifier.
///
/// Assigned once at origination (random UUID v4) and never changed
/// while the envelope is relayed. It is the only de-duplication key
/// in the network.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Generates a fresh random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Wraps an existing identifier string without validation.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for MessageId {
    type Err = DriftError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(DriftError::InvalidEnvelope {
                reason: "message id must not be empty".into(),
            });
        }
        Ok(Self(s.to_owned()))
    }
}

// ---------------------------------------------------------------------------
// StableId
// ---------------------------------------------------------------------------

/// Persistent identity of a device, independent of its transport
/// endpoint.
///
/// Ordering is plain lexicographic string ordering; connection
/// arbitration depends on it.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StableId(String);

impl StableId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a random stable id for a freshly provisioned device.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for StableId {
    type Err = DriftError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(DriftError::ProtocolError {
                reason: "stable id must not be empty".into(),
            });
        }
        Ok(Self(s.to_owned()))
    }
}

// ---------------------------------------------------------------------------
// EndpointId
// ---------------------------------------------------------------------------

/// Transient transport-level address of a link peer.
///
/// Assigned by the radio layer; changes between sessions and carries
/// no identity on its own.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointId(String);

impl EndpointId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// Current wall-clock time as milliseconds since the Unix epoch.
///
/// Envelope `timestamp` and `ttl` are both expressed in this unit.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

// ---------------------------------------------------------------------------
// DriftError
// ---------------------------------------------------------------------------

/// Unified error type for the driftmesh workspace.
///
/// Every variant carries a human-readable `reason`. None of them is
/// fatal to the routing engine: callers abandon the single envelope
/// being handled and keep running.
#[derive(Debug, Error)]
pub enum DriftError {
    /// Envelope failed to parse or violates a structural invariant.
    #[error("invalid envelope: {reason}")]
    InvalidEnvelope {
        /// Description of the problem.
        reason: String,
    },

    /// Encryption, decryption or key handling failed.
    #[error("crypto error: {reason}")]
    CryptoError {
        /// Description of the problem.
        reason: String,
    },

    /// Message store or collaborator persistence failed.
    #[error("storage error: {reason}")]
    StorageError {
        /// Description of the problem.
        reason: String,
    },

    /// The link layer refused or lost an outbound frame.
    #[error("transport error: {reason}")]
    TransportError {
        /// Description of the problem.
        reason: String,
    },

    /// Payload did not match what its message type requires.
    #[error("protocol error: {reason}")]
    ProtocolError {
        /// Description of the problem.
        reason: String,
    },

    /// Configuration value out of range.
    #[error("config error: {reason}")]
    ConfigError {
        /// Description of the problem.
        reason: String,
    },

    /// Bytes arrived from an endpoint with no connection record.
    #[error("unknown peer: {reason}")]
    UnknownPeer {
        /// Description of the problem.
        reason: String,
    },

    /// No public key is known for the peer or recipient.
    #[error("missing key: {reason}")]
    MissingKey {
        /// Description of the problem.
        reason: String,
    },
}

impl From<serde_json::Error> for DriftError {
    fn from(e: serde_json::Error) -> Self {
        Self::InvalidEnvelope {
            reason: format!("json: {e}"),
        }
    }
}

/// Convenience result type using [`DriftError`].
pub type Result<T> = std::result::Result<T, DriftError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_message_ids_are_unique() {
        let a = MessageId::generate();
        let b = MessageId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 36);
    }

    #[test]
    fn empty_message_id_rejected() {
        assert!("".parse::<MessageId>().is_err());
    }

    #[test]
    fn stable_id_serializes_as_plain_string() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let id = StableId::new("alice");
        let json = serde_json::to_string(&id)?;
        assert_eq!(json, "\"alice\"");
        let back: StableId = serde_json::from_str(&json)?;
        assert_eq!(back, id);
        Ok(())
    }

    #[test]
    fn stable_id_orders_lexicographically() {
        assert!(StableId::new("abc") < StableId::new("abd"));
        assert!(StableId::new("B") < StableId::new("a"));
    }

    #[test]
    fn error_display_includes_reason() {
        let e = DriftError::MissingKey {
            reason: "no key for bob".into(),
        };
        assert_eq!(e.to_string(), "missing key: no key for bob");
    }

    #[test]
    fn json_errors_become_invalid_envelope() {
        let err = serde_json::from_str::<StableId>("{").map_err(DriftError::from);
        assert!(matches!(err, Err(DriftError::InvalidEnvelope { .. })));
    }
}
