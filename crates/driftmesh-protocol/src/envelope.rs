//! The envelope: unit of storage, routing and carriage.
//!
//! An [`Envelope`] is immutable once built. Relaying produces a copy
//! via [`Envelope::forwarded`] with one less hop; the stored original
//! is never touched.

use std::fmt;

use driftmesh_types::{now_millis, DriftError, MessageId, Result, StableId};
use serde::{Deserialize, Serialize};

/// Prefix marking a destination as a group (channel) id.
pub const GROUP_PREFIX: &str = "group:";

/// Destination that every node treats as addressed to itself.
pub const BROADCAST_DESTINATION: &str = "*broadcast*";

// ---------------------------------------------------------------------------
// MessageType
// ---------------------------------------------------------------------------

/// Type tag carried by every envelope.
///
/// Tags this node does not know are kept verbatim in
/// [`MessageType::Other`] so the envelope still parses, gets stored
/// and keeps propagating; only local processing skips it.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageType {
    DirectMessage,
    GroupMessage,
    FriendRequest,
    FriendAccept,
    ChannelInvite,
    MessageRequest,
    DiscoveryHandshake,
    PublicChannelAnnouncement,
    ProfileUpdate,
    Other(String),
}

impl MessageType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::DirectMessage => "direct_message",
            Self::GroupMessage => "group_message",
            Self::FriendRequest => "friend_request",
            Self::FriendAccept => "friend_accept",
            Self::ChannelInvite => "channel_invite",
            Self::MessageRequest => "message_request",
            Self::DiscoveryHandshake => "discovery_handshake",
            Self::PublicChannelAnnouncement => "public_channel_announcement",
            Self::ProfileUpdate => "profile_update",
            Self::Other(tag) => tag,
        }
    }

    /// Types whose payload is sealed end-to-end for a single identity.
    pub fn requires_confidentiality(&self) -> bool {
        matches!(
            self,
            Self::DirectMessage | Self::FriendRequest | Self::FriendAccept | Self::ChannelInvite
        )
    }
}

impl From<String> for MessageType {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "direct_message" => Self::DirectMessage,
            "group_message" => Self::GroupMessage,
            "friend_request" => Self::FriendRequest,
            "friend_accept" => Self::FriendAccept,
            "channel_invite" => Self::ChannelInvite,
            "message_request" => Self::MessageRequest,
            "discovery_handshake" => Self::DiscoveryHandshake,
            "public_channel_announcement" => Self::PublicChannelAnnouncement,
            "profile_update" => Self::ProfileUpdate,
            _ => Self::Other(tag),
        }
    }
}

impl From<MessageType> for String {
    fn from(t: MessageType) -> Self {
        match t {
            MessageType::Other(tag) => tag,
            known => known.as_str().to_owned(),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// DestinationKind
// ---------------------------------------------------------------------------

/// How a destination string is to be interpreted.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DestinationKind {
    /// A single device's stable id.
    Identity(StableId),
    /// A group id (still carrying its prefix).
    Group(String),
    /// Everyone.
    Broadcast,
}

impl DestinationKind {
    pub fn classify(destination: &str) -> Self {
        if destination == BROADCAST_DESTINATION {
            Self::Broadcast
        } else if destination.starts_with(GROUP_PREFIX) {
            Self::Group(destination.to_owned())
        } else {
            Self::Identity(StableId::new(destination))
        }
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// A DTN envelope.
///
/// `ttl` is an absolute expiry instant and `timestamp` the creation
/// instant, both in milliseconds since the Unix epoch. `hop_count` is
/// the remaining relay budget.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: MessageId,
    pub source: StableId,
    pub destination: String,
    pub payload: String,
    pub ttl: i64,
    pub hop_count: u32,
    pub timestamp: i64,
    pub message_type: MessageType,
}

impl Envelope {
    /// Builds a fresh envelope stamped with the current time.
    pub fn originate(
        source: StableId,
        destination: impl Into<String>,
        message_type: MessageType,
        payload: String,
        ttl_window_ms: i64,
        hop_budget: u32,
    ) -> Self {
        let timestamp = now_millis();
        Self {
            id: MessageId::generate(),
            source,
            destination: destination.into(),
            payload,
            ttl: timestamp.saturating_add(ttl_window_ms),
            hop_count: hop_budget,
            timestamp,
            message_type,
        }
    }

    /// Copy with one hop spent, or `None` once the budget is gone.
    pub fn forwarded(&self) -> Option<Self> {
        let hop_count = self.hop_count.checked_sub(1)?;
        Some(Self {
            hop_count,
            ..self.clone()
        })
    }

    pub fn destination_kind(&self) -> DestinationKind {
        DestinationKind::classify(&self.destination)
    }

    pub fn is_expired(&self, now_millis: i64) -> bool {
        self.ttl < now_millis
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parses and structurally checks an envelope.
    ///
    /// # Errors
    ///
    /// [`DriftError::InvalidEnvelope`] on malformed JSON, an empty id
    /// or an empty source.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let env: Self = serde_json::from_slice(bytes)?;
        if env.id.as_str().is_empty() {
            return Err(DriftError::InvalidEnvelope {
                reason: "empty id".into(),
            });
        }
        if env.source.as_str().is_empty() {
            return Err(DriftError::InvalidEnvelope {
                reason: format!("envelope {} has empty source", env.id),
            });
        }
        Ok(env)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(hops: u32) -> Envelope {
        Envelope::originate(
            StableId::new("alice"),
            "bob",
            MessageType::DirectMessage,
            "{}".into(),
            60_000,
            hops,
        )
    }

    #[test]
    fn forwarding_spends_one_hop_and_keeps_original() {
        let env = sample(3);
        let fwd = env.forwarded();
        assert_eq!(fwd.as_ref().map(|e| e.hop_count), Some(2));
        assert_eq!(env.hop_count, 3);
        assert_eq!(fwd.map(|e| e.id), Some(env.id));
    }

    #[test]
    fn exhausted_envelope_has_no_forward() {
        assert!(sample(0).forwarded().is_none());
    }

    #[test]
    fn ttl_is_absolute() {
        let env = sample(1);
        assert_eq!(env.ttl - env.timestamp, 60_000);
        assert!(!env.is_expired(env.timestamp));
        assert!(env.is_expired(env.ttl + 1));
    }

    #[test]
    fn wire_field_names() -> Result<()> {
        let env = sample(5);
        let json: serde_json::Value = serde_json::from_str(&env.to_json()?)?;
        for field in [
            "id",
            "source",
            "destination",
            "payload",
            "ttl",
            "hop_count",
            "timestamp",
            "message_type",
        ] {
            assert!(json.get(field).is_some(), "missing {field}");
        }
        assert_eq!(json["message_type"], "direct_message");
        Ok(())
    }

    #[test]
    fn unknown_type_survives_parsing() -> Result<()> {
        let raw = r#"{"id":"m1","source":"a","destination":"b","payload":"","ttl":1,
            "hop_count":2,"timestamp":0,"message_type":"telemetry_v9"}"#;
        let env = Envelope::from_json(raw.as_bytes())?;
        assert_eq!(env.message_type, MessageType::Other("telemetry_v9".into()));
        assert!(env.to_json()?.contains("\"telemetry_v9\""));
        Ok(())
    }

    #[test]
    fn negative_hop_count_rejected() {
        let raw = r#"{"id":"m1","source":"a","destination":"b","payload":"","ttl":1,
            "hop_count":-1,"timestamp":0,"message_type":"group_message"}"#;
        assert!(Envelope::from_json(raw.as_bytes()).is_err());
    }

    #[test]
    fn empty_source_rejected() {
        let raw = r#"{"id":"m1","source":"","destination":"b","payload":"","ttl":1,
            "hop_count":1,"timestamp":0,"message_type":"group_message"}"#;
        assert!(Envelope::from_json(raw.as_bytes()).is_err());
    }

    #[test]
    fn destination_classification() {
        assert_eq!(
            DestinationKind::classify(BROADCAST_DESTINATION),
            DestinationKind::Broadcast
        );
        assert_eq!(
            DestinationKind::classify("group:hikers"),
            DestinationKind::Group("group:hikers".into())
        );
        assert_eq!(
            DestinationKind::classify("carol"),
            DestinationKind::Identity(StableId::new("carol"))
        );
    }

    #[test]
    fn confidentiality_classes() {
        assert!(MessageType::DirectMessage.requires_confidentiality());
        assert!(MessageType::ChannelInvite.requires_confidentiality());
        assert!(!MessageType::GroupMessage.requires_confidentiality());
        assert!(!MessageType::DiscoveryHandshake.requires_confidentiality());
        assert!(!MessageType::MessageRequest.requires_confidentiality());
    }
}
