//! Typed payload bodies.
//!
//! [`Payload`] is the closed set of bodies this node knows how to
//! produce and consume. Each variant maps to exactly one
//! [`MessageType`] given the envelope's destination, and
//! [`Payload::decode`] is the inverse keyed by that type.

use driftmesh_types::{DriftError, MessageId, Result, StableId};
use serde::{Deserialize, Serialize};

use crate::envelope::{DestinationKind, MessageType, GROUP_PREFIX};

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatKind {
    #[default]
    Text,
    Image,
    Voice,
}

/// Local delivery state of a chat message. Not meaningful across the
/// wire; receivers overwrite it.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Sending,
    #[default]
    Sent,
    Delivered,
    Failed,
    QueuedDtn,
    ForwardingDtn,
}

/// A chat line, direct or group.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub text: String,
    /// Base64 attachment for image and voice messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default)]
    pub is_sent_by_me: bool,
    #[serde(default)]
    pub kind: ChatKind,
    #[serde(default)]
    pub status: MessageStatus,
}

impl ChatMessage {
    /// New outgoing text message authored locally.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.into(),
            data: None,
            is_sent_by_me: true,
            kind: ChatKind::Text,
            status: MessageStatus::Sending,
        }
    }
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

/// A group conversation. Its id doubles as the group destination.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub members: Vec<StableId>,
}

impl Channel {
    /// Creates a channel with a fresh group id and `creator` as the
    /// only member.
    pub fn create(name: impl Into<String>, is_public: bool, creator: StableId) -> Self {
        Self {
            id: format!("{GROUP_PREFIX}{}", uuid::Uuid::new_v4()),
            name: name.into(),
            description: String::new(),
            is_public,
            members: vec![creator],
        }
    }

    pub fn is_member(&self, id: &StableId) -> bool {
        self.members.contains(id)
    }

    /// Adds `id` unless already present. Returns whether it was added.
    pub fn add_member(&mut self, id: StableId) -> bool {
        if self.is_member(&id) {
            return false;
        }
        self.members.push(id);
        true
    }

    /// Union-merges `other` into `self`.
    ///
    /// Channels are merge-only: members are never removed and
    /// metadata fills in only where ours is empty.
    pub fn merge(&mut self, other: &Channel) {
        if self.description.is_empty() {
            self.description.clone_from(&other.description);
        }
        self.is_public |= other.is_public;
        for m in &other.members {
            self.add_member(m.clone());
        }
    }
}

// ---------------------------------------------------------------------------
// Handshake
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandshakePurpose {
    Discovery,
    FriendRequest,
    FriendAccept,
}

/// Identity announcement exchanged on connect and for friendship.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Handshake {
    pub stable_id: StableId,
    pub name: String,
    /// Base64 of the sender's public key.
    pub public_key: String,
    pub purpose: HandshakePurpose,
    /// Ids the sender holds. Only populated on discovery.
    #[serde(default)]
    pub summary_vector: Vec<MessageId>,
    #[serde(default)]
    pub public_channels: Vec<Channel>,
}

// ---------------------------------------------------------------------------
// Anti-entropy and invites
// ---------------------------------------------------------------------------

/// Pull request for envelopes the sender is missing.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct MessageRequest {
    pub message_ids: Vec<MessageId>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ChannelInvite {
    pub channel: Channel,
    pub inviter_name: String,
}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// Closed set of payload bodies this node produces and consumes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Payload {
    Chat(ChatMessage),
    Handshake(Handshake),
    MessageRequest(MessageRequest),
    ChannelInvite(ChannelInvite),
}

impl Payload {
    /// Picks the envelope type for this body sent to `destination`.
    pub fn message_type_for(&self, destination: &str) -> MessageType {
        match self {
            Self::Chat(_) => match DestinationKind::classify(destination) {
                DestinationKind::Group(_) => MessageType::GroupMessage,
                _ => MessageType::DirectMessage,
            },
            Self::Handshake(h) => match h.purpose {
                HandshakePurpose::Discovery => MessageType::DiscoveryHandshake,
                HandshakePurpose::FriendRequest => MessageType::FriendRequest,
                HandshakePurpose::FriendAccept => MessageType::FriendAccept,
            },
            Self::MessageRequest(_) => MessageType::MessageRequest,
            Self::ChannelInvite(_) => MessageType::ChannelInvite,
        }
    }

    /// Canonical JSON form stored in the envelope `payload` field
    /// (before any end-to-end sealing).
    pub fn to_json(&self) -> Result<String> {
        let json = match self {
            Self::Chat(m) => serde_json::to_string(m)?,
            Self::Handshake(h) => serde_json::to_string(h)?,
            Self::MessageRequest(r) => serde_json::to_string(r)?,
            Self::ChannelInvite(i) => serde_json::to_string(i)?,
        };
        Ok(json)
    }

    /// Parses a plaintext payload according to its envelope type.
    ///
    /// # Errors
    ///
    /// - [`DriftError::ProtocolError`] for types that carry no body
    ///   this node understands (announcements, profile updates,
    ///   unknown tags).
    /// - [`DriftError::InvalidEnvelope`] if the JSON does not match.
    pub fn decode(message_type: &MessageType, json: &str) -> Result<Self> {
        let payload = match message_type {
            MessageType::DirectMessage | MessageType::GroupMessage => {
                Self::Chat(serde_json::from_str(json)?)
            }
            MessageType::FriendRequest
            | MessageType::FriendAccept
            | MessageType::DiscoveryHandshake => Self::Handshake(serde_json::from_str(json)?),
            MessageType::MessageRequest => Self::MessageRequest(serde_json::from_str(json)?),
            MessageType::ChannelInvite => Self::ChannelInvite(serde_json::from_str(json)?),
            other => {
                return Err(DriftError::ProtocolError {
                    reason: format!("no payload body defined for {other}"),
                })
            }
        };
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handshake(purpose: HandshakePurpose) -> Handshake {
        Handshake {
            stable_id: StableId::new("alice"),
            name: "Alice".into(),
            public_key: "AAAA".into(),
            purpose,
            summary_vector: vec![MessageId::new("m1")],
            public_channels: vec![],
        }
    }

    #[test]
    fn chat_type_depends_on_destination() {
        let p = Payload::Chat(ChatMessage::text("hi"));
        assert_eq!(p.message_type_for("bob"), MessageType::DirectMessage);
        assert_eq!(p.message_type_for("group:trail"), MessageType::GroupMessage);
    }

    #[test]
    fn handshake_type_follows_purpose() {
        let cases = [
            (HandshakePurpose::Discovery, MessageType::DiscoveryHandshake),
            (HandshakePurpose::FriendRequest, MessageType::FriendRequest),
            (HandshakePurpose::FriendAccept, MessageType::FriendAccept),
        ];
        for (purpose, expected) in cases {
            let p = Payload::Handshake(handshake(purpose));
            assert_eq!(p.message_type_for("bob"), expected);
        }
    }

    #[test]
    fn decode_matches_encoded_handshake() -> Result<()> {
        let p = Payload::Handshake(handshake(HandshakePurpose::Discovery));
        let back = Payload::decode(&MessageType::DiscoveryHandshake, &p.to_json()?)?;
        assert_eq!(back, p);
        Ok(())
    }

    #[test]
    fn handshake_wire_names() -> Result<()> {
        let json = Payload::Handshake(handshake(HandshakePurpose::FriendAccept)).to_json()?;
        assert!(json.contains("\"purpose\":\"friend_accept\""));
        assert!(json.contains("\"summary_vector\":[\"m1\"]"));
        assert!(json.contains("\"public_channels\""));
        Ok(())
    }

    #[test]
    fn unhandled_types_refuse_to_decode() {
        assert!(Payload::decode(&MessageType::ProfileUpdate, "{}").is_err());
        assert!(Payload::decode(&MessageType::PublicChannelAnnouncement, "{}").is_err());
        assert!(Payload::decode(&MessageType::Other("x".into()), "{}").is_err());
    }

    #[test]
    fn mismatched_body_rejected() {
        assert!(Payload::decode(&MessageType::MessageRequest, r#"{"text":"hi"}"#).is_err());
    }

    #[test]
    fn chat_defaults_fill_missing_fields() -> Result<()> {
        let p = Payload::decode(&MessageType::DirectMessage, r#"{"id":"c1","text":"yo"}"#)?;
        match p {
            Payload::Chat(m) => {
                assert_eq!(m.kind, ChatKind::Text);
                assert!(!m.is_sent_by_me);
                assert!(m.data.is_none());
            }
            other => panic!("expected chat, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn channel_merge_is_union() {
        let mut ours = Channel::create("trail", false, StableId::new("a"));
        let mut theirs = ours.clone();
        theirs.members = vec![StableId::new("b"), StableId::new("a")];
        theirs.description = "north ridge".into();
        ours.merge(&theirs);
        assert_eq!(ours.members, vec![StableId::new("a"), StableId::new("b")]);
        assert_eq!(ours.description, "north ridge");
    }

    #[test]
    fn created_channel_is_group_addressed() {
        let ch = Channel::create("trail", true, StableId::new("a"));
        assert!(ch.id.starts_with(GROUP_PREFIX));
        assert!(ch.is_member(&StableId::new("a")));
    }
}
