//! Origination and the user-facing send operations.
//!
//! # Steps (originate)
//!
//! 1. Pick the [`MessageType`] from the payload and destination.
//! 2. Serialize the payload to its canonical JSON.
//! 3. For single-identity types, seal the JSON end-to-end with the
//!    explicit key or the recipient's contact key. With no key the
//!    payload goes out as plaintext and a warning is logged.
//! 4. Build the envelope from the current settings snapshot.
//! 5. Store it; the originator is the first holder.
//! 6. Route it with no sender, so every neighbor is eligible.
//!
//! # Errors
//!
//! Serialization, sealing and storage errors abort the send. Route
//! failures never do: each neighbor send is logged and skipped.

use driftmesh_protocol::e2e::{encode_public_key, seal_payload};
use driftmesh_protocol::{
    Channel, ChannelInvite, ChatMessage, DestinationKind, Envelope, Handshake, HandshakePurpose,
    MessageStatus, Payload,
};
use driftmesh_types::{DriftError, Result, StableId};

use crate::collaborators::{Contact, ContactStatus};
use crate::engine::{RouteOutcome, RoutingEngine};

impl RoutingEngine {
    /// Creates, stores and routes a new envelope carrying `payload`.
    pub fn originate(
        &self,
        destination: &str,
        payload: &Payload,
        explicit_key: Option<&[u8]>,
    ) -> Result<(Envelope, RouteOutcome)> {
        let message_type = payload.message_type_for(destination);
        let plaintext = payload.to_json()?;

        let body = if message_type.requires_confidentiality() {
            let key = match explicit_key {
                Some(k) => Some(k.to_vec()),
                None => self.recipient_key(destination)?,
            };
            match key {
                Some(key) => seal_payload(self.crypto.as_ref(), &plaintext, &key)?,
                None => {
                    tracing::warn!(
                        %destination,
                        %message_type,
                        "no recipient key, sending payload without end-to-end encryption"
                    );
                    plaintext
                }
            }
        } else {
            plaintext
        };

        let settings = self.settings.snapshot();
        let envelope = Envelope::originate(
            self.local_id().clone(),
            destination,
            message_type,
            body,
            settings.ttl_ms,
            settings.hop_budget,
        );
        self.store.add(&envelope)?;

        let outcome = self.route(&envelope, None);
        tracing::info!(
            message_id = %envelope.id,
            message_type = %envelope.message_type,
            %destination,
            hop_count = envelope.hop_count,
            "originated envelope"
        );
        Ok((envelope, outcome))
    }

    fn recipient_key(&self, destination: &str) -> Result<Option<Vec<u8>>> {
        match DestinationKind::classify(destination) {
            DestinationKind::Identity(id) => self.contact_key(&id),
            _ => Ok(None),
        }
    }

    fn own_handshake(&self, purpose: HandshakePurpose) -> Handshake {
        Handshake {
            stable_id: self.local_id().clone(),
            name: self.identity.name.clone(),
            public_key: encode_public_key(&self.crypto.my_public_key()),
            purpose,
            summary_vector: Vec::new(),
            public_channels: Vec::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Chat
    // -----------------------------------------------------------------------

    /// Sends a text message to a stable id or a group, and logs it in
    /// the local conversation as self-authored.
    ///
    /// The logged status is `Sent` when the destination is a connected
    /// neighbor and `QueuedDtn` when it has to be carried.
    pub fn send_chat(&self, destination: &str, text: &str) -> Result<Envelope> {
        let mut message = ChatMessage::text(text);
        let (envelope, outcome) = self.originate(destination, &Payload::Chat(message.clone()), None)?;

        message.status = match outcome {
            RouteOutcome::Direct(_) => MessageStatus::Sent,
            _ => MessageStatus::QueuedDtn,
        };
        self.collaborators.conversations.append(destination, message)?;
        Ok(envelope)
    }

    // -----------------------------------------------------------------------
    // Friendship
    // -----------------------------------------------------------------------

    /// Sends a friend request to `stable_id` and records the contact as
    /// `RequestSent`.
    pub fn send_friend_request(&self, stable_id: &StableId) -> Result<Envelope> {
        let peer = self
            .registry
            .connected_by_stable_id(stable_id)
            .or_else(|| self.registry.discovered_by_stable_id(stable_id));
        let existing = self.collaborators.contacts.get(stable_id)?;

        let key = match peer.as_ref().and_then(|p| p.public_key.clone()) {
            Some(key) => Some(key),
            None => self.contact_key(stable_id)?,
        };
        let name = peer
            .map(|p| p.name)
            .or_else(|| existing.as_ref().map(|c| c.name.clone()))
            .unwrap_or_else(|| stable_id.to_string());

        let payload = Payload::Handshake(self.own_handshake(HandshakePurpose::FriendRequest));
        let (envelope, _) = self.originate(stable_id.as_str(), &payload, key.as_deref())?;

        self.collaborators.contacts.upsert(Contact {
            stable_id: stable_id.clone(),
            name,
            public_key: key.as_deref().map(encode_public_key).unwrap_or_default(),
            status: ContactStatus::RequestSent,
        })?;
        Ok(envelope)
    }

    /// Promotes a pending requester to friend and tells them.
    ///
    /// # Errors
    ///
    /// [`DriftError::UnknownPeer`] if `stable_id` is not in the
    /// contact book.
    pub fn accept_friend_request(&self, stable_id: &StableId) -> Result<Envelope> {
        let mut contact =
            self.collaborators
                .contacts
                .get(stable_id)?
                .ok_or_else(|| DriftError::UnknownPeer {
                    reason: format!("no contact {stable_id} to accept"),
                })?;
        contact.status = ContactStatus::Friend;
        self.collaborators.contacts.upsert(contact)?;

        let payload = Payload::Handshake(self.own_handshake(HandshakePurpose::FriendAccept));
        let (envelope, _) = self.originate(stable_id.as_str(), &payload, None)?;
        Ok(envelope)
    }

    /// Drops a pending request from `stable_id`. Nothing is sent; the
    /// requester just never hears back.
    ///
    /// # Errors
    ///
    /// [`DriftError::UnknownPeer`] if there is no request from
    /// `stable_id` awaiting an answer.
    pub fn reject_friend_request(&self, stable_id: &StableId) -> Result<()> {
        match self.collaborators.contacts.get(stable_id)? {
            Some(c) if c.status == ContactStatus::RequestReceived => {
                self.collaborators.contacts.remove(stable_id)?;
                tracing::info!(%stable_id, "friend request rejected");
                Ok(())
            }
            _ => Err(DriftError::UnknownPeer {
                reason: format!("no pending friend request from {stable_id}"),
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Channels
    // -----------------------------------------------------------------------

    /// Creates a channel with this node as its only member and returns
    /// its `group:` id.
    pub fn create_channel(&self, name: &str, description: &str, is_public: bool) -> Result<String> {
        let mut channel = Channel::create(name, is_public, self.local_id().clone());
        channel.description = description.to_owned();
        let id = channel.id.clone();
        self.collaborators.channels.merge(channel)?;
        tracing::info!(channel_id = %id, is_public, "channel created");
        Ok(id)
    }

    /// Joins a public channel learned from a discovery handshake.
    ///
    /// # Errors
    ///
    /// [`DriftError::ProtocolError`] if the channel is unknown or
    /// private. Private channels are joined by invite only.
    pub fn join_channel(&self, channel_id: &str) -> Result<()> {
        let channel = self.collaborators.channels.get(channel_id)?.ok_or_else(|| {
            DriftError::ProtocolError {
                reason: format!("unknown channel {channel_id}"),
            }
        })?;
        if !channel.is_public {
            return Err(DriftError::ProtocolError {
                reason: format!("channel {channel_id} is private"),
            });
        }
        self.collaborators
            .channels
            .add_member(channel_id, self.local_id().clone())?;
        tracing::info!(%channel_id, "joined public channel");
        Ok(())
    }

    /// Invites `stable_id` to `channel`. The member list is not sent.
    ///
    /// The channel is merged locally first with this node as a member,
    /// so group traffic addressed to it is consumed here too.
    pub fn send_channel_invite(&self, channel: &Channel, stable_id: &StableId) -> Result<Envelope> {
        let mut local = channel.clone();
        local.add_member(self.local_id().clone());
        self.collaborators.channels.merge(local)?;

        let invite = ChannelInvite {
            channel: Channel {
                members: Vec::new(),
                ..channel.clone()
            },
            inviter_name: self.identity.name.clone(),
        };
        let (envelope, _) =
            self.originate(stable_id.as_str(), &Payload::ChannelInvite(invite), None)?;
        Ok(envelope)
    }
}
