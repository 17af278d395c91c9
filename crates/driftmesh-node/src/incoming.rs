//! Inbound frames: unwrap, receive, and local processing.
//!
//! # Steps
//!
//! 1. [`RoutingEngine::handle_frame`] resolves the sending endpoint
//!    and strips the hop-by-hop layer.
//! 2. [`RoutingEngine::on_receive`] deduplicates by id, stores, and
//!    hands relevant envelopes to [`RoutingEngine::process`] before
//!    routing onwards.
//! 3. `process` strips the end-to-end layer when the type calls for
//!    it and dispatches on the decoded [`Payload`].
//!
//! A processing failure only abandons local consumption of that one
//! envelope; it is still stored and routed.

use driftmesh_network::PeerInfo;
use driftmesh_protocol::e2e::open_payload;
use driftmesh_protocol::frame::{open_link_frame, FrameKind};
use driftmesh_protocol::{ChannelInvite, ChatMessage, Envelope, Handshake, MessageType, Payload};
use driftmesh_types::{DriftError, EndpointId, Result};

use crate::collaborators::{Contact, ContactStatus};
use crate::engine::{RouteOutcome, RoutingEngine};
use crate::events::NodeEvent;

/// What [`RoutingEngine::on_receive`] did.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ReceiveOutcome {
    /// Id already held; nothing processed or routed.
    Duplicate,
    Stored {
        relevant: bool,
        route: RouteOutcome,
    },
}

impl RoutingEngine {
    /// Entry point for raw bytes arriving on a link.
    ///
    /// # Errors
    ///
    /// - [`DriftError::UnknownPeer`] if `endpoint` has no connected or
    ///   pending record.
    /// - [`DriftError::InvalidEnvelope`] if the bytes are neither a
    ///   sealed frame for us nor a bare envelope.
    pub async fn handle_frame(&self, endpoint: &EndpointId, bytes: &[u8]) -> Result<ReceiveOutcome> {
        let sender = self
            .registry
            .resolve_sender(endpoint)
            .ok_or_else(|| DriftError::UnknownPeer {
                reason: format!("bytes from unrecognized endpoint {endpoint}"),
            })?;

        let (envelope, kind) = open_link_frame(self.crypto.as_ref(), bytes)?;
        if kind == FrameKind::Plain {
            tracing::debug!(
                message_id = %envelope.id,
                %endpoint,
                message_type = %envelope.message_type,
                "received unwrapped frame"
            );
        }
        self.on_receive(envelope, &sender).await
    }

    /// Accepts an envelope from a neighbor.
    ///
    /// The id check comes before anything else: a second copy is
    /// neither processed nor routed again.
    pub async fn on_receive(&self, envelope: Envelope, sender: &PeerInfo) -> Result<ReceiveOutcome> {
        if !self.store.insert_if_absent(&envelope)? {
            tracing::debug!(message_id = %envelope.id, "duplicate envelope dropped");
            return Ok(ReceiveOutcome::Duplicate);
        }

        let relevant = self.is_relevant(&envelope).unwrap_or_else(|e| {
            tracing::warn!(message_id = %envelope.id, %e, "relevance check failed");
            false
        });
        if relevant {
            if let Err(e) = self.process(&envelope, sender).await {
                tracing::error!(
                    message_id = %envelope.id,
                    message_type = %envelope.message_type,
                    %e,
                    "processing failed"
                );
            }
        }

        let route = self.route(&envelope, Some(&sender.endpoint));
        Ok(ReceiveOutcome::Stored { relevant, route })
    }

    /// Consumes an envelope addressed to this node.
    pub async fn process(&self, envelope: &Envelope, sender: &PeerInfo) -> Result<()> {
        match &envelope.message_type {
            MessageType::PublicChannelAnnouncement | MessageType::ProfileUpdate => {
                tracing::warn!(
                    message_id = %envelope.id,
                    message_type = %envelope.message_type,
                    "unhandled message type"
                );
                return Ok(());
            }
            MessageType::Other(tag) => {
                tracing::warn!(message_id = %envelope.id, %tag, "unknown message type");
                return Ok(());
            }
            _ => {}
        }

        let json = if envelope.message_type.requires_confidentiality() {
            open_payload(self.crypto.as_ref(), &envelope.payload)?
        } else {
            envelope.payload.clone()
        };

        match Payload::decode(&envelope.message_type, &json)? {
            Payload::Chat(message) => self.process_chat(envelope, message),
            Payload::Handshake(handshake) => match envelope.message_type {
                MessageType::DiscoveryHandshake => self.handle_discovery(&handshake, sender),
                MessageType::FriendRequest => self.process_friend_request(handshake),
                _ => self.process_friend_accept(&handshake),
            },
            Payload::MessageRequest(request) => {
                let found = self.store.get_many(&request.message_ids)?;
                tracing::info!(
                    requested = request.message_ids.len(),
                    found = found.len(),
                    endpoint = %sender.endpoint,
                    "serving message request"
                );
                for stored in &found {
                    if let Err(e) = self.send_to_peer(sender, stored) {
                        tracing::warn!(message_id = %stored.id, %e, "failed to serve envelope");
                    }
                }
                Ok(())
            }
            Payload::ChannelInvite(invite) => self.process_channel_invite(invite),
        }
    }

    fn process_chat(&self, envelope: &Envelope, mut message: ChatMessage) -> Result<()> {
        message.is_sent_by_me = false;
        let conversation = match envelope.message_type {
            MessageType::GroupMessage => envelope.destination.clone(),
            _ => envelope.source.to_string(),
        };
        self.collaborators
            .conversations
            .append(&conversation, message.clone())?;
        tracing::info!(message_id = %envelope.id, %conversation, "chat message delivered");

        self.emit(NodeEvent::ChatReceived {
            conversation,
            from: envelope.source.clone(),
            message,
        });
        Ok(())
    }

    fn process_friend_request(&self, handshake: Handshake) -> Result<()> {
        let contact = Contact {
            stable_id: handshake.stable_id,
            name: handshake.name,
            public_key: handshake.public_key,
            status: ContactStatus::RequestReceived,
        };
        self.collaborators.contacts.upsert(contact.clone())?;
        tracing::info!(stable_id = %contact.stable_id, "friend request received");
        self.emit(NodeEvent::FriendRequestReceived { contact });
        Ok(())
    }

    fn process_friend_accept(&self, handshake: &Handshake) -> Result<()> {
        let Some(mut contact) = self.collaborators.contacts.get(&handshake.stable_id)? else {
            tracing::warn!(stable_id = %handshake.stable_id, "friend accept from unknown contact");
            return Ok(());
        };
        contact.status = ContactStatus::Friend;
        self.collaborators.contacts.upsert(contact)?;
        tracing::info!(stable_id = %handshake.stable_id, "friend request accepted");
        self.emit(NodeEvent::FriendAccepted {
            stable_id: handshake.stable_id.clone(),
        });
        Ok(())
    }

    /// Invites join unconditionally.
    fn process_channel_invite(&self, invite: ChannelInvite) -> Result<()> {
        let channel_id = invite.channel.id.clone();
        let name = invite.channel.name.clone();
        self.collaborators.channels.merge(invite.channel)?;
        self.collaborators
            .channels
            .add_member(&channel_id, self.local_id().clone())?;
        tracing::info!(%channel_id, inviter = %invite.inviter_name, "joined channel by invite");

        self.emit(NodeEvent::ChannelJoined {
            channel_id,
            name,
            inviter: invite.inviter_name,
        });
        Ok(())
    }
}
