//! Discovery handshake and the anti-entropy pull.
//!
//! Each side of a new link sends a discovery handshake carrying its
//! identity, key, public channels and summary vector. The receiver
//! binds the identity to the link, learns the key and asks for
//! whatever ids in the vector it does not hold. The pull reaches one
//! hop only: the reply is served straight from the neighbor's store.

use std::collections::HashSet;

use driftmesh_network::PeerInfo;
use driftmesh_protocol::e2e::{decode_public_key, encode_public_key};
use driftmesh_protocol::{Envelope, Handshake, HandshakePurpose, MessageRequest, Payload};
use driftmesh_types::{MessageId, Result};

use crate::collaborators::{Contact, ContactStatus};
use crate::engine::RoutingEngine;

/// Ids in `summary` that are not in `local`, in summary order.
pub fn missing_ids(summary: &[MessageId], local: &[MessageId]) -> Vec<MessageId> {
    let held: HashSet<&MessageId> = local.iter().collect();
    let mut seen = HashSet::new();
    summary
        .iter()
        .filter(|id| !held.contains(id) && seen.insert(*id))
        .cloned()
        .collect()
}

impl RoutingEngine {
    /// Our discovery handshake as of now.
    pub fn build_discovery(&self) -> Result<Handshake> {
        Ok(Handshake {
            stable_id: self.local_id().clone(),
            name: self.identity.name.clone(),
            public_key: encode_public_key(&self.crypto.my_public_key()),
            purpose: HandshakePurpose::Discovery,
            summary_vector: self.store.all_ids()?,
            public_channels: self.collaborators.channels.public_channels()?,
        })
    }

    /// Originates a discovery handshake for a freshly connected peer.
    pub fn send_discovery(&self, peer: &PeerInfo) -> Result<Envelope> {
        let handshake = self.build_discovery()?;
        tracing::info!(
            endpoint = %peer.endpoint,
            stable_id = %peer.stable_id,
            held = handshake.summary_vector.len(),
            "sending discovery handshake"
        );
        let (envelope, _) =
            self.originate(peer.stable_id.as_str(), &Payload::Handshake(handshake), None)?;
        Ok(envelope)
    }

    /// Applies a discovery handshake received from `sender`.
    ///
    /// # Steps
    ///
    /// 1. Merge the sender's public channels.
    /// 2. Bind its stable id and key to the endpoint it arrived on.
    /// 3. Record it as a known contact, or refresh a changed key.
    /// 4. Request the ids in its summary vector that we lack.
    pub fn handle_discovery(&self, handshake: &Handshake, sender: &PeerInfo) -> Result<()> {
        for channel in &handshake.public_channels {
            self.collaborators.channels.merge(channel.clone())?;
        }

        let key = decode_public_key(&handshake.public_key)?;
        self.registry
            .bind_identity(&sender.endpoint, &handshake.stable_id, &handshake.name, key);

        match self.collaborators.contacts.get(&handshake.stable_id)? {
            None => {
                self.collaborators.contacts.upsert(Contact {
                    stable_id: handshake.stable_id.clone(),
                    name: handshake.name.clone(),
                    public_key: handshake.public_key.clone(),
                    status: ContactStatus::Known,
                })?;
            }
            Some(mut contact) if contact.public_key != handshake.public_key => {
                tracing::info!(stable_id = %contact.stable_id, "contact key changed");
                contact.public_key.clone_from(&handshake.public_key);
                self.collaborators.contacts.upsert(contact)?;
            }
            Some(_) => {}
        }

        let missing = missing_ids(&handshake.summary_vector, &self.store.all_ids()?);
        tracing::info!(
            stable_id = %handshake.stable_id,
            endpoint = %sender.endpoint,
            offered = handshake.summary_vector.len(),
            missing = missing.len(),
            "discovery handshake processed"
        );
        if !missing.is_empty() {
            let request = Payload::MessageRequest(MessageRequest { message_ids: missing });
            self.originate(handshake.stable_id.as_str(), &request, None)?;
        }
        Ok(())
    }
}
