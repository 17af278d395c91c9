//! Shared routing state and the forwarding half of the engine.
//!
//! One [`RoutingEngine`] exists per node and is shared behind an
//! `Arc` by every routing task. It holds no lock of its own: the
//! message store serializes its backend, the peer registry swaps whole
//! snapshots, and the collaborators guard themselves.
//!
//! Origination lives in [`crate::outgoing`], receive and dispatch in
//! [`crate::incoming`], the discovery handshake in
//! [`crate::handshake`]. This module owns [`RoutingEngine::route`] and
//! [`RoutingEngine::send_to_peer`], which every path ends in.

use std::sync::Arc;

use driftmesh_crypto::CryptoFacade;
use driftmesh_network::{PeerInfo, PeerRegistry, TransportHandle};
use driftmesh_protocol::e2e::decode_public_key;
use driftmesh_protocol::frame::{plain_frame, seal_for_link};
use driftmesh_protocol::{DestinationKind, Envelope, MessageType};
use driftmesh_storage::MessageStore;
use driftmesh_types::config::SettingsHandle;
use driftmesh_types::{DriftError, EndpointId, Result, StableId};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::collaborators::Collaborators;
use crate::events::NodeEvent;

// ---------------------------------------------------------------------------
// LocalIdentity
// ---------------------------------------------------------------------------

/// Who this node is on the mesh.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LocalIdentity {
    pub stable_id: StableId,
    pub name: String,
}

impl LocalIdentity {
    pub fn new(stable_id: StableId, name: impl Into<String>) -> Self {
        Self {
            stable_id,
            name: name.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// RouteOutcome
// ---------------------------------------------------------------------------

/// What [`RoutingEngine::route`] did with an envelope.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RouteOutcome {
    /// Hop budget already spent; nothing sent.
    Exhausted,
    /// Destination is a connected neighbor; sent to it alone.
    Direct(EndpointId),
    /// Flooded to this many neighbors.
    Flooded(usize),
}

// ---------------------------------------------------------------------------
// RoutingEngine
// ---------------------------------------------------------------------------

pub struct RoutingEngine {
    pub(crate) identity: LocalIdentity,
    pub(crate) crypto: Arc<dyn CryptoFacade>,
    pub(crate) store: Arc<MessageStore>,
    pub(crate) registry: PeerRegistry,
    pub(crate) transport: TransportHandle,
    pub(crate) settings: SettingsHandle,
    pub(crate) collaborators: Collaborators,
    pub(crate) events: mpsc::Sender<NodeEvent>,
}

impl RoutingEngine {
    /// Wires an engine together. The peer registry is created here,
    /// keyed by the local stable id.
    pub fn new(
        identity: LocalIdentity,
        crypto: Arc<dyn CryptoFacade>,
        store: Arc<MessageStore>,
        transport: TransportHandle,
        settings: SettingsHandle,
        collaborators: Collaborators,
        events: mpsc::Sender<NodeEvent>,
    ) -> Self {
        let registry = PeerRegistry::new(identity.stable_id.clone());
        Self {
            identity,
            crypto,
            store,
            registry,
            transport,
            settings,
            collaborators,
            events,
        }
    }

    pub fn identity(&self) -> &LocalIdentity {
        &self.identity
    }

    pub fn local_id(&self) -> &StableId {
        &self.identity.stable_id
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &SettingsHandle {
        &self.settings
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    pub fn transport(&self) -> &TransportHandle {
        &self.transport
    }

    // -----------------------------------------------------------------------
    // Route
    // -----------------------------------------------------------------------

    /// Forwards `envelope` one hop.
    ///
    /// # Steps
    ///
    /// 1. Drop if `hop_count` is already 0.
    /// 2. Build the forwarded copy with one hop spent.
    /// 3. If the destination is a connected neighbor, send to it only.
    /// 4. Otherwise send to every connected neighbor except `sender`.
    ///
    /// Per-neighbor send failures are logged and skipped.
    pub fn route(&self, envelope: &Envelope, sender: Option<&EndpointId>) -> RouteOutcome {
        let Some(forward) = envelope.forwarded() else {
            tracing::debug!(message_id = %envelope.id, "hop budget exhausted, not forwarding");
            return RouteOutcome::Exhausted;
        };

        if let DestinationKind::Identity(dest) = forward.destination_kind() {
            if let Some(peer) = self.registry.connected_by_stable_id(&dest) {
                self.send_logged(&peer, &forward);
                tracing::debug!(
                    message_id = %forward.id,
                    endpoint = %peer.endpoint,
                    hop_count = forward.hop_count,
                    "delivered directly to destination neighbor"
                );
                return RouteOutcome::Direct(peer.endpoint);
            }
        }

        let mut sent = 0;
        for peer in self.registry.connected_peers() {
            if sender == Some(&peer.endpoint) {
                continue;
            }
            if self.send_logged(&peer, &forward) {
                sent += 1;
            }
        }
        tracing::debug!(
            message_id = %forward.id,
            peers = sent,
            hop_count = forward.hop_count,
            "flooded envelope"
        );
        RouteOutcome::Flooded(sent)
    }

    fn send_logged(&self, peer: &PeerInfo, envelope: &Envelope) -> bool {
        match self.send_to_peer(peer, envelope) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    message_id = %envelope.id,
                    endpoint = %peer.endpoint,
                    %e,
                    "send to peer failed"
                );
                false
            }
        }
    }

    // -----------------------------------------------------------------------
    // SendToPeer
    // -----------------------------------------------------------------------

    /// Transmits `envelope` unchanged to one neighbor, sealed with the
    /// neighbor's key.
    ///
    /// # Errors
    ///
    /// - [`DriftError::MissingKey`] if no key is known for the neighbor
    ///   and the envelope is not a discovery handshake.
    /// - Crypto or transport errors from sealing and sending.
    pub fn send_to_peer(&self, peer: &PeerInfo, envelope: &Envelope) -> Result<()> {
        let bytes = match self.hop_key(peer)? {
            Some(key) => seal_for_link(self.crypto.as_ref(), envelope, &key)?,
            None if envelope.message_type == MessageType::DiscoveryHandshake => {
                tracing::debug!(
                    endpoint = %peer.endpoint,
                    "neighbor key unknown, sending handshake unwrapped"
                );
                plain_frame(envelope)?
            }
            None => {
                return Err(DriftError::MissingKey {
                    reason: format!("no link key for neighbor {}", peer.stable_id),
                })
            }
        };
        self.transport.send_bytes(&peer.endpoint, bytes)
    }

    /// Key for sealing frames to `peer`: the registry binding made by
    /// its discovery handshake, else the contact book.
    fn hop_key(&self, peer: &PeerInfo) -> Result<Option<Vec<u8>>> {
        if let Some(key) = &peer.public_key {
            return Ok(Some(key.clone()));
        }
        if let Some(key) = self
            .registry
            .resolve_sender(&peer.endpoint)
            .and_then(|p| p.public_key)
        {
            return Ok(Some(key));
        }
        self.contact_key(&peer.stable_id)
    }

    /// Public key recorded in the contact book for `id`, if any.
    pub(crate) fn contact_key(&self, id: &StableId) -> Result<Option<Vec<u8>>> {
        match self.collaborators.contacts.get(id)? {
            Some(contact) if !contact.public_key.is_empty() => {
                decode_public_key(&contact.public_key).map(Some)
            }
            _ => Ok(None),
        }
    }

    // -----------------------------------------------------------------------
    // Relevance and events
    // -----------------------------------------------------------------------

    /// Whether this node should consume `envelope` locally.
    pub fn is_relevant(&self, envelope: &Envelope) -> Result<bool> {
        match envelope.destination_kind() {
            DestinationKind::Identity(id) => Ok(&id == self.local_id()),
            DestinationKind::Broadcast => Ok(true),
            DestinationKind::Group(group) => self
                .collaborators
                .channels
                .is_member(&group, self.local_id()),
        }
    }

    /// Publishes a node event without waiting for channel capacity.
    /// When the consumer lags or is gone the event is dropped.
    pub(crate) fn emit(&self, event: NodeEvent) {
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(ev)) => {
                tracing::warn!(event = ?ev, "node event dropped, consumer lagging");
            }
            Err(TrySendError::Closed(ev)) => {
                tracing::debug!(event = ?ev, "node event dropped, no consumer");
            }
        }
    }
}

impl std::fmt::Debug for RoutingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingEngine")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}
