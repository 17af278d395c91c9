//! Transport event handling.
//!
//! Registry bookkeeping for a [`LinkEvent`] is applied inline by the
//! event loop, so the peer view always reflects events in arrival
//! order. Anything that touches crypto or the store comes back as a
//! [`LinkJob`] for the loop to spawn.

use std::sync::Arc;

use driftmesh_network::{CandidateDecision, DeclaredIdentity, LinkEvent, PeerInfo};
use driftmesh_types::EndpointId;

use crate::engine::RoutingEngine;
use crate::events::NodeEvent;

/// Routing work triggered by a link event.
#[derive(Debug)]
pub enum LinkJob {
    /// A link came up; greet the peer.
    SendDiscovery(PeerInfo),
    /// A frame arrived.
    Frame { endpoint: EndpointId, bytes: Vec<u8> },
}

impl LinkJob {
    /// Runs the job to completion, logging instead of failing.
    pub async fn run(self, engine: Arc<RoutingEngine>) {
        match self {
            Self::SendDiscovery(peer) => {
                if let Err(e) = engine.send_discovery(&peer) {
                    tracing::error!(endpoint = %peer.endpoint, %e, "discovery handshake failed");
                }
            }
            Self::Frame { endpoint, bytes } => {
                if let Err(e) = engine.handle_frame(&endpoint, &bytes).await {
                    tracing::warn!(%endpoint, %e, "inbound frame dropped");
                }
            }
        }
    }
}

fn declared(engine: &RoutingEngine) -> DeclaredIdentity {
    DeclaredIdentity::new(engine.identity().name.clone(), engine.local_id().clone())
}

/// Applies `event` to the peer registry and returns follow-up work.
pub fn apply_link_event(engine: &RoutingEngine, event: LinkEvent) -> Option<LinkJob> {
    let registry = engine.registry();
    match event {
        LinkEvent::PeerFound { endpoint, identity } => {
            let decision = registry.consider_candidate(&endpoint, &identity);
            tracing::debug!(%endpoint, peer = %identity, ?decision, "peer found");
            if decision == CandidateDecision::Initiate {
                if let Err(e) = engine.transport().request_connection(&endpoint, declared(engine)) {
                    tracing::warn!(%endpoint, %e, "connection request failed");
                    registry.connection_failed(&endpoint);
                }
            }
            None
        }

        LinkEvent::PeerLost { endpoint } => {
            tracing::debug!(%endpoint, "peer lost");
            registry.lost(&endpoint);
            None
        }

        LinkEvent::ConnectionInitiated { endpoint, identity } => {
            registry.mark_pending(&endpoint, &identity);
            None
        }

        LinkEvent::Connected { endpoint, identity } => {
            let peer = registry.mark_connected(&endpoint, &identity);
            tracing::info!(%endpoint, peer = %identity, "peer connected");
            engine.emit(NodeEvent::PeerConnected {
                endpoint,
                stable_id: peer.stable_id.clone(),
                name: peer.name.clone(),
            });
            Some(LinkJob::SendDiscovery(peer))
        }

        LinkEvent::ConnectionFailed { endpoint } => {
            tracing::warn!(%endpoint, "connection failed");
            registry.connection_failed(&endpoint);
            None
        }

        LinkEvent::Disconnected { endpoint } => {
            let gone = registry.disconnected(&endpoint);
            tracing::info!(%endpoint, "peer disconnected");
            engine.emit(NodeEvent::PeerDisconnected {
                endpoint,
                stable_id: gone.map(|p| p.stable_id),
            });
            None
        }

        LinkEvent::BytesReceived { endpoint, bytes } => Some(LinkJob::Frame { endpoint, bytes }),
    }
}
