//! Transport adapter contract.
//!
//! Inbound: [`LinkEvent`], produced by the radio layer on its own
//! callback thread and queued for the node. Outbound: [`LinkCommand`],
//! produced by the node and executed by the radio layer. Neither side
//! blocks the other.

use driftmesh_types::EndpointId;

use crate::identity::DeclaredIdentity;

/// Things the transport tells the node.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum LinkEvent {
    /// A device came into range and advertised its identity.
    PeerFound {
        endpoint: EndpointId,
        identity: DeclaredIdentity,
    },

    /// A previously found device is no longer advertising.
    PeerLost { endpoint: EndpointId },

    /// A connection attempt started, in either direction.
    ConnectionInitiated {
        endpoint: EndpointId,
        identity: DeclaredIdentity,
    },

    /// The link is up and can carry bytes.
    Connected {
        endpoint: EndpointId,
        identity: DeclaredIdentity,
    },

    /// A connection attempt did not complete.
    ConnectionFailed { endpoint: EndpointId },

    Disconnected { endpoint: EndpointId },

    /// Raw frame from a connected (or connecting) endpoint.
    BytesReceived { endpoint: EndpointId, bytes: Vec<u8> },
}

/// Things the node asks the transport to do.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum LinkCommand {
    Send { endpoint: EndpointId, bytes: Vec<u8> },

    /// Ask to connect, declaring our own identity in the link
    /// handshake.
    RequestConnection {
        endpoint: EndpointId,
        local: DeclaredIdentity,
    },

    Disconnect { endpoint: EndpointId },
}

impl LinkCommand {
    pub fn endpoint(&self) -> &EndpointId {
        match self {
            Self::Send { endpoint, .. }
            | Self::RequestConnection { endpoint, .. }
            | Self::Disconnect { endpoint } => endpoint,
        }
    }
}
