//! Events emitted by the node to its consumers (UI, CLI, tests).

use driftmesh_protocol::ChatMessage;
use driftmesh_types::{EndpointId, StableId};

use crate::collaborators::Contact;

#[derive(Clone, Debug)]
pub enum NodeEvent {
    PeerConnected {
        endpoint: EndpointId,
        stable_id: StableId,
        name: String,
    },

    PeerDisconnected {
        endpoint: EndpointId,
        stable_id: Option<StableId>,
    },

    /// A chat message addressed to us or to one of our groups.
    ChatReceived {
        /// Source stable id for direct chats, group id for groups.
        conversation: String,
        from: StableId,
        message: ChatMessage,
    },

    FriendRequestReceived { contact: Contact },

    FriendAccepted { stable_id: StableId },

    /// We were added to a channel by an invite.
    ChannelJoined {
        channel_id: String,
        name: String,
        inviter: String,
    },
}
