//! Commands and status types for consumer → node communication.
//!
//! [`NodeCommand`] travels over a bounded channel into the event
//! loop. Commands that produce a result carry a
//! `tokio::sync::oneshot::Sender` for the reply.

use driftmesh_protocol::Channel;
use driftmesh_types::config::DtnSettings;
use driftmesh_types::{MessageId, Result, StableId};
use tokio::sync::oneshot;

use crate::node::NodeState;

/// Which links a [`NodeCommand::Disconnect`] tears down.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DisconnectTarget {
    Peer(StableId),
    All,
}

// ---------------------------------------------------------------------------
// NodeCommand
// ---------------------------------------------------------------------------

pub enum NodeCommand {
    /// Chat to a stable id or a `group:` destination.
    SendChat {
        destination: String,
        text: String,
        reply: oneshot::Sender<Result<MessageId>>,
    },

    SendFriendRequest {
        stable_id: StableId,
        reply: oneshot::Sender<Result<MessageId>>,
    },

    AcceptFriendRequest {
        stable_id: StableId,
        reply: oneshot::Sender<Result<MessageId>>,
    },

    /// Drop a pending request without answering it.
    RejectFriendRequest {
        stable_id: StableId,
        reply: oneshot::Sender<Result<()>>,
    },

    /// Create a channel with this node as its first member. Replies
    /// with the new `group:` id.
    CreateChannel {
        name: String,
        description: String,
        is_public: bool,
        reply: oneshot::Sender<Result<String>>,
    },

    /// Join a known public channel.
    JoinChannel {
        channel_id: String,
        reply: oneshot::Sender<Result<()>>,
    },

    SendChannelInvite {
        channel: Channel,
        stable_id: StableId,
        reply: oneshot::Sender<Result<MessageId>>,
    },

    /// Connect to a peer currently in the discovered view.
    RequestConnection {
        stable_id: StableId,
        reply: oneshot::Sender<Result<()>>,
    },

    Disconnect {
        target: DisconnectTarget,
        reply: oneshot::Sender<Result<()>>,
    },

    /// Hot-reload TTL, hop budget and storage limit.
    UpdateSettings {
        settings: DtnSettings,
        reply: oneshot::Sender<Result<()>>,
    },

    GetStatus {
        reply: oneshot::Sender<Result<NodeStatus>>,
    },

    /// Exit the event loop. Fire-and-forget; await the handle from
    /// [`Node::start`](crate::Node::start) to confirm.
    Shutdown,
}

// Manual Debug because oneshot::Sender does not implement Debug.
impl std::fmt::Debug for NodeCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SendChat { destination, .. } => f
                .debug_struct("SendChat")
                .field("destination", destination)
                .finish_non_exhaustive(),
            Self::SendFriendRequest { stable_id, .. } => f
                .debug_struct("SendFriendRequest")
                .field("stable_id", stable_id)
                .finish_non_exhaustive(),
            Self::AcceptFriendRequest { stable_id, .. } => f
                .debug_struct("AcceptFriendRequest")
                .field("stable_id", stable_id)
                .finish_non_exhaustive(),
            Self::RejectFriendRequest { stable_id, .. } => f
                .debug_struct("RejectFriendRequest")
                .field("stable_id", stable_id)
                .finish_non_exhaustive(),
            Self::CreateChannel {
                name, is_public, ..
            } => f
                .debug_struct("CreateChannel")
                .field("name", name)
                .field("is_public", is_public)
                .finish_non_exhaustive(),
            Self::JoinChannel { channel_id, .. } => f
                .debug_struct("JoinChannel")
                .field("channel_id", channel_id)
                .finish_non_exhaustive(),
            Self::SendChannelInvite { channel, stable_id, .. } => f
                .debug_struct("SendChannelInvite")
                .field("channel", &channel.id)
                .field("stable_id", stable_id)
                .finish_non_exhaustive(),
            Self::RequestConnection { stable_id, .. } => f
                .debug_struct("RequestConnection")
                .field("stable_id", stable_id)
                .finish_non_exhaustive(),
            Self::Disconnect { target, .. } => f
                .debug_struct("Disconnect")
                .field("target", target)
                .finish_non_exhaustive(),
            Self::UpdateSettings { settings, .. } => f
                .debug_struct("UpdateSettings")
                .field("settings", settings)
                .finish_non_exhaustive(),
            Self::GetStatus { .. } => f.write_str("GetStatus"),
            Self::Shutdown => f.write_str("Shutdown"),
        }
    }
}

// ---------------------------------------------------------------------------
// NodeStatus
// ---------------------------------------------------------------------------

/// Snapshot returned by [`NodeCommand::GetStatus`].
#[derive(Clone, Debug)]
pub struct NodeStatus {
    pub state: NodeState,
    pub stable_id: StableId,
    pub name: String,
    pub connected_peers: usize,
    pub discovered_peers: usize,
    pub stored_envelopes: usize,
    pub settings: DtnSettings,
}
