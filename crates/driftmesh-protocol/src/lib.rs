//! Wire protocol for the driftmesh delay-tolerant network.
//!
//! # Modules
//!
//! - [`envelope`]: the stored/routed/carried [`Envelope`] and its
//!   [`MessageType`] tag
//! - [`payload`]: typed payload bodies and the [`Payload`] tagged union
//! - [`e2e`]: end-to-end sealing of the `payload` field
//! - [`frame`]: hop-by-hop link framing of whole envelopes
//!
//! Field names on the wire are snake_case and must stay stable:
//! heterogeneous nodes exchange these JSON documents directly.

pub mod e2e;
pub mod envelope;
pub mod frame;
pub mod payload;

pub use envelope::{DestinationKind, Envelope, MessageType, BROADCAST_DESTINATION, GROUP_PREFIX};
pub use payload::{
    Channel, ChannelInvite, ChatKind, ChatMessage, Handshake, HandshakePurpose, MessageRequest,
    MessageStatus, Payload,
};
