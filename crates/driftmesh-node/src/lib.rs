//! driftmesh node runtime.
//!
//! The [`RoutingEngine`] implements epidemic store-carry-forward
//! routing over short-range links: originate, receive, route and
//! process, plus the discovery handshake that pulls missing envelopes
//! from each new neighbor. The [`Node`] wraps it in an event loop fed
//! by the transport adapter and a command channel.
//!
//! # Modules
//!
//! - [`engine`]: shared routing state, route and hop-by-hop send
//! - [`outgoing`]: originate and the user-facing send operations
//! - [`incoming`]: frame unwrap, receive and type dispatch
//! - [`handshake`]: discovery handshake and anti-entropy pull
//! - [`link`]: transport event handling and connection arbitration
//! - [`collaborators`]: contacts, channels and conversation history
//! - [`maintenance`]: periodic expiry pruning
//! - [`node`], [`command`], [`events`], [`config`] and the event loop:
//!   runtime plumbing

pub mod collaborators;
pub mod command;
pub mod config;
pub mod engine;
mod event_loop;
pub mod events;
pub mod handshake;
pub mod incoming;
pub mod link;
pub mod maintenance;
pub mod node;
pub mod outgoing;

pub use collaborators::{Collaborators, Contact, ContactStatus};
pub use command::{DisconnectTarget, NodeCommand, NodeStatus};
pub use config::NodeConfig;
pub use engine::{LocalIdentity, RouteOutcome, RoutingEngine};
pub use events::NodeEvent;
pub use incoming::ReceiveOutcome;
pub use node::{Node, NodeLink, NodeState};
