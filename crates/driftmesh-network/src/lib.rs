//! Link layer of the driftmesh engine.
//!
//! The physical radio transport lives outside this workspace. It
//! reports [`LinkEvent`]s and accepts [`LinkCommand`]s; everything
//! above it only sees those two enums.
//!
//! # Modules
//!
//! - [`events`]: the transport adapter contract
//! - [`identity`]: the `name|stable_id` string declared at link setup
//! - [`registry`]: live view of discovered, pending and connected peers
//! - [`arbitration`]: which side of a pair initiates a connection
//! - [`transport`]: cloneable command handle for outbound traffic
//! - [`memory_link`]: in-process transport for simulation and tests

pub mod arbitration;
pub mod events;
pub mod identity;
pub mod memory_link;
pub mod registry;
pub mod transport;

pub use arbitration::{arbitrate, should_initiate, CandidateDecision};
pub use events::{LinkCommand, LinkEvent};
pub use identity::DeclaredIdentity;
pub use registry::{PeerInfo, PeerRegistry, PeerSnapshot};
pub use transport::TransportHandle;
