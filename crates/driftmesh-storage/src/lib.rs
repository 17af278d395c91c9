//! Envelope storage for the driftmesh DTN engine.
//!
//! [`MessageStore`] is the single owner of every envelope a node
//! carries. It keeps at most `storage_limit` entries (soft bound,
//! oldest by `timestamp` evicted first) and drops expired entries when
//! [`MessageStore::prune_expired`] runs.
//!
//! Two backends implement [`EnvelopeBackend`]:
//!
//! - [`MemoryBackend`]: ordered in-memory maps, lost on restart
//! - [`SledBackend`]: sled trees, survives restarts

pub mod backend;
pub mod memory;
pub mod sled_backend;
pub mod store;

pub use backend::EnvelopeBackend;
pub use memory::MemoryBackend;
pub use sled_backend::SledBackend;
pub use store::MessageStore;
