//! Storage backend contract.
//!
//! Backends are plain keyed maps with a timestamp index. Capacity and
//! atomicity policy live one level up in [`crate::MessageStore`],
//! which serializes every call behind one lock.

use driftmesh_protocol::Envelope;
use driftmesh_types::{MessageId, Result};

pub trait EnvelopeBackend: Send {
    fn get(&self, id: &MessageId) -> Result<Option<Envelope>>;

    fn contains(&self, id: &MessageId) -> Result<bool>;

    /// Inserts or replaces the envelope stored under `envelope.id`.
    fn put(&mut self, envelope: &Envelope) -> Result<()>;

    /// Removes and returns the envelope, if present.
    fn remove(&mut self, id: &MessageId) -> Result<Option<Envelope>>;

    fn len(&self) -> Result<usize>;

    fn ids(&self) -> Result<Vec<MessageId>>;

    /// Envelope with the smallest `timestamp`; ties broken by id.
    fn oldest(&self) -> Result<Option<Envelope>>;

    /// Ids of envelopes whose `ttl` is strictly before `now_millis`.
    fn expired_ids(&self, now_millis: i64) -> Result<Vec<MessageId>>;

    /// Makes prior writes durable. No-op for volatile backends.
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}
