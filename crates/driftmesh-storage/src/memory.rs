//! Volatile backend.

use std::collections::{BTreeSet, HashMap};

use driftmesh_protocol::Envelope;
use driftmesh_types::{MessageId, Result};

use crate::backend::EnvelopeBackend;

/// In-memory envelopes plus a `(timestamp, id)` ordered index.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    by_id: HashMap<MessageId, Envelope>,
    by_time: BTreeSet<(i64, MessageId)>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EnvelopeBackend for MemoryBackend {
    fn get(&self, id: &MessageId) -> Result<Option<Envelope>> {
        Ok(self.by_id.get(id).cloned())
    }

    fn contains(&self, id: &MessageId) -> Result<bool> {
        Ok(self.by_id.contains_key(id))
    }

    fn put(&mut self, envelope: &Envelope) -> Result<()> {
        if let Some(prev) = self.by_id.insert(envelope.id.clone(), envelope.clone()) {
            self.by_time.remove(&(prev.timestamp, prev.id));
        }
        self.by_time
            .insert((envelope.timestamp, envelope.id.clone()));
        Ok(())
    }

    fn remove(&mut self, id: &MessageId) -> Result<Option<Envelope>> {
        let removed = self.by_id.remove(id);
        if let Some(env) = &removed {
            self.by_time.remove(&(env.timestamp, env.id.clone()));
        }
        Ok(removed)
    }

    fn len(&self) -> Result<usize> {
        Ok(self.by_id.len())
    }

    fn ids(&self) -> Result<Vec<MessageId>> {
        Ok(self.by_time.iter().map(|(_, id)| id.clone()).collect())
    }

    fn oldest(&self) -> Result<Option<Envelope>> {
        Ok(self
            .by_time
            .first()
            .and_then(|(_, id)| self.by_id.get(id).cloned()))
    }

    fn expired_ids(&self, now_millis: i64) -> Result<Vec<MessageId>> {
        Ok(self
            .by_id
            .values()
            .filter(|e| e.is_expired(now_millis))
            .map(|e| e.id.clone())
            .collect())
    }
}
