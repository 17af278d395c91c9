//! The bounded message store.
//!
//! # Capacity
//!
//! Before a new id is inserted, if `count() >= storage_limit`, the
//! single oldest envelope (smallest `timestamp`) is deleted. If no
//! oldest entry can be found the insert proceeds anyway; the limit is
//! a soft bound. Eviction ignores destination and relevance.
//!
//! # Expiry
//!
//! [`MessageStore::prune_expired`] deletes every envelope whose `ttl`
//! is before `now`. It is driven by an external timer and is
//! idempotent.
//!
//! All operations run under one mutex, so the dedup check and insert
//! in [`MessageStore::insert_if_absent`] are atomic with respect to
//! concurrent receivers.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use driftmesh_protocol::Envelope;
use driftmesh_types::config::SettingsHandle;
use driftmesh_types::{DriftError, MessageId, Result};

use crate::backend::EnvelopeBackend;
use crate::memory::MemoryBackend;
use crate::sled_backend::SledBackend;

pub struct MessageStore {
    backend: Mutex<Box<dyn EnvelopeBackend>>,
    settings: SettingsHandle,
}

impl MessageStore {
    pub fn with_backend(backend: Box<dyn EnvelopeBackend>, settings: SettingsHandle) -> Self {
        Self {
            backend: Mutex::new(backend),
            settings,
        }
    }

    pub fn in_memory(settings: SettingsHandle) -> Self {
        Self::with_backend(Box::new(MemoryBackend::new()), settings)
    }

    /// Opens a sled-backed store at `path`.
    pub fn open(path: &Path, settings: SettingsHandle) -> Result<Self> {
        Ok(Self::with_backend(Box::new(SledBackend::open(path)?), settings))
    }

    fn lock_backend(&self) -> Result<MutexGuard<'_, Box<dyn EnvelopeBackend>>> {
        self.backend.lock().map_err(|e| DriftError::StorageError {
            reason: format!("message store lock poisoned: {e}"),
        })
    }

    /// Inserts with capacity eviction. Holds the lock already.
    fn insert_locked(&self, backend: &mut dyn EnvelopeBackend, envelope: &Envelope) -> Result<()> {
        if !backend.contains(&envelope.id)? {
            let limit = self.settings.snapshot().storage_limit;
            if backend.len()? >= limit {
                match backend.oldest()? {
                    Some(oldest) => {
                        backend.remove(&oldest.id)?;
                        tracing::debug!(
                            evicted = %oldest.id,
                            timestamp = oldest.timestamp,
                            limit,
                            "store full, evicted oldest envelope"
                        );
                    }
                    None => {
                        tracing::warn!(limit, "store full but no oldest envelope found, inserting anyway");
                    }
                }
            }
        }
        backend.put(envelope)
    }

    /// Stores `envelope`, evicting the oldest entry if at capacity.
    pub fn add(&self, envelope: &Envelope) -> Result<()> {
        let mut backend = self.lock_backend()?;
        self.insert_locked(&mut **backend, envelope)
    }

    /// Stores `envelope` only if its id is new. Returns whether it was
    /// stored.
    pub fn insert_if_absent(&self, envelope: &Envelope) -> Result<bool> {
        let mut backend = self.lock_backend()?;
        if backend.contains(&envelope.id)? {
            return Ok(false);
        }
        self.insert_locked(&mut **backend, envelope)?;
        Ok(true)
    }

    pub fn get(&self, id: &MessageId) -> Result<Option<Envelope>> {
        self.lock_backend()?.get(id)
    }

    pub fn contains(&self, id: &MessageId) -> Result<bool> {
        self.lock_backend()?.contains(id)
    }

    /// Returns the envelopes among `ids` that are present, in the
    /// order requested.
    pub fn get_many(&self, ids: &[MessageId]) -> Result<Vec<Envelope>> {
        let backend = self.lock_backend()?;
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(env) = backend.get(id)? {
                found.push(env);
            }
        }
        Ok(found)
    }

    /// Every stored id, oldest first. This is the summary vector.
    pub fn all_ids(&self) -> Result<Vec<MessageId>> {
        self.lock_backend()?.ids()
    }

    pub fn delete(&self, id: &MessageId) -> Result<()> {
        self.lock_backend()?.remove(id)?;
        Ok(())
    }

    pub fn count(&self) -> Result<usize> {
        self.lock_backend()?.len()
    }

    pub fn oldest(&self) -> Result<Option<Envelope>> {
        self.lock_backend()?.oldest()
    }

    /// Deletes every envelope whose `ttl` is before `now_millis` and
    /// returns how many were removed.
    pub fn prune_expired(&self, now_millis: i64) -> Result<usize> {
        let mut backend = self.lock_backend()?;
        let expired = backend.expired_ids(now_millis)?;
        for id in &expired {
            backend.remove(id)?;
        }
        if !expired.is_empty() {
            tracing::info!(pruned = expired.len(), "pruned expired envelopes");
        }
        Ok(expired.len())
    }

    pub fn flush(&self) -> Result<()> {
        self.lock_backend()?.flush()
    }
}
