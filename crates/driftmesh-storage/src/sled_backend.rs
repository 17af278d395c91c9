//! Durable backend on sled.
//!
//! # Trees
//!
//! - `envelopes`: `id → envelope JSON`
//! - `by_time`: `timestamp_key(8) || id → ()`, so sled's
//!   lexicographic iteration yields oldest first

use std::path::Path;

use driftmesh_protocol::Envelope;
use driftmesh_types::{DriftError, MessageId, Result};

use crate::backend::EnvelopeBackend;

const ENVELOPES_TREE: &str = "envelopes";
const BY_TIME_TREE: &str = "by_time";

fn storage_err(op: &str, e: sled::Error) -> DriftError {
    DriftError::StorageError {
        reason: format!("sled {op} failed: {e}"),
    }
}

/// Order-preserving 8-byte encoding of a signed millisecond timestamp.
fn timestamp_key(timestamp: i64) -> [u8; 8] {
    ((timestamp as u64) ^ (1 << 63)).to_be_bytes()
}

fn time_index_key(envelope: &Envelope) -> Vec<u8> {
    let mut key = Vec::with_capacity(8 + envelope.id.as_str().len());
    key.extend_from_slice(&timestamp_key(envelope.timestamp));
    key.extend_from_slice(envelope.id.as_str().as_bytes());
    key
}

pub struct SledBackend {
    db: sled::Db,
    envelopes: sled::Tree,
    by_time: sled::Tree,
}

impl SledBackend {
    /// Opens (or creates) the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let db = sled::open(path).map_err(|e| storage_err("open", e))?;
        Self::from_db(db)
    }

    /// Throwaway database removed on drop.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| storage_err("open temporary", e))?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self> {
        let envelopes = db
            .open_tree(ENVELOPES_TREE)
            .map_err(|e| storage_err("open_tree", e))?;
        let by_time = db
            .open_tree(BY_TIME_TREE)
            .map_err(|e| storage_err("open_tree", e))?;
        Ok(Self {
            db,
            envelopes,
            by_time,
        })
    }

    fn decode(bytes: &[u8]) -> Result<Envelope> {
        serde_json::from_slice(bytes).map_err(|e| DriftError::StorageError {
            reason: format!("stored envelope is corrupt: {e}"),
        })
    }
}

impl EnvelopeBackend for SledBackend {
    fn get(&self, id: &MessageId) -> Result<Option<Envelope>> {
        match self
            .envelopes
            .get(id.as_str())
            .map_err(|e| storage_err("get", e))?
        {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn contains(&self, id: &MessageId) -> Result<bool> {
        self.envelopes
            .contains_key(id.as_str())
            .map_err(|e| storage_err("contains_key", e))
    }

    fn put(&mut self, envelope: &Envelope) -> Result<()> {
        let json = serde_json::to_vec(envelope)?;
        let prev = self
            .envelopes
            .insert(envelope.id.as_str(), json)
            .map_err(|e| storage_err("insert", e))?;
        if let Some(bytes) = prev {
            let old = Self::decode(&bytes)?;
            self.by_time
                .remove(time_index_key(&old))
                .map_err(|e| storage_err("remove", e))?;
        }
        self.by_time
            .insert(time_index_key(envelope), Vec::<u8>::new())
            .map_err(|e| storage_err("insert", e))?;
        Ok(())
    }

    fn remove(&mut self, id: &MessageId) -> Result<Option<Envelope>> {
        let Some(bytes) = self
            .envelopes
            .remove(id.as_str())
            .map_err(|e| storage_err("remove", e))?
        else {
            return Ok(None);
        };
        let env = Self::decode(&bytes)?;
        self.by_time
            .remove(time_index_key(&env))
            .map_err(|e| storage_err("remove", e))?;
        Ok(Some(env))
    }

    fn len(&self) -> Result<usize> {
        Ok(self.envelopes.len())
    }

    fn ids(&self) -> Result<Vec<MessageId>> {
        let mut ids = Vec::with_capacity(self.envelopes.len());
        for item in self.by_time.iter() {
            let (key, _) = item.map_err(|e| storage_err("iter", e))?;
            let id = String::from_utf8_lossy(&key[8..]).into_owned();
            ids.push(MessageId::new(id));
        }
        Ok(ids)
    }

    fn oldest(&self) -> Result<Option<Envelope>> {
        let Some((key, _)) = self.by_time.first().map_err(|e| storage_err("first", e))? else {
            return Ok(None);
        };
        let id = MessageId::new(String::from_utf8_lossy(&key[8..]).into_owned());
        self.get(&id)
    }

    fn expired_ids(&self, now_millis: i64) -> Result<Vec<MessageId>> {
        let mut ids = Vec::new();
        for item in self.envelopes.iter() {
            let (_, bytes) = item.map_err(|e| storage_err("iter", e))?;
            let env = Self::decode(&bytes)?;
            if env.is_expired(now_millis) {
                ids.push(env.id);
            }
        }
        Ok(ids)
    }

    fn flush(&self) -> Result<()> {
        self.db.flush().map_err(|e| storage_err("flush", e))?;
        Ok(())
    }
}
