//! Contact, channel and conversation stores.
//!
//! The routing engine treats these as synchronous request/response
//! capabilities. Real deployments back them with whatever database the
//! host application uses; the in-memory implementations here serve
//! tests, the simulator and embedders that need nothing durable.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use driftmesh_protocol::{Channel, ChatMessage};
use driftmesh_types::{DriftError, Result, StableId};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Contacts
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactStatus {
    Friend,
    RequestSent,
    RequestReceived,
    /// Seen in a discovery handshake, no friendship yet.
    Known,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub stable_id: StableId,
    pub name: String,
    /// Base64 public key.
    pub public_key: String,
    pub status: ContactStatus,
}

pub trait ContactBook: Send + Sync {
    fn get(&self, id: &StableId) -> Result<Option<Contact>>;

    fn upsert(&self, contact: Contact) -> Result<()>;

    /// Deletes the contact, returning it if it existed.
    fn remove(&self, id: &StableId) -> Result<Option<Contact>>;

    fn all(&self) -> Result<Vec<Contact>>;
}

// ---------------------------------------------------------------------------
// Channels
// ---------------------------------------------------------------------------

pub trait ChannelDirectory: Send + Sync {
    fn get(&self, channel_id: &str) -> Result<Option<Channel>>;

    /// Stores `channel`, union-merging with any existing record.
    fn merge(&self, channel: Channel) -> Result<()>;

    fn public_channels(&self) -> Result<Vec<Channel>>;

    fn is_member(&self, channel_id: &str, member: &StableId) -> Result<bool>;

    fn add_member(&self, channel_id: &str, member: StableId) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Conversations
// ---------------------------------------------------------------------------

pub trait ConversationLog: Send + Sync {
    /// Appends to the conversation keyed by a stable id (direct) or a
    /// group id.
    fn append(&self, conversation: &str, message: ChatMessage) -> Result<()>;

    fn messages(&self, conversation: &str) -> Result<Vec<ChatMessage>>;
}

/// The three stores bundled for the engine.
#[derive(Clone)]
pub struct Collaborators {
    pub contacts: Arc<dyn ContactBook>,
    pub channels: Arc<dyn ChannelDirectory>,
    pub conversations: Arc<dyn ConversationLog>,
}

impl Collaborators {
    pub fn in_memory() -> Self {
        Self {
            contacts: Arc::new(MemoryContacts::default()),
            channels: Arc::new(MemoryChannels::default()),
            conversations: Arc::new(MemoryConversations::default()),
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory implementations
// ---------------------------------------------------------------------------

fn lock<'a, T>(m: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>> {
    m.lock().map_err(|e| DriftError::StorageError {
        reason: format!("{what} lock poisoned: {e}"),
    })
}

#[derive(Default)]
pub struct MemoryContacts {
    inner: Mutex<HashMap<StableId, Contact>>,
}

impl ContactBook for MemoryContacts {
    fn get(&self, id: &StableId) -> Result<Option<Contact>> {
        Ok(lock(&self.inner, "contacts")?.get(id).cloned())
    }

    fn upsert(&self, contact: Contact) -> Result<()> {
        lock(&self.inner, "contacts")?.insert(contact.stable_id.clone(), contact);
        Ok(())
    }

    fn remove(&self, id: &StableId) -> Result<Option<Contact>> {
        Ok(lock(&self.inner, "contacts")?.remove(id))
    }

    fn all(&self) -> Result<Vec<Contact>> {
        Ok(lock(&self.inner, "contacts")?.values().cloned().collect())
    }
}

#[derive(Default)]
pub struct MemoryChannels {
    inner: Mutex<HashMap<String, Channel>>,
}

impl ChannelDirectory for MemoryChannels {
    fn get(&self, channel_id: &str) -> Result<Option<Channel>> {
        Ok(lock(&self.inner, "channels")?.get(channel_id).cloned())
    }

    fn merge(&self, channel: Channel) -> Result<()> {
        let mut map = lock(&self.inner, "channels")?;
        match map.get_mut(&channel.id) {
            Some(existing) => existing.merge(&channel),
            None => {
                map.insert(channel.id.clone(), channel);
            }
        }
        Ok(())
    }

    fn public_channels(&self) -> Result<Vec<Channel>> {
        Ok(lock(&self.inner, "channels")?
            .values()
            .filter(|c| c.is_public)
            .cloned()
            .collect())
    }

    fn is_member(&self, channel_id: &str, member: &StableId) -> Result<bool> {
        Ok(lock(&self.inner, "channels")?
            .get(channel_id)
            .is_some_and(|c| c.is_member(member)))
    }

    fn add_member(&self, channel_id: &str, member: StableId) -> Result<()> {
        let mut map = lock(&self.inner, "channels")?;
        let channel = map
            .get_mut(channel_id)
            .ok_or_else(|| DriftError::StorageError {
                reason: format!("unknown channel {channel_id}"),
            })?;
        channel.add_member(member);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryConversations {
    inner: Mutex<HashMap<String, Vec<ChatMessage>>>,
}

impl ConversationLog for MemoryConversations {
    fn append(&self, conversation: &str, message: ChatMessage) -> Result<()> {
        lock(&self.inner, "conversations")?
            .entry(conversation.to_owned())
            .or_default()
            .push(message);
        Ok(())
    }

    fn messages(&self, conversation: &str) -> Result<Vec<ChatMessage>> {
        Ok(lock(&self.inner, "conversations")?
            .get(conversation)
            .cloned()
            .unwrap_or_default())
    }
}
