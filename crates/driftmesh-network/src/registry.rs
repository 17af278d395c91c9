//! Live view of peers around this device.
//!
//! The whole view is one [`PeerSnapshot`] value held in a
//! `tokio::sync::watch` channel. Every mutation is a single
//! `send_modify`/`send_if_modified` closure over the current value, so
//! a read-modify-write never interleaves with another writer and
//! subscribers always observe complete snapshots.
//!
//! Three maps, all keyed by transport endpoint:
//!
//! - `discovered`: advertising and in range
//! - `pending`: connection attempt in flight
//! - `connected`: link up; identity and key bound by the discovery
//!   handshake

use std::collections::HashMap;
use std::sync::Arc;

use driftmesh_types::{EndpointId, StableId};
use tokio::sync::watch;

use crate::arbitration::{arbitrate, CandidateDecision};
use crate::identity::DeclaredIdentity;

// ---------------------------------------------------------------------------
// PeerInfo / PeerSnapshot
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PeerInfo {
    pub endpoint: EndpointId,
    pub name: String,
    pub stable_id: StableId,
    /// Set once the peer's discovery handshake has been processed.
    pub public_key: Option<Vec<u8>>,
}

impl PeerInfo {
    pub fn from_declared(endpoint: EndpointId, identity: &DeclaredIdentity) -> Self {
        Self {
            endpoint,
            name: identity.name.clone(),
            stable_id: identity.stable_id.clone(),
            public_key: None,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct PeerSnapshot {
    pub discovered: HashMap<EndpointId, PeerInfo>,
    pub pending: HashMap<EndpointId, PeerInfo>,
    pub connected: HashMap<EndpointId, PeerInfo>,
}

impl PeerSnapshot {
    pub fn connected_by_stable_id(&self, id: &StableId) -> Option<&PeerInfo> {
        self.connected.values().find(|p| &p.stable_id == id)
    }

    pub fn discovered_by_stable_id(&self, id: &StableId) -> Option<&PeerInfo> {
        self.discovered.values().find(|p| &p.stable_id == id)
    }
}

// ---------------------------------------------------------------------------
// PeerRegistry
// ---------------------------------------------------------------------------

/// Cloneable handle to the shared peer view.
#[derive(Clone, Debug)]
pub struct PeerRegistry {
    local: StableId,
    state: Arc<watch::Sender<PeerSnapshot>>,
}

impl PeerRegistry {
    pub fn new(local: StableId) -> Self {
        let (tx, _rx) = watch::channel(PeerSnapshot::default());
        Self {
            local,
            state: Arc::new(tx),
        }
    }

    pub fn local_id(&self) -> &StableId {
        &self.local
    }

    /// Receiver that observes every committed snapshot.
    pub fn subscribe(&self) -> watch::Receiver<PeerSnapshot> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> PeerSnapshot {
        self.state.borrow().clone()
    }

    // ----- link lifecycle -------------------------------------------------

    /// Records a discovered peer and decides whether we should connect.
    ///
    /// On [`CandidateDecision::Initiate`] the endpoint is also marked
    /// pending in the same update, so a second discovery of the same
    /// endpoint cannot trigger a second request.
    pub fn consider_candidate(
        &self,
        endpoint: &EndpointId,
        identity: &DeclaredIdentity,
    ) -> CandidateDecision {
        let mut decision = CandidateDecision::IgnoreSelf;
        self.state.send_if_modified(|snap| {
            decision = arbitrate(&self.local, snap, endpoint, &identity.stable_id);
            if decision == CandidateDecision::IgnoreSelf {
                return false;
            }
            let info = PeerInfo::from_declared(endpoint.clone(), identity);
            snap.discovered.insert(endpoint.clone(), info.clone());
            if decision == CandidateDecision::Initiate {
                snap.pending.insert(endpoint.clone(), info);
            }
            true
        });
        decision
    }

    pub fn mark_pending(&self, endpoint: &EndpointId, identity: &DeclaredIdentity) {
        self.state.send_modify(|snap| {
            snap.pending
                .insert(endpoint.clone(), PeerInfo::from_declared(endpoint.clone(), identity));
        });
    }

    /// Promotes `endpoint` to connected. Any key learned earlier for
    /// the same stable id is kept.
    pub fn mark_connected(&self, endpoint: &EndpointId, identity: &DeclaredIdentity) -> PeerInfo {
        let mut info = PeerInfo::from_declared(endpoint.clone(), identity);
        self.state.send_modify(|snap| {
            snap.pending.remove(endpoint);
            info.public_key = snap
                .discovered
                .get(endpoint)
                .and_then(|p| p.public_key.clone());
            snap.connected.insert(endpoint.clone(), info.clone());
        });
        info
    }

    pub fn connection_failed(&self, endpoint: &EndpointId) {
        self.state.send_if_modified(|snap| snap.pending.remove(endpoint).is_some());
    }

    /// Drops every record of `endpoint`. Returns the connected entry,
    /// if there was one.
    pub fn disconnected(&self, endpoint: &EndpointId) -> Option<PeerInfo> {
        let mut removed = None;
        self.state.send_modify(|snap| {
            removed = snap.connected.remove(endpoint);
            snap.pending.remove(endpoint);
            snap.discovered.remove(endpoint);
        });
        removed
    }

    pub fn lost(&self, endpoint: &EndpointId) {
        self.state
            .send_if_modified(|snap| snap.discovered.remove(endpoint).is_some());
    }

    /// Binds the identity and key proven by a discovery handshake to
    /// the endpoint it arrived on, in both the connected and the
    /// discovered views.
    pub fn bind_identity(
        &self,
        endpoint: &EndpointId,
        stable_id: &StableId,
        name: &str,
        public_key: Vec<u8>,
    ) {
        self.state.send_modify(|snap| {
            let bound = PeerInfo {
                endpoint: endpoint.clone(),
                name: name.to_owned(),
                stable_id: stable_id.clone(),
                public_key: Some(public_key),
            };
            if let Some(entry) = snap.connected.get_mut(endpoint) {
                *entry = bound.clone();
            }
            snap.discovered.insert(endpoint.clone(), bound);
        });
    }

    // ----- lookups --------------------------------------------------------

    pub fn connected_peers(&self) -> Vec<PeerInfo> {
        self.state.borrow().connected.values().cloned().collect()
    }

    pub fn connected_count(&self) -> usize {
        self.state.borrow().connected.len()
    }

    pub fn connected_by_stable_id(&self, id: &StableId) -> Option<PeerInfo> {
        self.state.borrow().connected_by_stable_id(id).cloned()
    }

    pub fn discovered_by_stable_id(&self, id: &StableId) -> Option<PeerInfo> {
        self.state.borrow().discovered_by_stable_id(id).cloned()
    }

    /// The peer that sent bytes on `endpoint`: a connected peer first,
    /// otherwise one still connecting. `None` if we have no record.
    pub fn resolve_sender(&self, endpoint: &EndpointId) -> Option<PeerInfo> {
        let snap = self.state.borrow();
        snap.connected
            .get(endpoint)
            .or_else(|| snap.pending.get(endpoint))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ep(s: &str) -> EndpointId {
        EndpointId::new(s)
    }

    fn ident(name: &str, id: &str) -> DeclaredIdentity {
        DeclaredIdentity::new(name, StableId::new(id))
    }

    #[test]
    fn candidate_with_larger_id_is_initiated_once() {
        let reg = PeerRegistry::new(StableId::new("a"));
        let bob = ident("Bob", "b");
        assert_eq!(reg.consider_candidate(&ep("e1"), &bob), CandidateDecision::Initiate);
        assert_eq!(
            reg.consider_candidate(&ep("e1"), &bob),
            CandidateDecision::AlreadyPending
        );
        assert!(reg.discovered_by_stable_id(&StableId::new("b")).is_some());
    }

    #[test]
    fn candidate_with_smaller_id_is_awaited() {
        let reg = PeerRegistry::new(StableId::new("m"));
        assert_eq!(
            reg.consider_candidate(&ep("e1"), &ident("A", "a")),
            CandidateDecision::AwaitRemote
        );
        assert!(reg.snapshot().pending.is_empty());
    }

    #[test]
    fn self_advertisement_ignored() {
        let reg = PeerRegistry::new(StableId::new("a"));
        assert_eq!(
            reg.consider_candidate(&ep("e0"), &ident("me", "a")),
            CandidateDecision::IgnoreSelf
        );
        assert!(reg.snapshot().discovered.is_empty());
    }

    #[test]
    fn connected_peer_is_not_reconsidered() {
        let reg = PeerRegistry::new(StableId::new("a"));
        reg.mark_connected(&ep("e1"), &ident("B", "b"));
        assert_eq!(
            reg.consider_candidate(&ep("e9"), &ident("B", "b")),
            CandidateDecision::AlreadyConnected
        );
    }

    #[test]
    fn lifecycle_pending_connected_disconnected() {
        let reg = PeerRegistry::new(StableId::new("a"));
        let e = ep("e1");
        reg.mark_pending(&e, &ident("B", "b"));
        assert!(reg.resolve_sender(&e).is_some());

        reg.mark_connected(&e, &ident("B", "b"));
        assert!(reg.snapshot().pending.is_empty());
        assert_eq!(reg.connected_count(), 1);

        let gone = reg.disconnected(&e);
        assert_eq!(gone.map(|p| p.stable_id), Some(StableId::new("b")));
        assert!(reg.resolve_sender(&e).is_none());
    }

    #[test]
    fn failed_attempt_clears_pending() {
        let reg = PeerRegistry::new(StableId::new("a"));
        reg.mark_pending(&ep("e1"), &ident("B", "b"));
        reg.connection_failed(&ep("e1"));
        assert!(reg.resolve_sender(&ep("e1")).is_none());
    }

    #[test]
    fn bind_identity_sets_key_on_connected_entry() {
        let reg = PeerRegistry::new(StableId::new("a"));
        let e = ep("e1");
        reg.mark_connected(&e, &ident("B", "b"));
        reg.bind_identity(&e, &StableId::new("b"), "Bobby", vec![9; 32]);

        let peer = reg.connected_by_stable_id(&StableId::new("b"));
        assert_eq!(peer.as_ref().and_then(|p| p.public_key.clone()), Some(vec![9; 32]));
        assert_eq!(peer.map(|p| p.name), Some("Bobby".to_string()));
        assert!(reg.discovered_by_stable_id(&StableId::new("b")).is_some());
    }

    #[test]
    fn lost_only_touches_discovered() {
        let reg = PeerRegistry::new(StableId::new("a"));
        let e = ep("e1");
        reg.consider_candidate(&e, &ident("B", "b"));
        reg.mark_connected(&e, &ident("B", "b"));
        reg.lost(&e);
        assert!(reg.discovered_by_stable_id(&StableId::new("b")).is_none());
        assert_eq!(reg.connected_count(), 1);
    }

    #[test]
    fn subscribers_see_whole_snapshots() {
        let reg = PeerRegistry::new(StableId::new("a"));
        let mut rx = reg.subscribe();
        reg.mark_connected(&ep("e1"), &ident("B", "b"));
        assert!(rx.has_changed().unwrap_or(false));
        let snap = rx.borrow_and_update().clone();
        assert!(snap.connected.contains_key(&ep("e1")));
        assert!(snap.pending.is_empty());
    }
}
