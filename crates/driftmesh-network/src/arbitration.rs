//! Deterministic connection arbitration.
//!
//! When two devices discover each other, only the one with the
//! lexicographically smaller stable id requests the connection. Both
//! sides reach the same answer without exchanging anything.

use driftmesh_types::{EndpointId, StableId};

use crate::registry::PeerSnapshot;

/// Outcome of considering a freshly discovered peer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CandidateDecision {
    IgnoreSelf,
    AlreadyConnected,
    AlreadyPending,
    /// We have the smaller id; request the connection.
    Initiate,
    /// They have the smaller id; wait for them.
    AwaitRemote,
}

pub fn should_initiate(local: &StableId, remote: &StableId) -> bool {
    local < remote
}

/// Applies the skip rules and then the tie-break.
pub fn arbitrate(
    local: &StableId,
    snapshot: &PeerSnapshot,
    endpoint: &EndpointId,
    remote: &StableId,
) -> CandidateDecision {
    if remote == local {
        CandidateDecision::IgnoreSelf
    } else if snapshot.connected_by_stable_id(remote).is_some() {
        CandidateDecision::AlreadyConnected
    } else if snapshot.pending.contains_key(endpoint) {
        CandidateDecision::AlreadyPending
    } else if should_initiate(local, remote) {
        CandidateDecision::Initiate
    } else {
        CandidateDecision::AwaitRemote
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exactly_one_side_initiates() {
        let ids = ["alpha", "beta", "Gamma", "alpha2", "0", "zz", "a"];
        for x in ids {
            for y in ids {
                if x == y {
                    continue;
                }
                let (x, y) = (StableId::new(x), StableId::new(y));
                assert!(
                    should_initiate(&x, &y) ^ should_initiate(&y, &x),
                    "{x} vs {y}"
                );
            }
        }
    }

    #[test]
    fn never_initiate_to_self() {
        let me = StableId::new("me");
        assert!(!should_initiate(&me, &me));
        let d = arbitrate(&me, &PeerSnapshot::default(), &EndpointId::new("e"), &me);
        assert_eq!(d, CandidateDecision::IgnoreSelf);
    }

    #[test]
    fn smaller_id_initiates() {
        let snap = PeerSnapshot::default();
        let ep = EndpointId::new("e1");
        assert_eq!(
            arbitrate(&StableId::new("a"), &snap, &ep, &StableId::new("b")),
            CandidateDecision::Initiate
        );
        assert_eq!(
            arbitrate(&StableId::new("b"), &snap, &ep, &StableId::new("a")),
            CandidateDecision::AwaitRemote
        );
    }
}
