//! Deterministic multi-node harness.
//!
//! Engines are driven directly, without event loops: each node's
//! outbound link commands are drained by hand and the bytes handed to
//! the addressed neighbor's `handle_frame`.

#![allow(dead_code)]

use std::sync::Arc;

use driftmesh_crypto::{CryptoFacade, HybridKeypair};
use driftmesh_network::{DeclaredIdentity, LinkCommand, PeerInfo, TransportHandle};
use driftmesh_node::{
    Collaborators, Contact, ContactStatus, LocalIdentity, NodeEvent, ReceiveOutcome, RoutingEngine,
};
use driftmesh_protocol::e2e::encode_public_key;
use driftmesh_storage::MessageStore;
use driftmesh_types::config::{DtnSettings, SettingsHandle};
use driftmesh_types::{EndpointId, Result, StableId};
use tokio::sync::mpsc;

/// Routes engine logs to the test harness. `RUST_LOG` picks the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub struct TestNode {
    pub engine: Arc<RoutingEngine>,
    pub endpoint: EndpointId,
    pub public_key: Vec<u8>,
    pub events: mpsc::Receiver<NodeEvent>,
    outbound: mpsc::UnboundedReceiver<LinkCommand>,
}

impl TestNode {
    pub fn new(id: &str) -> Result<Self> {
        Self::with_settings(id, DtnSettings::default())
    }

    pub fn with_settings(id: &str, settings: DtnSettings) -> Result<Self> {
        init_tracing();
        let settings = SettingsHandle::new(settings)?;
        let keypair = HybridKeypair::generate();
        let public_key = keypair.my_public_key();
        let (transport, outbound) = TransportHandle::channel();
        let (event_tx, events) = mpsc::channel(256);

        let engine = RoutingEngine::new(
            LocalIdentity::new(StableId::new(id), id.to_uppercase()),
            Arc::new(keypair),
            Arc::new(MessageStore::in_memory(settings.clone())),
            transport,
            settings,
            Collaborators::in_memory(),
            event_tx,
        );
        Ok(Self {
            engine: Arc::new(engine),
            endpoint: EndpointId::new(format!("ep-{id}")),
            public_key,
            events,
            outbound,
        })
    }

    pub fn id(&self) -> StableId {
        self.engine.local_id().clone()
    }

    fn declared(&self) -> DeclaredIdentity {
        DeclaredIdentity::new(self.engine.identity().name.clone(), self.id())
    }

    /// How `other` looks from this node once linked.
    pub fn peer_info(&self, other: &TestNode) -> Result<PeerInfo> {
        self.engine
            .registry()
            .resolve_sender(&other.endpoint)
            .ok_or_else(|| driftmesh_types::DriftError::UnknownPeer {
                reason: format!("{} not linked to {}", other.endpoint, self.endpoint),
            })
    }

    /// Everything queued for the transport since the last drain.
    pub fn drain(&mut self) -> Vec<LinkCommand> {
        let mut out = Vec::new();
        while let Ok(cmd) = self.outbound.try_recv() {
            out.push(cmd);
        }
        out
    }

    pub fn drain_events(&mut self) -> Vec<NodeEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = self.events.try_recv() {
            out.push(ev);
        }
        out
    }

    /// Records `other` as a known contact with its key.
    pub fn learn_contact(&self, other: &TestNode) -> Result<()> {
        self.engine.collaborators().contacts.upsert(Contact {
            stable_id: other.id(),
            name: other.engine.identity().name.clone(),
            public_key: encode_public_key(&other.public_key),
            status: ContactStatus::Known,
        })
    }
}

/// Connects `a` and `b` as if the link and both discovery handshakes
/// had completed: each side knows the other's key.
pub fn link(a: &TestNode, b: &TestNode) {
    link_unkeyed(a, b);
    a.engine
        .registry()
        .bind_identity(&b.endpoint, &b.id(), &b.engine.identity().name, b.public_key.clone());
    b.engine
        .registry()
        .bind_identity(&a.endpoint, &a.id(), &a.engine.identity().name, a.public_key.clone());
}

/// Connects `a` and `b` at the link layer only; no keys known yet.
pub fn link_unkeyed(a: &TestNode, b: &TestNode) {
    a.engine.registry().mark_connected(&b.endpoint, &b.declared());
    b.engine.registry().mark_connected(&a.endpoint, &a.declared());
}

/// One frame handed from one node to another.
pub struct Delivery {
    pub from: EndpointId,
    pub to: EndpointId,
    pub outcome: Result<ReceiveOutcome>,
}

/// Delivers queued frames between `nodes` until none are left.
/// Frames to endpoints outside `nodes` are discarded.
pub async fn pump(nodes: &mut [TestNode]) -> Vec<Delivery> {
    let mut log = Vec::new();
    loop {
        let mut batch = Vec::new();
        for node in nodes.iter_mut() {
            let from = node.endpoint.clone();
            for cmd in node.drain() {
                if let LinkCommand::Send { endpoint, bytes } = cmd {
                    batch.push((from.clone(), endpoint, bytes));
                }
            }
        }
        if batch.is_empty() {
            return log;
        }
        for (from, to, bytes) in batch {
            let Some(target) = nodes.iter().find(|n| n.endpoint == to) else {
                continue;
            };
            let outcome = target.engine.handle_frame(&from, &bytes).await;
            log.push(Delivery { from, to, outcome });
        }
    }
}

/// Endpoints addressed by the `Send` commands in `cmds`.
pub fn send_targets(cmds: &[LinkCommand]) -> Vec<EndpointId> {
    let mut out: Vec<_> = cmds
        .iter()
        .filter_map(|c| match c {
            LinkCommand::Send { endpoint, .. } => Some(endpoint.clone()),
            _ => None,
        })
        .collect();
    out.sort();
    out
}
