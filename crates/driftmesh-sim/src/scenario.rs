//! Relay-line scenario.
//!
//! Spawns `nodes` full nodes on one [`MemoryHub`], places each in radio
//! range of its neighbors only, waits for every link and discovery
//! handshake, then has the first node chat to the last. The last node
//! is a contact the first already holds a key for, so the message is
//! sealed end-to-end and only the last node can read it.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use driftmesh_crypto::{CryptoFacade, HybridKeypair};
use driftmesh_network::memory_link::MemoryHub;
use driftmesh_network::DeclaredIdentity;
use driftmesh_node::{
    Collaborators, Contact, ContactStatus, Node, NodeCommand, NodeConfig, NodeEvent, NodeLink,
};
use driftmesh_protocol::e2e::encode_public_key;
use driftmesh_storage::MessageStore;
use driftmesh_types::config::{DtnSettings, SettingsHandle};
use driftmesh_types::{DriftError, EndpointId, Result, StableId};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::SimConfig;

/// Outcome of one run.
#[derive(Clone, Debug)]
pub struct SimReport {
    pub delivered: bool,
    /// Hops consumed between the first and last node.
    pub hops_spent: Option<u32>,
    pub elapsed: Duration,
    /// Envelopes held per node at the end, first to last.
    pub stored: Vec<usize>,
}

struct SimNode {
    node: Node,
    handle: JoinHandle<()>,
    endpoint: EndpointId,
    stable_id: StableId,
    name: String,
    public_key: Vec<u8>,
}

impl SimNode {
    fn spawn(
        hub: &MemoryHub,
        index: usize,
        dtn: &DtnSettings,
        data_dir: Option<&Path>,
        sink: mpsc::UnboundedSender<(usize, NodeEvent)>,
    ) -> Result<Self> {
        let stable_id = StableId::new(format!("node-{index:02}"));
        let name = format!("node-{index}");
        let endpoint = EndpointId::new(format!("radio-{index}"));
        let config = NodeConfig::new(name.clone());
        config.validate()?;

        let settings = SettingsHandle::new(dtn.clone())?;
        let store = match data_dir {
            Some(dir) => MessageStore::open(&dir.join(stable_id.as_str()), settings.clone())?,
            None => MessageStore::in_memory(settings.clone()),
        };
        let keypair = HybridKeypair::generate();
        let public_key = keypair.my_public_key();

        let (link_tx, link_rx) = mpsc::channel(config.link_channel_size);
        let transport = hub.attach(
            endpoint.clone(),
            DeclaredIdentity::new(name.clone(), stable_id.clone()),
            link_tx,
        )?;

        let mut node = Node::new(
            config,
            stable_id.clone(),
            Arc::new(keypair),
            Arc::new(store),
            settings,
            Collaborators::in_memory(),
            NodeLink {
                transport,
                events: link_rx,
            },
        )?;

        let mut events = node.take_event_receiver().ok_or_else(|| DriftError::ConfigError {
            reason: "event receiver already taken".into(),
        })?;
        tokio::spawn(async move {
            while let Some(ev) = events.recv().await {
                tracing::debug!(node = index, event = ?ev, "node event");
                if sink.send((index, ev)).is_err() {
                    break;
                }
            }
        });

        let handle = node.start()?;
        Ok(Self {
            node,
            handle,
            endpoint,
            stable_id,
            name,
            public_key,
        })
    }

    /// Records `other` as an existing friend.
    fn befriend(&self, other: &SimNode) -> Result<()> {
        self.node.engine().collaborators().contacts.upsert(Contact {
            stable_id: other.stable_id.clone(),
            name: other.name.clone(),
            public_key: encode_public_key(&other.public_key),
            status: ContactStatus::Friend,
        })
    }

    /// Connected to `expected` neighbors, all with bound keys.
    fn links_ready(&self, expected: usize) -> bool {
        let peers = self.node.engine().registry().connected_peers();
        peers.len() == expected && peers.iter().all(|p| p.public_key.is_some())
    }
}

fn transport_err(what: &str) -> DriftError {
    DriftError::TransportError {
        reason: format!("{what}: node event loop is gone"),
    }
}

/// Runs the relay-line scenario described by `config`.
pub async fn run_relay_line(config: &SimConfig) -> Result<SimReport> {
    config.validate()?;
    let started = Instant::now();
    let deadline = started + Duration::from_secs(config.timeout_secs);

    let hub = MemoryHub::new();
    let dtn = config.dtn_settings();
    let (sink, mut node_events) = mpsc::unbounded_channel();

    let mut nodes = Vec::with_capacity(config.nodes);
    for index in 0..config.nodes {
        nodes.push(SimNode::spawn(
            &hub,
            index,
            &dtn,
            config.data_dir.as_deref(),
            sink.clone(),
        )?);
    }
    let last = nodes.len() - 1;
    nodes[0].befriend(&nodes[last])?;

    for pair in nodes.windows(2) {
        hub.bring_in_range(&pair[0].endpoint, &pair[1].endpoint).await?;
    }

    // Wait for every link and handshake.
    loop {
        let ready = nodes.iter().enumerate().all(|(i, n)| {
            let expected = if i == 0 || i == last { 1 } else { 2 };
            n.links_ready(expected)
        });
        if ready {
            break;
        }
        if Instant::now() >= deadline {
            return Err(DriftError::TransportError {
                reason: "relay line did not come up before the timeout".into(),
            });
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    tracing::info!(nodes = nodes.len(), elapsed = ?started.elapsed(), "relay line up");

    let (reply, answer) = oneshot::channel();
    nodes[0]
        .node
        .command_sender()
        .send(NodeCommand::SendChat {
            destination: nodes[last].stable_id.to_string(),
            text: config.message.clone(),
            reply,
        })
        .await
        .map_err(|_| transport_err("send chat"))?;
    let message_id = answer.await.map_err(|_| transport_err("send chat reply"))??;
    tracing::info!(%message_id, to = %nodes[last].stable_id, "message originated");

    let mut delivered = false;
    while let Ok(Some((index, ev))) = tokio::time::timeout_at(deadline, node_events.recv()).await {
        if let NodeEvent::ChatReceived { from, message, .. } = ev {
            if index == last {
                tracing::info!(%from, text = %message.text, "delivered at the far end");
                delivered = true;
                break;
            }
        }
    }

    let hops_spent = nodes[last]
        .node
        .engine()
        .store()
        .get(&message_id)?
        .map(|env| dtn.hop_budget - env.hop_count);
    let mut stored = Vec::with_capacity(nodes.len());
    for n in &nodes {
        stored.push(n.node.engine().store().count()?);
    }

    for n in &mut nodes {
        n.node.shutdown()?;
    }
    for n in nodes {
        if let Err(e) = n.handle.await {
            tracing::warn!(%e, "node task ended abnormally");
        }
    }

    Ok(SimReport {
        delivered,
        hops_spent,
        elapsed: started.elapsed(),
        stored,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn message_crosses_the_line() -> Result<()> {
        let config = SimConfig {
            nodes: 4,
            timeout_secs: 10,
            ..SimConfig::default()
        };
        let report = run_relay_line(&config).await?;
        assert!(report.delivered);
        assert_eq!(report.hops_spent, Some(3));
        assert_eq!(report.stored.len(), 4);
        Ok(())
    }

    #[tokio::test]
    async fn short_budget_stops_short() -> Result<()> {
        let config = SimConfig {
            nodes: 5,
            hop_budget: 2,
            timeout_secs: 2,
            ..SimConfig::default()
        };
        let report = run_relay_line(&config).await?;
        assert!(!report.delivered);
        assert_eq!(report.hops_spent, None);
        Ok(())
    }
}
