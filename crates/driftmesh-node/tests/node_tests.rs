//! Full nodes with event loops over the in-memory hub.

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use driftmesh_crypto::HybridKeypair;
use driftmesh_network::memory_link::MemoryHub;
use driftmesh_network::DeclaredIdentity;
use driftmesh_node::{
    Collaborators, DisconnectTarget, Node, NodeCommand, NodeConfig, NodeEvent, NodeLink,
    NodeState,
};
use driftmesh_storage::MessageStore;
use driftmesh_types::config::{DtnSettings, SettingsHandle};
use driftmesh_types::{EndpointId, StableId};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

type TestResult = Result<(), Box<dyn Error>>;

struct Running {
    node: Node,
    handle: JoinHandle<()>,
    events: mpsc::Receiver<NodeEvent>,
    endpoint: EndpointId,
}

fn spawn_node(hub: &MemoryHub, id: &str) -> Result<Running, Box<dyn Error>> {
    let name = id.to_uppercase();
    let settings = SettingsHandle::new(DtnSettings::default())?;
    let endpoint = EndpointId::new(format!("ep-{id}"));
    let (link_tx, link_rx) = mpsc::channel(1024);
    let transport = hub.attach(
        endpoint.clone(),
        DeclaredIdentity::new(name.clone(), StableId::new(id)),
        link_tx,
    )?;

    let mut node = Node::new(
        NodeConfig::new(name),
        StableId::new(id),
        Arc::new(HybridKeypair::generate()),
        Arc::new(MessageStore::in_memory(settings.clone())),
        settings,
        Collaborators::in_memory(),
        NodeLink {
            transport,
            events: link_rx,
        },
    )?;
    let events = node.take_event_receiver().ok_or("event receiver missing")?;
    let handle = node.start()?;
    Ok(Running {
        node,
        handle,
        events,
        endpoint,
    })
}

async fn wait_for<F>(events: &mut mpsc::Receiver<NodeEvent>, mut pred: F) -> Result<NodeEvent, Box<dyn Error>>
where
    F: FnMut(&NodeEvent) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let ev = tokio::time::timeout_at(deadline, events.recv())
            .await?
            .ok_or("event channel closed")?;
        if pred(&ev) {
            return Ok(ev);
        }
    }
}

async fn wait_until<F>(mut cond: F) -> TestResult
where
    F: FnMut() -> bool,
{
    for _ in 0..500 {
        if cond() {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    Err("condition not reached".into())
}

#[tokio::test]
async fn two_nodes_meet_and_chat() -> TestResult {
    let hub = MemoryHub::new();
    let mut alice = spawn_node(&hub, "alice")?;
    let mut bob = spawn_node(&hub, "bob")?;

    hub.bring_in_range(&alice.endpoint, &bob.endpoint).await?;
    wait_for(&mut alice.events, |e| matches!(e, NodeEvent::PeerConnected { .. })).await?;
    wait_for(&mut bob.events, |e| matches!(e, NodeEvent::PeerConnected { .. })).await?;

    // Both handshakes processed: each side has the other's key.
    let (a, b) = (alice.node.engine().clone(), bob.node.engine().clone());
    wait_until(|| {
        let a_knows = a.collaborators().contacts.get(&StableId::new("bob")).ok().flatten().is_some();
        let b_knows = b.collaborators().contacts.get(&StableId::new("alice")).ok().flatten().is_some();
        a_knows && b_knows
    })
    .await?;

    let (tx, rx) = oneshot::channel();
    alice
        .node
        .command_sender()
        .send(NodeCommand::SendChat {
            destination: "bob".into(),
            text: "trailhead at nine".into(),
            reply: tx,
        })
        .await?;
    let id = rx.await??;

    let ev = wait_for(&mut bob.events, |e| matches!(e, NodeEvent::ChatReceived { .. })).await?;
    let NodeEvent::ChatReceived { conversation, message, .. } = ev else {
        return Err("unexpected event".into());
    };
    assert_eq!(conversation, "alice");
    assert_eq!(message.text, "trailhead at nine");
    assert!(bob.node.engine().store().contains(&id)?);

    let (tx, rx) = oneshot::channel();
    bob.node
        .command_sender()
        .send(NodeCommand::GetStatus { reply: tx })
        .await?;
    let status = rx.await??;
    assert_eq!(status.connected_peers, 1);
    assert_eq!(status.name, "BOB");
    assert_eq!(status.state, NodeState::Running);

    let (tx, rx) = oneshot::channel();
    alice
        .node
        .command_sender()
        .send(NodeCommand::Disconnect {
            target: DisconnectTarget::All,
            reply: tx,
        })
        .await?;
    rx.await??;
    wait_for(&mut bob.events, |e| matches!(e, NodeEvent::PeerDisconnected { .. })).await?;

    alice.node.shutdown()?;
    bob.node.command_sender().send(NodeCommand::Shutdown).await?;
    alice.handle.await?;
    bob.handle.await?;
    Ok(())
}

#[tokio::test]
async fn connection_request_to_undiscovered_peer_fails() -> TestResult {
    let hub = MemoryHub::new();
    let mut alice = spawn_node(&hub, "alice")?;

    let (tx, rx) = oneshot::channel();
    alice
        .node
        .command_sender()
        .send(NodeCommand::RequestConnection {
            stable_id: StableId::new("nobody"),
            reply: tx,
        })
        .await?;
    assert!(rx.await?.is_err());

    alice.node.shutdown()?;
    alice.handle.await?;
    Ok(())
}

#[tokio::test]
async fn settings_update_validated() -> TestResult {
    let hub = MemoryHub::new();
    let mut alice = spawn_node(&hub, "alice")?;
    let sender = alice.node.command_sender();

    let (tx, rx) = oneshot::channel();
    let bad = DtnSettings {
        hop_budget: 0,
        ..DtnSettings::default()
    };
    sender
        .send(NodeCommand::UpdateSettings { settings: bad, reply: tx })
        .await?;
    assert!(rx.await?.is_err());

    let (tx, rx) = oneshot::channel();
    let good = DtnSettings {
        hop_budget: 4,
        ..DtnSettings::default()
    };
    sender
        .send(NodeCommand::UpdateSettings { settings: good, reply: tx })
        .await?;
    rx.await??;
    assert_eq!(alice.node.engine().settings().snapshot().hop_budget, 4);

    alice.node.shutdown()?;
    alice.handle.await?;
    Ok(())
}

#[tokio::test]
async fn channel_commands() -> TestResult {
    let hub = MemoryHub::new();
    let mut alice = spawn_node(&hub, "alice")?;
    let sender = alice.node.command_sender();

    let (tx, rx) = oneshot::channel();
    sender
        .send(NodeCommand::CreateChannel {
            name: "ridge".into(),
            description: "weekend hikes".into(),
            is_public: false,
            reply: tx,
        })
        .await?;
    let id = rx.await??;
    assert!(id.starts_with("group:"));

    let channels = &alice.node.engine().collaborators().channels;
    let created = channels.get(&id)?.ok_or("channel not stored")?;
    assert_eq!(created.description, "weekend hikes");
    assert!(channels.is_member(&id, &StableId::new("alice"))?);

    let (tx, rx) = oneshot::channel();
    sender
        .send(NodeCommand::JoinChannel {
            channel_id: "group:nowhere".into(),
            reply: tx,
        })
        .await?;
    assert!(rx.await?.is_err());

    let (tx, rx) = oneshot::channel();
    sender
        .send(NodeCommand::RejectFriendRequest {
            stable_id: StableId::new("stranger"),
            reply: tx,
        })
        .await?;
    assert!(rx.await?.is_err());

    alice.node.shutdown()?;
    alice.handle.await?;
    Ok(())
}
