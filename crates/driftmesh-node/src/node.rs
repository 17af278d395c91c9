//! Node lifecycle and state machine.
//!
//! The [`Node`] is the public entry point of the driftmesh runtime.
//! It owns the routing engine and exposes a channel-based API to
//! consumers (UI, CLI, tests).
//!
//! # State machine
//!
//! ```text
//! Initializing ──start()──▶ Running ──shutdown()──▶ ShuttingDown ──▶ (dropped)
//! ```
//!
//! - `Initializing`: engine built, event loop not started.
//! - `Running`: event loop consuming link events and commands.
//! - `ShuttingDown`: in-flight routing tasks aborted, store flushed.
//!
//! Double-start and shutdown-from-initializing are rejected with
//! `DriftError::ConfigError`.

use std::sync::Arc;
use std::time::Duration;

use driftmesh_crypto::CryptoFacade;
use driftmesh_network::{LinkEvent, TransportHandle};
use driftmesh_storage::MessageStore;
use driftmesh_types::config::SettingsHandle;
use driftmesh_types::{DriftError, Result, StableId};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::collaborators::Collaborators;
use crate::command::NodeCommand;
use crate::config::NodeConfig;
use crate::engine::{LocalIdentity, RoutingEngine};
use crate::event_loop;
use crate::events::NodeEvent;

// ---------------------------------------------------------------------------
// NodeState
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NodeState {
    Initializing,
    Running,
    ShuttingDown,
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initializing => write!(f, "initializing"),
            Self::Running => write!(f, "running"),
            Self::ShuttingDown => write!(f, "shutting_down"),
        }
    }
}

// ---------------------------------------------------------------------------
// NodeLink
// ---------------------------------------------------------------------------

/// The node's side of a transport adapter: where to send commands and
/// where link events arrive.
#[derive(Debug)]
pub struct NodeLink {
    pub transport: TransportHandle,
    pub events: mpsc::Receiver<LinkEvent>,
}

// ---------------------------------------------------------------------------
// NodeRuntime (internal)
// ---------------------------------------------------------------------------

/// Owned state moved into the event loop task.
pub(crate) struct NodeRuntime {
    pub engine: Arc<RoutingEngine>,
    pub link_rx: mpsc::Receiver<LinkEvent>,
    pub command_rx: mpsc::Receiver<NodeCommand>,
    pub shutdown_rx: watch::Receiver<bool>,
    pub prune_interval: Duration,
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// A driftmesh node.
///
/// After [`Node::new`], call [`Node::start`] to spawn the event loop,
/// then drive it with [`NodeCommand`]s and watch [`NodeEvent`]s.
pub struct Node {
    state: NodeState,
    engine: Arc<RoutingEngine>,
    /// Moved into the event loop by `start()`.
    runtime: Option<NodeRuntime>,
    command_tx: mpsc::Sender<NodeCommand>,
    event_rx: Option<mpsc::Receiver<NodeEvent>>,
    shutdown_tx: watch::Sender<bool>,
}

impl Node {
    /// Builds a node around an existing store and transport link.
    ///
    /// # Errors
    ///
    /// `DriftError::ConfigError` if `config` is invalid.
    pub fn new(
        config: NodeConfig,
        stable_id: StableId,
        crypto: Arc<dyn CryptoFacade>,
        store: Arc<MessageStore>,
        settings: SettingsHandle,
        collaborators: Collaborators,
        link: NodeLink,
    ) -> Result<Self> {
        config.validate()?;

        let (command_tx, command_rx) = mpsc::channel(config.command_channel_size);
        let (event_tx, event_rx) = mpsc::channel(config.event_channel_size);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let engine = Arc::new(RoutingEngine::new(
            LocalIdentity::new(stable_id, config.display_name.clone()),
            crypto,
            store,
            link.transport,
            settings,
            collaborators,
            event_tx,
        ));

        let runtime = NodeRuntime {
            engine: engine.clone(),
            link_rx: link.events,
            command_rx,
            shutdown_rx,
            prune_interval: Duration::from_secs(config.prune_interval_secs),
        };

        Ok(Self {
            state: NodeState::Initializing,
            engine,
            runtime: Some(runtime),
            command_tx,
            event_rx: Some(event_rx),
            shutdown_tx,
        })
    }

    /// Spawns the event loop. Transitions `Initializing → Running`.
    ///
    /// # Errors
    ///
    /// `DriftError::ConfigError` if the node is not `Initializing`.
    pub fn start(&mut self) -> Result<JoinHandle<()>> {
        if self.state != NodeState::Initializing {
            return Err(DriftError::ConfigError {
                reason: format!(
                    "cannot start node in state '{}'; expected 'initializing'",
                    self.state,
                ),
            });
        }

        let runtime = self.runtime.take().ok_or_else(|| DriftError::ConfigError {
            reason: "runtime already consumed (double start?)".into(),
        })?;

        let handle = tokio::spawn(event_loop::run_event_loop(runtime));
        self.state = NodeState::Running;
        Ok(handle)
    }

    /// Signals the event loop to exit. Idempotent once running.
    ///
    /// # Errors
    ///
    /// `DriftError::ConfigError` if the node was never started.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.state == NodeState::Initializing {
            return Err(DriftError::ConfigError {
                reason: "cannot shutdown a node that has not been started".into(),
            });
        }
        if self.state == NodeState::ShuttingDown {
            return Ok(());
        }

        self.state = NodeState::ShuttingDown;
        let _ = self.shutdown_tx.send(true);
        Ok(())
    }

    pub fn command_sender(&self) -> mpsc::Sender<NodeCommand> {
        self.command_tx.clone()
    }

    /// Takes the event receiver. `None` if already taken.
    pub fn take_event_receiver(&mut self) -> Option<mpsc::Receiver<NodeEvent>> {
        self.event_rx.take()
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    /// Shared engine, for read access to the store, registry and
    /// collaborators.
    pub fn engine(&self) -> &Arc<RoutingEngine> {
        &self.engine
    }
}

#[cfg(test)]
mod tests {
    use driftmesh_crypto::HybridKeypair;
    use driftmesh_types::config::DtnSettings;

    use super::*;

    fn node() -> Result<Node> {
        let settings = SettingsHandle::new(DtnSettings::default())?;
        let (transport, _outbound) = TransportHandle::channel();
        let (_link_tx, link_rx) = mpsc::channel(8);
        Node::new(
            NodeConfig::new("alice"),
            StableId::new("alice-id"),
            Arc::new(HybridKeypair::generate()),
            Arc::new(MessageStore::in_memory(settings.clone())),
            settings,
            Collaborators::in_memory(),
            NodeLink {
                transport,
                events: link_rx,
            },
        )
    }

    #[test]
    fn new_node_is_initializing() -> Result<()> {
        let n = node()?;
        assert_eq!(n.state(), NodeState::Initializing);
        assert_eq!(n.state().to_string(), "initializing");
        Ok(())
    }

    #[test]
    fn shutdown_before_start_rejected() -> Result<()> {
        let mut n = node()?;
        assert!(n.shutdown().is_err());
        Ok(())
    }

    #[tokio::test]
    async fn double_start_rejected() -> Result<()> {
        let mut n = node()?;
        let handle = n.start()?;
        assert_eq!(n.state(), NodeState::Running);
        assert!(n.start().is_err());

        n.shutdown()?;
        n.shutdown()?;
        assert_eq!(n.state(), NodeState::ShuttingDown);
        handle.await.map_err(|e| DriftError::ConfigError {
            reason: e.to_string(),
        })?;
        Ok(())
    }

    #[test]
    fn event_receiver_taken_once() -> Result<()> {
        let mut n = node()?;
        assert!(n.take_event_receiver().is_some());
        assert!(n.take_event_receiver().is_none());
        Ok(())
    }
}
