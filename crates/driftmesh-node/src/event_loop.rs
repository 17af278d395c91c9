//! Main event loop driving the node.
//!
//! [`run_event_loop`] is spawned by [`Node::start`](crate::Node::start)
//! and multiplexes with `tokio::select!`:
//!
//! 1. **Link events**: registry bookkeeping inline, routing work
//!    spawned.
//! 2. **Commands**: sends spawned, queries answered inline.
//! 3. **Finished routing tasks**: reaped so panics get logged.
//! 4. **Shutdown signal** via the `watch` channel.
//!
//! Routing work runs in a `JoinSet` so link servicing never waits on
//! crypto or storage, and so shutdown can abort it wholesale. The
//! expiry sweep runs as its own task for the lifetime of the loop.

use std::sync::Arc;

use driftmesh_network::DeclaredIdentity;
use driftmesh_types::{DriftError, Result, StableId};
use tokio::task::{JoinHandle, JoinSet};

use crate::command::{DisconnectTarget, NodeCommand, NodeStatus};
use crate::engine::RoutingEngine;
use crate::link;
use crate::maintenance;
use crate::node::{NodeRuntime, NodeState};

// ---------------------------------------------------------------------------
// Event loop entry point
// ---------------------------------------------------------------------------

pub(crate) async fn run_event_loop(mut rt: NodeRuntime) {
    tracing::info!(stable_id = %rt.engine.local_id(), "node event loop started");

    let prune_task = maintenance::spawn_prune_task(rt.engine.store.clone(), rt.prune_interval);
    let mut jobs: JoinSet<()> = JoinSet::new();

    loop {
        tokio::select! {
            // ---------------------------------------------------------------
            // 1. Transport events.
            // ---------------------------------------------------------------
            Some(event) = rt.link_rx.recv() => {
                if let Some(job) = link::apply_link_event(&rt.engine, event) {
                    jobs.spawn(job.run(rt.engine.clone()));
                }
            }

            // ---------------------------------------------------------------
            // 2. Commands from consumers.
            // ---------------------------------------------------------------
            Some(cmd) = rt.command_rx.recv() => {
                let state = loop_state(*rt.shutdown_rx.borrow());
                if handle_command(cmd, state, &rt.engine, &mut jobs) {
                    tracing::info!("shutdown command received -- exiting event loop");
                    break;
                }
            }

            // ---------------------------------------------------------------
            // 3. Reap finished routing tasks.
            // ---------------------------------------------------------------
            Some(done) = jobs.join_next(), if !jobs.is_empty() => {
                if let Err(e) = done {
                    if e.is_panic() {
                        tracing::error!(%e, "routing task panicked");
                    }
                }
            }

            // ---------------------------------------------------------------
            // 4. Shutdown signal.
            // ---------------------------------------------------------------
            changed = rt.shutdown_rx.changed() => {
                if changed.is_err() || *rt.shutdown_rx.borrow() {
                    tracing::info!("shutdown signal received -- exiting event loop");
                    break;
                }
            }
        }
    }

    shutdown_sequence(&rt.engine, &mut jobs, &prune_task);
    tracing::info!("node event loop exited");
}

fn shutdown_sequence(
    engine: &RoutingEngine,
    jobs: &mut JoinSet<()>,
    prune_task: &JoinHandle<()>,
) {
    let in_flight = jobs.len();
    jobs.abort_all();
    prune_task.abort();
    if let Err(e) = engine.store.flush() {
        tracing::error!(%e, "store flush on shutdown failed");
    }
    tracing::info!(aborted = in_flight, "routing tasks aborted");
}

// ---------------------------------------------------------------------------
// Command handler
// ---------------------------------------------------------------------------

/// State reported while the loop runs: shutdown may already have been
/// signalled with commands still queued.
fn loop_state(shutdown_signalled: bool) -> NodeState {
    if shutdown_signalled {
        NodeState::ShuttingDown
    } else {
        NodeState::Running
    }
}

/// Handles one command. Returns `true` when the loop should exit.
fn handle_command(
    cmd: NodeCommand,
    state: NodeState,
    engine: &Arc<RoutingEngine>,
    jobs: &mut JoinSet<()>,
) -> bool {
    tracing::debug!(?cmd, "command received");
    match cmd {
        NodeCommand::SendChat {
            destination,
            text,
            reply,
        } => {
            let engine = engine.clone();
            jobs.spawn(async move {
                let res = engine.send_chat(&destination, &text).map(|e| e.id);
                let _ = reply.send(res);
            });
        }

        NodeCommand::SendFriendRequest { stable_id, reply } => {
            let engine = engine.clone();
            jobs.spawn(async move {
                let res = engine.send_friend_request(&stable_id).map(|e| e.id);
                let _ = reply.send(res);
            });
        }

        NodeCommand::AcceptFriendRequest { stable_id, reply } => {
            let engine = engine.clone();
            jobs.spawn(async move {
                let res = engine.accept_friend_request(&stable_id).map(|e| e.id);
                let _ = reply.send(res);
            });
        }

        NodeCommand::RejectFriendRequest { stable_id, reply } => {
            let _ = reply.send(engine.reject_friend_request(&stable_id));
        }

        NodeCommand::CreateChannel {
            name,
            description,
            is_public,
            reply,
        } => {
            let _ = reply.send(engine.create_channel(&name, &description, is_public));
        }

        NodeCommand::JoinChannel { channel_id, reply } => {
            let _ = reply.send(engine.join_channel(&channel_id));
        }

        NodeCommand::SendChannelInvite {
            channel,
            stable_id,
            reply,
        } => {
            let engine = engine.clone();
            jobs.spawn(async move {
                let res = engine.send_channel_invite(&channel, &stable_id).map(|e| e.id);
                let _ = reply.send(res);
            });
        }

        NodeCommand::RequestConnection { stable_id, reply } => {
            let _ = reply.send(request_connection(engine, &stable_id));
        }

        NodeCommand::Disconnect { target, reply } => {
            let _ = reply.send(disconnect(engine, &target));
        }

        NodeCommand::UpdateSettings { settings, reply } => {
            let res = engine.settings.replace(settings);
            if res.is_ok() {
                tracing::info!(settings = ?engine.settings.snapshot(), "settings updated");
            }
            let _ = reply.send(res);
        }

        NodeCommand::GetStatus { reply } => {
            let _ = reply.send(status(engine, state));
        }

        NodeCommand::Shutdown => return true,
    }
    false
}

fn request_connection(engine: &RoutingEngine, stable_id: &StableId) -> Result<()> {
    let peer = engine
        .registry
        .discovered_by_stable_id(stable_id)
        .ok_or_else(|| DriftError::UnknownPeer {
            reason: format!("{stable_id} is not currently discovered"),
        })?;
    let local = DeclaredIdentity::new(
        engine.identity.name.clone(),
        engine.local_id().clone(),
    );
    let remote = DeclaredIdentity::new(peer.name.clone(), peer.stable_id.clone());
    engine.registry.mark_pending(&peer.endpoint, &remote);
    engine.transport.request_connection(&peer.endpoint, local)?;
    tracing::info!(endpoint = %peer.endpoint, %stable_id, "connection requested");
    Ok(())
}

fn disconnect(engine: &RoutingEngine, target: &DisconnectTarget) -> Result<()> {
    let endpoints: Vec<_> = match target {
        DisconnectTarget::All => engine
            .registry
            .connected_peers()
            .into_iter()
            .map(|p| p.endpoint)
            .collect(),
        DisconnectTarget::Peer(id) => {
            let peer = engine
                .registry
                .connected_by_stable_id(id)
                .ok_or_else(|| DriftError::UnknownPeer {
                    reason: format!("{id} is not connected"),
                })?;
            vec![peer.endpoint]
        }
    };
    for endpoint in &endpoints {
        engine.transport.disconnect(endpoint)?;
    }
    Ok(())
}

fn status(engine: &RoutingEngine, state: NodeState) -> Result<NodeStatus> {
    let snapshot = engine.registry.snapshot();
    Ok(NodeStatus {
        state,
        stable_id: engine.local_id().clone(),
        name: engine.identity.name.clone(),
        connected_peers: snapshot.connected.len(),
        discovered_peers: snapshot.discovered.len(),
        stored_envelopes: engine.store.count()?,
        settings: engine.settings.snapshot(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reported_state_follows_shutdown_signal() {
        assert_eq!(loop_state(false), NodeState::Running);
        assert_eq!(loop_state(true), NodeState::ShuttingDown);
    }
}
