//! In-process transport.
//!
//! [`MemoryHub`] plays the radio layer for any number of attached
//! nodes. Devices are "in range" only after
//! [`MemoryHub::bring_in_range`]; connection requests and frames
//! between devices out of range are dropped, like a real radio would.
//! Each attached node sees a peer under that peer's hub endpoint id.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use driftmesh_types::{DriftError, EndpointId, Result};
use tokio::sync::mpsc;

use crate::events::{LinkCommand, LinkEvent};
use crate::identity::DeclaredIdentity;
use crate::transport::TransportHandle;

type Pair = (EndpointId, EndpointId);

fn pair(a: &EndpointId, b: &EndpointId) -> Pair {
    if a <= b {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}

struct Attached {
    identity: DeclaredIdentity,
    events: mpsc::Sender<LinkEvent>,
}

#[derive(Default)]
struct HubState {
    nodes: HashMap<EndpointId, Attached>,
    in_range: HashSet<Pair>,
    connected: HashSet<Pair>,
}

#[derive(Clone, Default)]
pub struct MemoryHub {
    state: Arc<Mutex<HubState>>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HubState>> {
        self.state.lock().map_err(|e| DriftError::TransportError {
            reason: format!("hub lock poisoned: {e}"),
        })
    }

    /// Registers a node and starts relaying its commands. Must be
    /// called from within a tokio runtime.
    pub fn attach(
        &self,
        endpoint: EndpointId,
        identity: DeclaredIdentity,
        events: mpsc::Sender<LinkEvent>,
    ) -> Result<TransportHandle> {
        self.lock()?
            .nodes
            .insert(endpoint.clone(), Attached { identity, events });

        let (handle, mut commands) = TransportHandle::channel();
        let hub = self.clone();
        tokio::spawn(async move {
            while let Some(cmd) = commands.recv().await {
                if let Err(e) = hub.execute(&endpoint, cmd).await {
                    tracing::debug!(%endpoint, %e, "hub dropped command");
                }
            }
        });
        Ok(handle)
    }

    /// Puts `a` and `b` in radio range; both receive `PeerFound`.
    pub async fn bring_in_range(&self, a: &EndpointId, b: &EndpointId) -> Result<()> {
        let deliveries = {
            let mut state = self.lock()?;
            state.in_range.insert(pair(a, b));
            vec![
                Self::found(&state, a, b)?,
                Self::found(&state, b, a)?,
            ]
        };
        Self::deliver(deliveries).await
    }

    /// Moves `a` and `b` apart: both lose each other and any link drops.
    pub async fn take_out_of_range(&self, a: &EndpointId, b: &EndpointId) -> Result<()> {
        let deliveries = {
            let mut state = self.lock()?;
            let key = pair(a, b);
            state.in_range.remove(&key);
            let was_connected = state.connected.remove(&key);
            let mut out = Vec::new();
            for (me, other) in [(a, b), (b, a)] {
                let tx = Self::events_of(&state, me)?;
                out.push((tx.clone(), LinkEvent::PeerLost { endpoint: other.clone() }));
                if was_connected {
                    out.push((tx, LinkEvent::Disconnected { endpoint: other.clone() }));
                }
            }
            out
        };
        Self::deliver(deliveries).await
    }

    fn events_of(state: &HubState, endpoint: &EndpointId) -> Result<mpsc::Sender<LinkEvent>> {
        state
            .nodes
            .get(endpoint)
            .map(|n| n.events.clone())
            .ok_or_else(|| DriftError::TransportError {
                reason: format!("{endpoint} is not attached to the hub"),
            })
    }

    fn identity_of(state: &HubState, endpoint: &EndpointId) -> Result<DeclaredIdentity> {
        state
            .nodes
            .get(endpoint)
            .map(|n| n.identity.clone())
            .ok_or_else(|| DriftError::TransportError {
                reason: format!("{endpoint} is not attached to the hub"),
            })
    }

    /// `PeerFound` for `observer` about `seen`.
    fn found(
        state: &HubState,
        observer: &EndpointId,
        seen: &EndpointId,
    ) -> Result<(mpsc::Sender<LinkEvent>, LinkEvent)> {
        Ok((
            Self::events_of(state, observer)?,
            LinkEvent::PeerFound {
                endpoint: seen.clone(),
                identity: Self::identity_of(state, seen)?,
            },
        ))
    }

    async fn deliver(deliveries: Vec<(mpsc::Sender<LinkEvent>, LinkEvent)>) -> Result<()> {
        for (tx, event) in deliveries {
            tx.send(event).await.map_err(|_| DriftError::TransportError {
                reason: "node event channel closed".into(),
            })?;
        }
        Ok(())
    }

    async fn execute(&self, from: &EndpointId, cmd: LinkCommand) -> Result<()> {
        let deliveries = {
            let mut state = self.lock()?;
            match cmd {
                LinkCommand::Send { endpoint, bytes } => {
                    if !state.connected.contains(&pair(from, &endpoint)) {
                        return Err(DriftError::TransportError {
                            reason: format!("{from} is not connected to {endpoint}"),
                        });
                    }
                    vec![(
                        Self::events_of(&state, &endpoint)?,
                        LinkEvent::BytesReceived {
                            endpoint: from.clone(),
                            bytes,
                        },
                    )]
                }
                LinkCommand::RequestConnection { endpoint, local } => {
                    let key = pair(from, &endpoint);
                    if !state.in_range.contains(&key) {
                        vec![(
                            Self::events_of(&state, from)?,
                            LinkEvent::ConnectionFailed { endpoint },
                        )]
                    } else {
                        state.connected.insert(key);
                        let remote = Self::identity_of(&state, &endpoint)?;
                        let from_tx = Self::events_of(&state, from)?;
                        let to_tx = Self::events_of(&state, &endpoint)?;
                        vec![
                            (
                                to_tx.clone(),
                                LinkEvent::ConnectionInitiated {
                                    endpoint: from.clone(),
                                    identity: local.clone(),
                                },
                            ),
                            (
                                from_tx.clone(),
                                LinkEvent::ConnectionInitiated {
                                    endpoint: endpoint.clone(),
                                    identity: remote.clone(),
                                },
                            ),
                            (
                                to_tx,
                                LinkEvent::Connected {
                                    endpoint: from.clone(),
                                    identity: local,
                                },
                            ),
                            (
                                from_tx,
                                LinkEvent::Connected {
                                    endpoint,
                                    identity: remote,
                                },
                            ),
                        ]
                    }
                }
                LinkCommand::Disconnect { endpoint } => {
                    if !state.connected.remove(&pair(from, &endpoint)) {
                        return Ok(());
                    }
                    vec![
                        (
                            Self::events_of(&state, &endpoint)?,
                            LinkEvent::Disconnected {
                                endpoint: from.clone(),
                            },
                        ),
                        (
                            Self::events_of(&state, from)?,
                            LinkEvent::Disconnected { endpoint },
                        ),
                    ]
                }
            }
        };
        Self::deliver(deliveries).await
    }
}
