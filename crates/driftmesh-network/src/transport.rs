//! Outbound side of the transport adapter.

use driftmesh_types::{DriftError, EndpointId, Result};
use tokio::sync::mpsc;

use crate::events::LinkCommand;
use crate::identity::DeclaredIdentity;

/// Cloneable sender of [`LinkCommand`]s.
///
/// Unbounded on purpose: routing never waits on radio throughput, the
/// transport queues or drops.
#[derive(Clone, Debug)]
pub struct TransportHandle {
    tx: mpsc::UnboundedSender<LinkCommand>,
}

impl TransportHandle {
    /// Creates a handle plus the receiver the transport drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<LinkCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn submit(&self, cmd: LinkCommand) -> Result<()> {
        self.tx.send(cmd).map_err(|e| DriftError::TransportError {
            reason: format!("transport closed, dropped command for {}", e.0.endpoint()),
        })
    }

    pub fn send_bytes(&self, endpoint: &EndpointId, bytes: Vec<u8>) -> Result<()> {
        self.submit(LinkCommand::Send {
            endpoint: endpoint.clone(),
            bytes,
        })
    }

    pub fn request_connection(&self, endpoint: &EndpointId, local: DeclaredIdentity) -> Result<()> {
        self.submit(LinkCommand::RequestConnection {
            endpoint: endpoint.clone(),
            local,
        })
    }

    pub fn disconnect(&self, endpoint: &EndpointId) -> Result<()> {
        self.submit(LinkCommand::Disconnect {
            endpoint: endpoint.clone(),
        })
    }
}
