//! Cross-boundary channel contracts.
//!
//! The owning process and each presentation surface talk through two
//! per-name channels: a synchronous snapshot request answered from the
//! owner's in-process state, and an asynchronous update push.

use crate::error::ReplicaError;
use serde_json::Value;
use std::fmt;
use tokio::sync::mpsc;

/// Identifier assigned to a surface when it attaches to the owner.
pub type SurfaceId = u64;

/// Participant in the replication protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Peer {
    /// The authoritative process.
    Owner,
    /// A presentation surface holding cached copies.
    Surface(SurfaceId),
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Peer::Owner => write!(f, "owner"),
            Peer::Surface(id) => write!(f, "surface#{}", id),
        }
    }
}

/// One message on the update channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Name of the replicated value.
    pub name: String,
    /// Serialized value.
    pub value: Value,
    /// Peer that sent this message.
    pub from: Peer,
}

/// A remote participant that can receive update pushes.
///
/// `push` must not block: delivery is asynchronous and ordered per
/// sender/receiver pair only.
pub trait Endpoint: Send + Sync {
    fn peer(&self) -> Peer;
    fn push(&self, envelope: Envelope) -> Result<(), ReplicaError>;
}

/// The synchronous side of the protocol. Implementations must answer from
/// process-local state and never perform I/O.
pub trait SnapshotSource: Send + Sync {
    fn snapshot(&self, name: &str) -> Option<Value>;
}

/// Endpoint backed by the receiving node's unbounded inbox.
pub struct InboxEndpoint {
    peer: Peer,
    tx: mpsc::UnboundedSender<Envelope>,
}

impl InboxEndpoint {
    pub fn new(peer: Peer, tx: mpsc::UnboundedSender<Envelope>) -> Self {
        Self { peer, tx }
    }
}

impl Endpoint for InboxEndpoint {
    fn peer(&self) -> Peer {
        self.peer
    }

    fn push(&self, envelope: Envelope) -> Result<(), ReplicaError> {
        self.tx
            .send(envelope)
            .map_err(|_| ReplicaError::Disconnected(self.peer.to_string()))
    }
}
