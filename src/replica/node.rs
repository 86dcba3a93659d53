//! Replication node: one per process.
//!
//! The owner node is authoritative and knows every attached surface. A
//! surface node knows only the owner, from which it boots snapshots and to
//! which it pushes its own changes.

use super::bus::LocalBus;
use super::endpoint::{Endpoint, Envelope, InboxEndpoint, Peer, SnapshotSource, SurfaceId};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

struct NodeInner {
    peer: Peer,
    bus: LocalBus,
    remotes: RwLock<Vec<Arc<dyn Endpoint>>>,
    upstream: Option<Arc<dyn SnapshotSource>>,
    inbox_tx: mpsc::UnboundedSender<Envelope>,
    inbox_rx: Mutex<Option<mpsc::UnboundedReceiver<Envelope>>>,
    next_surface: AtomicU64,
}

impl SnapshotSource for NodeInner {
    fn snapshot(&self, name: &str) -> Option<Value> {
        self.bus.snapshot(name)
    }
}

/// Handle to this process's replication state. Cheap to clone.
#[derive(Clone)]
pub struct ReplicaNode {
    inner: Arc<NodeInner>,
}

impl ReplicaNode {
    fn build(peer: Peer, upstream: Option<Arc<dyn SnapshotSource>>) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(NodeInner {
                peer,
                bus: LocalBus::default(),
                remotes: RwLock::new(Vec::new()),
                upstream,
                inbox_tx,
                inbox_rx: Mutex::new(Some(inbox_rx)),
                next_surface: AtomicU64::new(1),
            }),
        }
    }

    /// Create the authoritative node.
    pub fn owner() -> Self {
        Self::build(Peer::Owner, None)
    }

    /// Create a surface node wired to an owner living in another process.
    ///
    /// `upstream` answers snapshot requests, `owner` receives update pushes.
    pub fn surface(
        id: SurfaceId,
        upstream: Arc<dyn SnapshotSource>,
        owner: Arc<dyn Endpoint>,
    ) -> Self {
        let node = Self::build(Peer::Surface(id), Some(upstream));
        node.inner.remotes.write().push(owner);
        node
    }

    /// Attach an in-process surface to this owner and return its node.
    ///
    /// Both directions run over unbounded inboxes; call [`pump`](Self::pump)
    /// or [`serve`](Self::serve) on each node to apply incoming pushes.
    pub fn attach_surface(&self) -> ReplicaNode {
        let id = self.inner.next_surface.fetch_add(1, Ordering::Relaxed);
        let upstream: Arc<dyn SnapshotSource> = self.inner.clone();
        let to_owner = Arc::new(InboxEndpoint::new(Peer::Owner, self.inner.inbox_tx.clone()));
        let surface = Self::surface(id, upstream, to_owner);
        self.attach_endpoint(Arc::new(InboxEndpoint::new(
            surface.peer(),
            surface.inner.inbox_tx.clone(),
        )));
        surface
    }

    /// Register a broadcast target. A later endpoint for the same peer
    /// replaces the earlier one.
    pub fn attach_endpoint(&self, endpoint: Arc<dyn Endpoint>) {
        let peer = endpoint.peer();
        let mut remotes = self.inner.remotes.write();
        remotes.retain(|existing| existing.peer() != peer);
        remotes.push(endpoint);
        debug!(node = %self.inner.peer, remote = %peer, "Endpoint attached");
    }

    /// Forget a broadcast target. Returns whether it was known.
    pub fn detach_endpoint(&self, peer: Peer) -> bool {
        let mut remotes = self.inner.remotes.write();
        let before = remotes.len();
        remotes.retain(|existing| existing.peer() != peer);
        let removed = remotes.len() != before;
        if removed {
            debug!(node = %self.inner.peer, remote = %peer, "Endpoint detached");
        }
        removed
    }

    pub fn peer(&self) -> Peer {
        self.inner.peer
    }

    pub fn is_owner(&self) -> bool {
        self.inner.peer == Peer::Owner
    }

    /// Answer a snapshot request for `name` from local state.
    pub fn snapshot(&self, name: &str) -> Option<Value> {
        self.inner.bus.snapshot(name)
    }

    /// Sender side of this node's inbox, for external transports.
    pub fn inbox(&self) -> mpsc::UnboundedSender<Envelope> {
        self.inner.inbox_tx.clone()
    }

    /// Names with at least one live holder on this node.
    pub fn names(&self) -> Vec<String> {
        self.inner.bus.names()
    }

    /// Number of known remote endpoints.
    pub fn remote_count(&self) -> usize {
        self.inner.remotes.read().len()
    }

    /// Apply one incoming update.
    ///
    /// The value is adopted by every local holder but never pushed back to
    /// its sender. The owner relays a surface's change to the other surfaces
    /// so they converge too.
    pub fn receive(&self, envelope: Envelope) {
        let delivered = self
            .inner
            .bus
            .deliver_remote(&envelope.name, &envelope.value);
        debug!(
            node = %self.inner.peer,
            name = %envelope.name,
            from = %envelope.from,
            delivered,
            "Received update"
        );

        if self.is_owner() && envelope.from != Peer::Owner {
            let from = envelope.from;
            self.broadcast(
                Envelope {
                    name: envelope.name,
                    value: envelope.value,
                    from: Peer::Owner,
                },
                Some(from),
            );
        }
    }

    /// Apply every update currently waiting in the inbox.
    pub fn pump(&self) -> usize {
        let mut applied = 0;
        loop {
            let next = {
                let mut guard = self.inner.inbox_rx.lock();
                match guard.as_mut() {
                    Some(rx) => rx.try_recv().ok(),
                    None => None,
                }
            };
            match next {
                Some(envelope) => {
                    self.receive(envelope);
                    applied += 1;
                }
                None => return applied,
            }
        }
    }

    /// Apply updates as they arrive. Never returns while the node is alive;
    /// run it as a task and abort the task to stop.
    ///
    /// Takes ownership of the inbox; `pump` does nothing afterwards.
    pub async fn serve(&self) {
        let Some(mut rx) = self.inner.inbox_rx.lock().take() else {
            warn!(node = %self.inner.peer, "Inbox already taken");
            return;
        };
        while let Some(envelope) = rx.recv().await {
            self.receive(envelope);
        }
    }

    /// Push to every remote except `except`. Failures are dropped and the
    /// dead endpoint forgotten.
    pub(crate) fn broadcast(&self, envelope: Envelope, except: Option<Peer>) {
        let remotes: Vec<Arc<dyn Endpoint>> = self.inner.remotes.read().clone();
        let mut dead = Vec::new();
        for remote in remotes {
            let peer = remote.peer();
            if Some(peer) == except {
                continue;
            }
            if let Err(e) = remote.push(envelope.clone()) {
                debug!(node = %self.inner.peer, name = %envelope.name, "Push dropped: {}", e);
                dead.push(peer);
            }
        }
        for peer in dead {
            self.detach_endpoint(peer);
        }
    }

    pub(crate) fn bus(&self) -> &LocalBus {
        &self.inner.bus
    }

    /// Boot value for a new holder: the owner's snapshot when this is a
    /// surface, otherwise whatever a sibling holder already has.
    pub(crate) fn boot_snapshot(&self, name: &str) -> Option<Value> {
        if let Some(upstream) = &self.inner.upstream {
            if let Some(value) = upstream.snapshot(name) {
                return Some(value);
            }
        }
        self.inner.bus.snapshot(name)
    }
}
