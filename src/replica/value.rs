//! Named observable value replicated across the owner and its surfaces.

use super::bus::{HolderId, Slot};
use super::endpoint::Envelope;
use super::node::ReplicaNode;
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// Bound for anything that can be replicated.
pub trait Replicable: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> Replicable for T where T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Whether `incoming` counts as a change over `current`.
///
/// Objects and arrays always count: every assignment of a composite value is
/// treated as a change, even when it is deeply equal to the current one.
pub fn is_change(current: &Value, incoming: &Value) -> bool {
    matches!(incoming, Value::Object(_) | Value::Array(_)) || current != incoming
}

struct ValueInner<T> {
    name: String,
    holder: HolderId,
    node: ReplicaNode,
    current: RwLock<T>,
    listeners: Mutex<Vec<(u64, Listener<T>)>>,
    next_listener: AtomicU64,
    destroyed: AtomicBool,
}

impl<T: Replicable> ValueInner<T> {
    fn encode(&self, value: &T) -> Option<Value> {
        match serde_json::to_value(value) {
            Ok(encoded) => Some(encoded),
            Err(e) => {
                warn!(name = %self.name, "Failed to encode replicated value: {}", e);
                None
            }
        }
    }

    fn decode(&self, value: &Value) -> Option<T> {
        match serde_json::from_value(value.clone()) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                warn!(name = %self.name, "Ignoring undecodable update: {}", e);
                None
            }
        }
    }

    fn notify(&self) {
        let listeners: Vec<Listener<T>> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        if listeners.is_empty() {
            return;
        }
        let value = self.current.read().clone();
        for listener in listeners {
            listener(&value);
        }
    }
}

impl<T: Replicable> Slot for ValueInner<T> {
    fn snapshot(&self) -> Option<Value> {
        let current = self.current.read();
        self.encode(&current)
    }

    fn adopt_remote(&self, value: &Value) {
        let Some(decoded) = self.decode(value) else {
            return;
        };
        {
            let mut current = self.current.write();
            if let Some(encoded) = self.encode(&current) {
                if !is_change(&encoded, value) {
                    return;
                }
            }
            *current = decoded;
        }
        self.notify();
    }

    fn adopt_local(&self, value: &Value) {
        let Some(decoded) = self.decode(value) else {
            return;
        };
        *self.current.write() = decoded;
        self.notify();
    }
}

/// Handle returned by [`ReplicatedValue::watch`].
///
/// Dropping it keeps the listener registered; call
/// [`unsubscribe`](Self::unsubscribe) to remove it.
pub struct WatchHandle {
    remove: Box<dyn FnOnce() + Send + Sync>,
}

impl WatchHandle {
    pub fn unsubscribe(self) {
        (self.remove)()
    }
}

/// A named value kept consistent between the owner and its surfaces.
///
/// Clones share the same holder. Distinct holders with the same name on the
/// same node converge through the node's local fan-out.
pub struct ReplicatedValue<T> {
    inner: Arc<ValueInner<T>>,
}

impl<T> Clone for ReplicatedValue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Replicable> ReplicatedValue<T> {
    /// Register a holder for `name` on `node`.
    ///
    /// A surface boots from the owner's snapshot, so a late subscriber starts
    /// from the latest authoritative value. `initial` is used only when no
    /// snapshot is available.
    pub fn create(node: &ReplicaNode, name: impl Into<String>, initial: T) -> Self {
        let name = name.into();
        let bus = node.bus();
        let holder = bus.next_holder_id();

        let boot = node.boot_snapshot(&name).and_then(|snapshot| {
            match serde_json::from_value::<T>(snapshot) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(name = %name, "Snapshot does not decode, using initial value: {}", e);
                    None
                }
            }
        });

        let inner = Arc::new(ValueInner {
            name: name.clone(),
            holder,
            node: node.clone(),
            current: RwLock::new(boot.unwrap_or(initial)),
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(0),
            destroyed: AtomicBool::new(false),
        });
        let slot: Weak<dyn Slot> = Arc::downgrade(&inner) as Weak<dyn Slot>;
        bus.register(&name, holder, slot);
        debug!(name = %name, node = %node.peer(), "Replicated value created");

        Self { inner }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Local cached copy.
    pub fn get(&self) -> T {
        self.inner.current.read().clone()
    }

    /// Read without cloning.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let current = self.inner.current.read();
        f(&*current)
    }

    /// Replace the value and publish it. Returns `false` when a scalar value
    /// equal to the current one was assigned, which is not a change.
    pub fn set(&self, value: T) -> bool {
        let changed = {
            let mut current = self.inner.current.write();
            let changed = match (self.inner.encode(&current), self.inner.encode(&value)) {
                (Some(old), Some(new)) => is_change(&old, &new),
                _ => true,
            };
            if changed {
                *current = value;
            }
            changed
        };
        if changed {
            self.publish();
        }
        changed
    }

    /// Read-modify-write, then publish unconditionally.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let result = {
            let mut current = self.inner.current.write();
            f(&mut *current)
        };
        self.publish();
        result
    }

    /// Read-modify-write with an asynchronous transform.
    ///
    /// The transform runs on a copy; changes made by others while it is
    /// pending are overwritten.
    pub async fn update_async<F, Fut>(&self, f: F)
    where
        F: FnOnce(T) -> Fut,
        Fut: Future<Output = T>,
    {
        let next = f(self.get()).await;
        *self.inner.current.write() = next;
        self.publish();
    }

    /// Register a listener invoked on every accepted local or remote change.
    pub fn watch(&self, listener: impl Fn(&T) + Send + Sync + 'static) -> WatchHandle {
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.lock().push((id, Arc::new(listener)));
        let weak = Arc::downgrade(&self.inner);
        WatchHandle {
            remove: Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.listeners.lock().retain(|(existing, _)| *existing != id);
                }
            }),
        }
    }

    /// Notify local listeners, fan out to same-name holders in this process,
    /// then push to every known remote endpoint.
    pub fn publish(&self) {
        self.inner.notify();
        if self.inner.destroyed.load(Ordering::Acquire) {
            return;
        }
        let Some(value) = self.inner.snapshot() else {
            return;
        };
        let node = &self.inner.node;
        node.bus().fan_out(&self.inner.name, self.inner.holder, &value);
        node.broadcast(
            Envelope {
                name: self.inner.name.clone(),
                value,
                from: node.peer(),
            },
            None,
        );
    }

    /// Unregister from both channels and drop every listener.
    pub fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner
            .node
            .bus()
            .unregister(&self.inner.name, self.inner.holder);
        self.inner.listeners.lock().clear();
        debug!(name = %self.inner.name, "Replicated value destroyed");
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::Acquire)
    }
}
