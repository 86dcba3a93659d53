//! Same-process fan-out keyed by value name.
//!
//! Holders register a weak slot under their name. A local publish reaches
//! sibling holders directly, without touching the cross-boundary channel,
//! and a sibling never re-broadcasts what it receives here.

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

pub(crate) type HolderId = u64;

/// Type-erased view of one replicated value holder.
pub(crate) trait Slot: Send + Sync {
    /// Current value, serialized.
    fn snapshot(&self) -> Option<Value>;
    /// Value pushed from another process. Subject to the change check.
    fn adopt_remote(&self, value: &Value);
    /// Value published by a sibling holder in this process.
    fn adopt_local(&self, value: &Value);
}

#[derive(Default)]
pub(crate) struct LocalBus {
    slots: RwLock<HashMap<String, Vec<(HolderId, Weak<dyn Slot>)>>>,
    next_holder: AtomicU64,
}

impl LocalBus {
    pub(crate) fn next_holder_id(&self) -> HolderId {
        self.next_holder.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn register(&self, name: &str, holder: HolderId, slot: Weak<dyn Slot>) {
        let mut slots = self.slots.write();
        let entries = slots.entry(name.to_string()).or_default();
        entries.retain(|(_, weak)| weak.strong_count() > 0);
        entries.push((holder, slot));
    }

    pub(crate) fn unregister(&self, name: &str, holder: HolderId) {
        let mut slots = self.slots.write();
        if let Some(entries) = slots.get_mut(name) {
            entries.retain(|(id, weak)| *id != holder && weak.strong_count() > 0);
            if entries.is_empty() {
                slots.remove(name);
            }
        }
    }

    /// Live holders of `name`. The lock is released before callers invoke them.
    fn holders(&self, name: &str) -> Vec<(HolderId, Arc<dyn Slot>)> {
        let slots = self.slots.read();
        slots
            .get(name)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|(id, weak)| weak.upgrade().map(|slot| (*id, slot)))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn snapshot(&self, name: &str) -> Option<Value> {
        self.holders(name)
            .into_iter()
            .find_map(|(_, slot)| slot.snapshot())
    }

    pub(crate) fn fan_out(&self, name: &str, from: HolderId, value: &Value) {
        for (id, slot) in self.holders(name) {
            if id != from {
                slot.adopt_local(value);
            }
        }
    }

    pub(crate) fn deliver_remote(&self, name: &str, value: &Value) -> usize {
        let holders = self.holders(name);
        for (_, slot) in &holders {
            slot.adopt_remote(value);
        }
        holders.len()
    }

    pub(crate) fn names(&self) -> Vec<String> {
        self.slots.read().keys().cloned().collect()
    }
}
