//! Catalog of every item across registered modules.

use crate::replica::{ReplicaNode, ReplicatedValue};
use crate::types::{ItemDefine, ModuleRegistry};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Replicated value name of the catalog.
pub const CATALOG_VALUE: &str = "modelDefines";

/// One item as listed for the rendering layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub namespace: String,
    /// `<item_scheme>://<namespace>/<id>`, fetched through the item protocol.
    pub config_url: String,
    #[serde(flatten)]
    pub item: ItemDefine,
}

type ReadyFn = Box<dyn FnOnce() + Send>;

pub struct Catalog {
    value: ReplicatedValue<Vec<CatalogEntry>>,
    item_scheme: String,
    ready: Mutex<Vec<ReadyFn>>,
    published: AtomicBool,
}

impl Catalog {
    pub fn new(node: &ReplicaNode, item_scheme: impl Into<String>) -> Self {
        Self {
            value: ReplicatedValue::create(node, CATALOG_VALUE, Vec::new()),
            item_scheme: item_scheme.into(),
            ready: Mutex::new(Vec::new()),
            published: AtomicBool::new(false),
        }
    }

    pub fn entries_for(&self, registry: &ModuleRegistry) -> Vec<CatalogEntry> {
        registry
            .modules
            .iter()
            .flat_map(|module| {
                module.items.iter().map(move |item| CatalogEntry {
                    namespace: module.namespace.clone(),
                    config_url: format!("{}://{}/{}", self.item_scheme, module.namespace, item.id),
                    item: item.clone(),
                })
            })
            .collect()
    }

    /// Replace the catalog with the items of `registry` and run the pending
    /// ready listeners.
    pub fn publish(&self, registry: &ModuleRegistry) {
        let entries = self.entries_for(registry);
        debug!(items = entries.len(), "Catalog published");
        self.value.set(entries);
        self.published.store(true, Ordering::Release);

        let listeners = std::mem::take(&mut *self.ready.lock());
        for listener in listeners {
            listener();
        }
    }

    /// Run `listener` once the catalog is published. Runs immediately when it
    /// already has been.
    pub fn on_ready(&self, listener: impl FnOnce() + Send + 'static) {
        let mut ready = self.ready.lock();
        if self.published.load(Ordering::Acquire) {
            drop(ready);
            listener();
            return;
        }
        ready.push(Box::new(listener));
    }

    pub fn entries(&self) -> Vec<CatalogEntry> {
        self.value.get()
    }

    pub fn value(&self) -> &ReplicatedValue<Vec<CatalogEntry>> {
        &self.value
    }
}
