//! Resolver
//!
//! Turns an item address into one materialized document: the item's raw
//! document, deep-default merged with every item it extends (recursively),
//! then with relative file references rewritten into asset URIs rooted at the
//! requesting item's directory.

mod merge;
mod paths;
mod protocol;

pub use merge::{deep_default_merge, merge_all};
pub use paths::{asset_uri, is_relative_reference, normalize, rewrite_paths};
pub use protocol::{content_type_for, AssetProtocol, ItemProtocol, ProtocolResponse};

use crate::error::ResolveError;
use crate::registry::RegistryStore;
use crate::types::{ItemDefine, Module, ModuleRegistry, ResourceLocation};
use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct Resolver {
    store: Arc<RegistryStore>,
    asset_scheme: String,
}

impl Resolver {
    pub fn new(store: Arc<RegistryStore>, asset_scheme: impl Into<String>) -> Self {
        Self {
            store,
            asset_scheme: asset_scheme.into(),
        }
    }

    pub fn asset_scheme(&self) -> &str {
        &self.asset_scheme
    }

    /// Resolve the item `id` of module `namespace`.
    pub async fn resolve(&self, namespace: &str, id: &str) -> Result<Value, ResolveError> {
        let registry = self.store.snapshot();
        let module = registry
            .get(namespace)
            .ok_or_else(|| ResolveError::ModuleNotFound(namespace.to_string()))?;
        let item = module
            .item(id)
            .ok_or_else(|| ResolveError::ItemNotFound(ResourceLocation::new(namespace, id).to_string()))?;
        Self::merge_in(&registry, item, module, &self.asset_scheme).await
    }

    /// Merge `item` of `module` with its inheritance chain and rewrite paths.
    pub async fn merge(&self, item: &ItemDefine, module: &Module) -> Result<Value, ResolveError> {
        let registry = self.store.snapshot();
        Self::merge_in(&registry, item, module, &self.asset_scheme).await
    }

    async fn merge_in(
        registry: &ModuleRegistry,
        item: &ItemDefine,
        module: &Module,
        scheme: &str,
    ) -> Result<Value, ResolveError> {
        let mut memo = HashMap::new();
        let mut stack = Vec::new();
        let mut document = merge_raw(registry, module, item, &mut memo, &mut stack).await?;
        let rewritten = rewrite_paths(&mut document, &item_dir(module, item), scheme);
        debug!(
            item = %ResourceLocation::new(&module.namespace, &item.id),
            rewritten,
            "Item resolved"
        );
        Ok(document)
    }
}

/// Directory that relative references inside an item's document start from.
pub fn item_dir(module: &Module, item: &ItemDefine) -> PathBuf {
    let document = module.local_path.join(&item.relative_path);
    normalize(document.parent().unwrap_or(&module.local_path))
}

async fn read_item_document(path: &Path) -> Result<Value, ResolveError> {
    let document_error = |message: String| ResolveError::Document {
        path: path.display().to_string(),
        message,
    };
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| document_error(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| document_error(e.to_string()))
}

/// Merge one item with everything it extends, without rewriting paths.
///
/// `memo` caches merged documents per location for the duration of one
/// request; `stack` holds the locations being merged, to detect cycles.
fn merge_raw<'a>(
    registry: &'a ModuleRegistry,
    module: &'a Module,
    item: &'a ItemDefine,
    memo: &'a mut HashMap<ResourceLocation, Value>,
    stack: &'a mut Vec<ResourceLocation>,
) -> BoxFuture<'a, Result<Value, ResolveError>> {
    async move {
        let location = ResourceLocation::new(&module.namespace, &item.id);
        if let Some(cached) = memo.get(&location) {
            return Ok(cached.clone());
        }
        if stack.contains(&location) {
            return Err(ResolveError::Cycle(location.to_string()));
        }

        let mut merged = read_item_document(&module.local_path.join(&item.relative_path)).await?;

        stack.push(location.clone());
        for reference in &item.extends {
            let Some(parent_module) = registry.get(&reference.namespace) else {
                warn!(
                    "Failed to load item {} (module not found) while loading {}",
                    reference, location
                );
                continue;
            };
            let Some(parent_item) = parent_module.item(&reference.id) else {
                warn!(
                    "Failed to load item {} (not found) while loading {}",
                    reference, location
                );
                continue;
            };
            match merge_raw(registry, parent_module, parent_item, &mut *memo, &mut *stack).await {
                Ok(parent) => deep_default_merge(&mut merged, &parent),
                Err(e) => warn!("Skipping {} while loading {}: {}", reference, location, e),
            }
        }
        stack.pop();

        memo.insert(location, merged.clone());
        Ok(merged)
    }
    .boxed()
}
