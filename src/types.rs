//! Core data model: resource locations, item definitions, modules and the
//! registry document.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Reserved key inside a manifest that marks a directory as a content module.
pub const MANIFEST_MARKER: &str = "desktopCucumber";

/// Address of one item inside one module.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ResourceLocation {
    pub namespace: String,
    pub id: String,
}

impl ResourceLocation {
    pub fn new(namespace: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for ResourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.id)
    }
}

impl FromStr for ResourceLocation {
    type Err = String;

    /// Parse the `namespace:id` form. The first colon splits.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (namespace, id) = s
            .split_once(':')
            .ok_or_else(|| format!("Invalid resource location (missing ':'): {}", s))?;
        if namespace.is_empty() || id.is_empty() {
            return Err(format!("Invalid resource location: {}", s));
        }
        Ok(Self::new(namespace, id))
    }
}

impl<'de> Deserialize<'de> for ResourceLocation {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Text(String),
            Object { namespace: String, id: String },
        }

        match Repr::deserialize(deserializer)? {
            Repr::Text(text) => text.parse().map_err(serde::de::Error::custom),
            Repr::Object { namespace, id } => Ok(Self { namespace, id }),
        }
    }
}

/// Declaration of one addressable item inside a module manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDefine {
    pub id: String,

    /// Raw document location relative to the module directory.
    #[serde(rename = "path", alias = "relativePath")]
    pub relative_path: String,

    #[serde(default)]
    pub display_name: String,

    /// Items this one inherits fields from, highest priority first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extends: Vec<ResourceLocation>,

    /// Domain flags the host passes through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Where a module was installed from.
///
/// Serialized as `{"from": "github" | "local", "url": ..., "ref"?: ...}`,
/// the shape of the provenance sidecar written next to every module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "from")]
pub enum ModuleOrigin {
    #[serde(rename = "github", alias = "remote")]
    Remote {
        #[serde(rename = "url")]
        locator: String,
        #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
        reference: Option<String>,
    },
    #[serde(rename = "local")]
    Local {
        #[serde(rename = "url")]
        locator: PathBuf,
    },
}

impl ModuleOrigin {
    pub fn locator(&self) -> String {
        match self {
            ModuleOrigin::Remote { locator, .. } => locator.clone(),
            ModuleOrigin::Local { locator } => locator.to_string_lossy().to_string(),
        }
    }
}

/// The marker block of a manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleBlock {
    pub module: ModuleHeader,
    #[serde(default, rename = "models", alias = "items")]
    pub items: Vec<ItemDefine>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleHeader {
    pub namespace: String,
    #[serde(default)]
    pub display_name: String,
}

/// A parsed module manifest.
///
/// The full document is kept so the registry carries whatever else the
/// module author wrote next to the marker block.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    pub raw: Value,
    pub block: ModuleBlock,
}

impl Manifest {
    /// Interpret a manifest document.
    ///
    /// Returns `Ok(None)` when the marker block is absent: the document is
    /// valid JSON but does not describe a module.
    pub fn from_value(raw: Value) -> Result<Option<Self>, String> {
        let Some(marker) = raw.get(MANIFEST_MARKER) else {
            return Ok(None);
        };
        if marker.is_null() {
            return Ok(None);
        }
        let block: ModuleBlock = serde_json::from_value(marker.clone())
            .map_err(|e| format!("Malformed {} block: {}", MANIFEST_MARKER, e))?;
        if block.module.namespace.trim().is_empty() {
            return Err("Module namespace cannot be empty".to_string());
        }
        Ok(Some(Self { raw, block }))
    }

    pub fn namespace(&self) -> &str {
        &self.block.module.namespace
    }
}

/// An installed module as recorded in the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Module {
    pub namespace: String,
    #[serde(default)]
    pub display_name: String,
    pub origin: ModuleOrigin,
    pub local_path: PathBuf,
    #[serde(rename = "package", default)]
    pub manifest: Value,
    #[serde(rename = "models", default)]
    pub items: Vec<ItemDefine>,
    #[serde(rename = "enable", default)]
    pub enabled: bool,
    #[serde(default = "default_closeable")]
    pub closeable: bool,
}

fn default_closeable() -> bool {
    true
}

impl Module {
    /// Synthesize a registry entry from a materialized manifest.
    ///
    /// Non-closeable modules start enabled; everything else starts disabled.
    pub fn from_manifest(
        manifest: &Manifest,
        local_path: &Path,
        origin: ModuleOrigin,
        closeable: bool,
    ) -> Self {
        Self {
            namespace: manifest.block.module.namespace.clone(),
            display_name: manifest.block.module.display_name.clone(),
            origin,
            local_path: local_path.to_path_buf(),
            manifest: manifest.raw.clone(),
            items: manifest.block.items.clone(),
            enabled: !closeable,
            closeable,
        }
    }

    pub fn item(&self, id: &str) -> Option<&ItemDefine> {
        self.items.iter().find(|item| item.id == id)
    }
}

/// The durable root document listing every installed module.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleRegistry {
    #[serde(default, alias = "module")]
    pub modules: Vec<Module>,
}

impl ModuleRegistry {
    pub fn get(&self, namespace: &str) -> Option<&Module> {
        self.modules.iter().find(|m| m.namespace == namespace)
    }

    pub fn contains(&self, namespace: &str) -> bool {
        self.get(namespace).is_some()
    }

    /// Drop later duplicates of a namespace, keeping the first occurrence.
    pub fn dedup_namespaces(&mut self) {
        let mut seen = std::collections::HashSet::new();
        self.modules.retain(|m| seen.insert(m.namespace.clone()));
    }

    /// Append modules and re-establish namespace uniqueness.
    pub fn extend_dedup(&mut self, modules: impl IntoIterator<Item = Module>) {
        self.modules.extend(modules);
        self.dedup_namespaces();
    }

    /// Remove a namespace, returning the removed entry.
    pub fn remove(&mut self, namespace: &str) -> Option<Module> {
        let index = self.modules.iter().position(|m| m.namespace == namespace)?;
        Some(self.modules.remove(index))
    }
}
