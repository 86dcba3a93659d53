//! Registry store: the durable module list kept in a replicated value.

use super::persist::{read_document, write_document, PersistQueue};
use super::scan::{scan_root, MaterializedModule};
use crate::config::HostConfig;
use crate::error::RegistryError;
use crate::replica::{ReplicaNode, ReplicatedValue, WatchHandle};
use crate::types::{Module, ModuleRegistry};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Replicated value name of the registry document.
pub const REGISTRY_VALUE: &str = "modules";

/// Replicated value name of the boot flag.
pub const BOOT_VALUE: &str = "modulesBooting";

/// Tri-state boot flag shared with every surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "cause", rename_all = "lowercase")]
pub enum BootState {
    Booting,
    Ready,
    Error(String),
}

/// Outcome of [`RegistryStore::reconcile`].
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    /// Namespaces found on disk and appended to the registry.
    pub adopted: Vec<String>,
    /// Entries dropped because nothing is materialized for them.
    pub pending: Vec<Module>,
}

struct Persistence {
    queue: PersistQueue,
    _watch: WatchHandle,
}

pub struct RegistryStore {
    root: PathBuf,
    registry_path: PathBuf,
    manifest_file: String,
    provenance_file: String,
    core_namespace: String,
    registry: ReplicatedValue<ModuleRegistry>,
    boot: ReplicatedValue<BootState>,
    persistence: Mutex<Option<Persistence>>,
}

impl RegistryStore {
    pub fn new(node: &ReplicaNode, config: &HostConfig) -> Self {
        Self {
            root: config.module_root.clone(),
            registry_path: config.registry_path(),
            manifest_file: config.manifest_file.clone(),
            provenance_file: config.provenance_file.clone(),
            core_namespace: config.core_namespace.clone(),
            registry: ReplicatedValue::create(node, REGISTRY_VALUE, ModuleRegistry::default()),
            boot: ReplicatedValue::create(node, BOOT_VALUE, BootState::Booting),
            persistence: Mutex::new(None),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Ensure the module root exists and adopt the persisted registry.
    ///
    /// Returns `true` on first boot, when no registry file existed and an
    /// empty one was written. From here on every mutation is persisted.
    pub async fn load(&self) -> Result<bool, RegistryError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| RegistryError::io(&self.root, e))?;

        let exists = tokio::fs::try_exists(&self.registry_path)
            .await
            .map_err(|e| RegistryError::io(&self.registry_path, e))?;

        let first_boot = if exists {
            let mut document = read_document(&self.registry_path).await?;
            document.dedup_namespaces();
            info!(
                path = %self.registry_path.display(),
                modules = document.modules.len(),
                "Registry loaded"
            );
            self.registry.set(document);
            false
        } else {
            let empty = ModuleRegistry::default();
            write_document(&self.registry_path, &empty).await?;
            info!(path = %self.registry_path.display(), "Registry created");
            self.registry.set(empty);
            true
        };

        self.start_persisting();
        Ok(first_boot)
    }

    fn start_persisting(&self) {
        let mut persistence = self.persistence.lock();
        if persistence.is_some() {
            return;
        }
        let queue = PersistQueue::spawn(self.registry_path.clone());
        let sink = queue.clone();
        let watch = self.registry.watch(move |document| sink.enqueue(document.clone()));
        *persistence = Some(Persistence {
            queue,
            _watch: watch,
        });
    }

    /// Current registry document.
    pub fn snapshot(&self) -> ModuleRegistry {
        self.registry.get()
    }

    /// The replicated value backing the registry.
    pub fn registry(&self) -> &ReplicatedValue<ModuleRegistry> {
        &self.registry
    }

    /// Read-modify-write the registry. Namespaces are de-duplicated after
    /// `f` runs, then the document is published and queued for persistence.
    pub fn mutate<R>(&self, f: impl FnOnce(&mut ModuleRegistry) -> R) -> R {
        self.registry.update(|document| {
            let result = f(document);
            document.dedup_namespaces();
            result
        })
    }

    /// Wait for every queued registry write to reach disk.
    pub async fn flush(&self) -> Result<(), RegistryError> {
        let queue = self.persistence.lock().as_ref().map(|p| p.queue.clone());
        match queue {
            Some(queue) => queue.flush().await,
            None => Ok(()),
        }
    }

    pub fn boot_state(&self) -> BootState {
        self.boot.get()
    }

    pub fn set_boot_state(&self, state: BootState) {
        debug!(?state, "Boot flag");
        self.boot.set(state);
    }

    /// Scan the module root for materialized modules.
    pub async fn scan(&self) -> Result<Vec<MaterializedModule>, RegistryError> {
        scan_root(&self.root, &self.manifest_file, &self.provenance_file).await
    }

    /// Bring the registry in line with the module root.
    ///
    /// Materialized modules the registry does not know are adopted (only when
    /// their provenance record is readable). Registry entries with nothing on
    /// disk are removed and returned as pending reinstalls.
    pub async fn reconcile(&self) -> Result<ReconcileReport, RegistryError> {
        let found = self.scan().await?;
        let present: HashSet<&str> = found.iter().map(|m| m.manifest.namespace()).collect();

        let report = self.mutate(|document| {
            let mut report = ReconcileReport::default();

            let mut adopted = Vec::new();
            for materialized in &found {
                let namespace = materialized.manifest.namespace();
                if document.contains(namespace) || report.adopted.iter().any(|a| a == namespace) {
                    continue;
                }
                let Some(origin) = materialized.origin.clone() else {
                    warn!(
                        dir = %materialized.dir.display(),
                        "Module directory has no provenance record, not adopting"
                    );
                    continue;
                };
                let closeable = namespace != self.core_namespace;
                adopted.push(Module::from_manifest(
                    &materialized.manifest,
                    &materialized.dir,
                    origin,
                    closeable,
                ));
                report.adopted.push(namespace.to_string());
            }
            document.modules.extend(adopted);

            let (kept, missing): (Vec<Module>, Vec<Module>) = std::mem::take(&mut document.modules)
                .into_iter()
                .partition(|m| present.contains(m.namespace.as_str()));
            document.modules = kept;
            report.pending = missing;
            report
        });

        info!(
            adopted = report.adopted.len(),
            pending = report.pending.len(),
            "Registry reconciled"
        );
        Ok(report)
    }
}
