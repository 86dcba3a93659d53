//! Installer
//!
//! Fetches and validates a module manifest, materializes module content from
//! a remote repository or a local directory, records its provenance and
//! appends it to the registry. Uninstall removes the directory and the entry.

mod clone;
mod copy;
mod source;
mod transport;

pub use clone::{Cloner, GitCli};
pub use copy::copy_dir;
pub use source::{raw_manifest_url, ModuleSource};
pub use transport::{
    AbortHandle, AbortSignal, FetchRequest, FetchResponse, HttpTransport, Progress, ProgressFn,
    Transport,
};

use crate::config::HostConfig;
use crate::error::InstallError;
use crate::registry::provenance::write_origin;
use crate::registry::{parse_manifest, read_manifest, RegistryStore};
use crate::types::{Manifest, Module};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Progress reporting and cancellation for one install.
#[derive(Clone, Default)]
pub struct InstallOptions {
    pub progress: Option<ProgressFn>,
    pub abort: Option<AbortSignal>,
}

pub struct Installer {
    root: PathBuf,
    manifest_file: String,
    provenance_file: String,
    default_reference: String,
    core_namespace: String,
    store: Arc<RegistryStore>,
    transport: Arc<dyn Transport>,
    cloner: Arc<dyn Cloner>,
}

impl Installer {
    pub fn new(
        config: &HostConfig,
        store: Arc<RegistryStore>,
        transport: Arc<dyn Transport>,
        cloner: Arc<dyn Cloner>,
    ) -> Self {
        Self {
            root: config.module_root.clone(),
            manifest_file: config.manifest_file.clone(),
            provenance_file: config.provenance_file.clone(),
            default_reference: config.default_reference.clone(),
            core_namespace: config.core_namespace.clone(),
            store,
            transport,
            cloner,
        }
    }

    fn reference_for<'a>(&'a self, reference: &'a Option<String>) -> &'a str {
        reference.as_deref().unwrap_or(&self.default_reference)
    }

    /// Fetch and validate the manifest of `source`.
    ///
    /// `Ok(None)` means the source is reachable but is not a module.
    pub async fn info(&self, source: &ModuleSource) -> Result<Option<Manifest>, InstallError> {
        self.info_with(source, &InstallOptions::default()).await
    }

    pub async fn info_with(
        &self,
        source: &ModuleSource,
        options: &InstallOptions,
    ) -> Result<Option<Manifest>, InstallError> {
        match source {
            ModuleSource::Remote { url, reference } => {
                let manifest_url =
                    raw_manifest_url(url, self.reference_for(reference), &self.manifest_file);
                let response = self
                    .transport
                    .fetch(FetchRequest {
                        url: manifest_url.clone(),
                        progress: options.progress.clone(),
                        abort: options.abort.clone(),
                    })
                    .await?;
                if response.status == 404 {
                    debug!(url = %manifest_url, "No manifest at ref");
                    return Ok(None);
                }
                if !response.is_success() {
                    return Err(InstallError::Status {
                        url: manifest_url,
                        status: response.status,
                    });
                }
                parse_manifest(&manifest_url, &response.body)
            }
            ModuleSource::Local { path } => {
                let metadata = tokio::fs::metadata(path)
                    .await
                    .map_err(|e| InstallError::io(path, e))?;
                if !metadata.is_dir() {
                    return Ok(None);
                }
                read_manifest(path, &self.manifest_file).await
            }
        }
    }

    pub async fn install(&self, source: &ModuleSource) -> Result<Module, InstallError> {
        self.install_with(source, &InstallOptions::default()).await
    }

    /// Install `source` and append it to the registry.
    ///
    /// The namespace check reads the current registry snapshot and is not a
    /// lock; the registry's de-duplication settles concurrent installs of the
    /// same namespace.
    pub async fn install_with(
        &self,
        source: &ModuleSource,
        options: &InstallOptions,
    ) -> Result<Module, InstallError> {
        let locator = source.locator();
        let dir_name = source
            .save_dir_name()
            .ok_or_else(|| InstallError::NotAModule(locator.clone()))?;

        let Some(manifest) = self.info_with(source, options).await? else {
            warn!(source = %locator, "Source is not a module");
            return Err(InstallError::NotAModule(locator));
        };
        let namespace = manifest.namespace().to_string();
        if self.store.snapshot().contains(&namespace) {
            warn!(namespace = %namespace, "Namespace already installed");
            return Err(InstallError::NamespaceExists(namespace));
        }

        let dest = self.root.join(&dir_name);
        if tokio::fs::try_exists(&dest)
            .await
            .map_err(|e| InstallError::io(&dest, e))?
        {
            return Err(InstallError::io(
                &dest,
                std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    "module directory already exists",
                ),
            ));
        }

        let origin = source.to_origin(&self.default_reference);
        if let Err(e) = self.materialize(source, &dest, options).await {
            discard(&dest).await;
            return Err(e);
        }
        if let Err(e) = write_origin(&dest, &self.provenance_file, &origin).await {
            discard(&dest).await;
            return Err(e);
        }

        let closeable = namespace != self.core_namespace;
        let module = Module::from_manifest(&manifest, &dest, origin, closeable);
        self.store
            .mutate(|registry| registry.extend_dedup([module.clone()]));
        info!(namespace = %namespace, dir = %dest.display(), "Module installed");
        Ok(module)
    }

    async fn materialize(
        &self,
        source: &ModuleSource,
        dest: &Path,
        options: &InstallOptions,
    ) -> Result<(), InstallError> {
        match source {
            ModuleSource::Remote { url, reference } => {
                self.cloner
                    .clone_repo(url, self.reference_for(reference), dest, options)
                    .await
            }
            ModuleSource::Local { path } => copy_dir(path, dest).await.map(|bytes| {
                debug!(bytes, dest = %dest.display(), "Copied local module");
            }),
        }
    }

    /// Remove an installed module.
    ///
    /// `Ok(false)` when the namespace is unknown. A non-closeable module is
    /// rejected with [`InstallError::ProtectedModule`].
    pub async fn uninstall(&self, namespace: &str) -> Result<bool, InstallError> {
        let Some(module) = self.store.snapshot().get(namespace).cloned() else {
            debug!(namespace, "Uninstall of unknown namespace");
            return Ok(false);
        };
        if !module.closeable {
            return Err(InstallError::ProtectedModule(namespace.to_string()));
        }

        match tokio::fs::remove_dir_all(&module.local_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(dir = %module.local_path.display(), "Module directory already gone");
            }
            Err(e) => return Err(InstallError::io(&module.local_path, e)),
        }
        self.store.mutate(|registry| registry.remove(namespace));
        info!(namespace, "Module uninstalled");
        Ok(true)
    }

    /// Branch names available at a remote source.
    pub async fn list_remote_refs(&self, url: &str) -> Result<Vec<String>, InstallError> {
        self.cloner.list_refs(url).await
    }
}

async fn discard(dest: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(dest).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(dir = %dest.display(), "Failed to clean up partial install: {}", e);
        }
    }
}
