//! Module Host
//!
//! The context object constructed once at startup. It owns the registry
//! store, installer, resolver, error log and item catalog, drives the boot
//! sequence, and applies the failure policy: every install, uninstall or
//! boot failure is appended to the error log, shown to the user and returned
//! to the caller, except validation rejections, which become `Ok(false)`.

mod boot;
mod catalog;
mod error_log;
mod notifier;

pub use boot::BootStage;
pub use catalog::{Catalog, CatalogEntry, CATALOG_VALUE};
pub use error_log::{ErrorLog, ErrorRecord, ERROR_LOG_VALUE};
pub use notifier::{LogNotifier, UserNotifier};

use crate::config::{ConfigLoader, HostConfig};
use crate::error::{serialize_error, ErrorClass, HostError, InstallError};
use crate::installer::{
    Cloner, GitCli, HttpTransport, InstallOptions, Installer, ModuleSource, Transport,
};
use crate::registry::{BootState, RegistryStore};
use crate::replica::ReplicaNode;
use crate::resolver::{AssetProtocol, ItemProtocol, Resolver};
use crate::types::{Manifest, Module};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Pluggable collaborators of the host.
pub struct HostBackends {
    pub transport: Arc<dyn Transport>,
    pub cloner: Arc<dyn Cloner>,
    pub notifier: Arc<dyn UserNotifier>,
}

impl HostBackends {
    /// HTTP transport, `git` command line and a log-only notifier.
    pub fn standard(config: &HostConfig) -> Result<Self, HostError> {
        Ok(Self {
            transport: Arc::new(HttpTransport::new()?),
            cloner: Arc::new(GitCli::new(config.git_program.clone())),
            notifier: Arc::new(LogNotifier),
        })
    }
}

pub struct ModuleHost {
    config: HostConfig,
    node: ReplicaNode,
    store: Arc<RegistryStore>,
    installer: Installer,
    resolver: Arc<Resolver>,
    errors: ErrorLog,
    catalog: Catalog,
    notifier: Arc<dyn UserNotifier>,
    stage: Mutex<BootStage>,
}

impl ModuleHost {
    pub fn new(config: HostConfig, node: ReplicaNode) -> Result<Self, HostError> {
        let backends = HostBackends::standard(&config)?;
        Self::with_backends(config, node, backends)
    }

    /// Load layered configuration, initialize logging and build a host with
    /// the standard backends.
    pub fn from_environment(node: ReplicaNode) -> Result<Self, HostError> {
        let config = ConfigLoader::load()?;
        crate::logging::init_logging(Some(&config.logging))?;
        Self::new(config, node)
    }

    pub fn with_backends(
        config: HostConfig,
        node: ReplicaNode,
        backends: HostBackends,
    ) -> Result<Self, HostError> {
        config.validate().map_err(HostError::Config)?;

        let store = Arc::new(RegistryStore::new(&node, &config));
        let installer = Installer::new(&config, store.clone(), backends.transport, backends.cloner);
        let resolver = Arc::new(Resolver::new(store.clone(), config.asset_scheme.clone()));
        let errors = ErrorLog::new(&node, config.error_log_capacity);
        let catalog = Catalog::new(&node, config.item_scheme.clone());

        Ok(Self {
            config,
            node,
            store,
            installer,
            resolver,
            errors,
            catalog,
            notifier: backends.notifier,
            stage: Mutex::new(BootStage::Booting),
        })
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn node(&self) -> &ReplicaNode {
        &self.node
    }

    pub fn store(&self) -> &Arc<RegistryStore> {
        &self.store
    }

    pub fn installer(&self) -> &Installer {
        &self.installer
    }

    pub fn stage(&self) -> BootStage {
        self.stage.lock().clone()
    }

    fn advance(&self, next: BootStage) {
        let mut stage = self.stage.lock();
        if !stage.can_advance_to(&next) {
            warn!("Unexpected boot transition {} -> {}", *stage, next);
        }
        info!(stage = %next, "Boot");
        *stage = next;
    }

    /// Run the boot sequence: root directory and registry, reconciliation,
    /// core module, pending reinstalls.
    ///
    /// Any failure marks the boot flag as an error, shows a blocking error
    /// and is returned; the caller is expected to stop starting up.
    pub async fn boot(&self) -> Result<(), HostError> {
        *self.stage.lock() = BootStage::Booting;
        self.store.set_boot_state(BootState::Booting);

        match self.run_boot().await {
            Ok(()) => {
                self.advance(BootStage::Ready);
                self.store.set_boot_state(BootState::Ready);
                Ok(())
            }
            Err(e) => {
                let cause = serialize_error(&e);
                error!("Boot failed: {}", cause);
                self.advance(BootStage::Error(cause.clone()));
                self.store.set_boot_state(BootState::Error(cause.clone()));
                self.errors.record("boot", &e);
                self.notifier.show_error("Module boot failed", &cause, true);
                Err(e)
            }
        }
    }

    async fn run_boot(&self) -> Result<(), HostError> {
        let first_boot = self.store.load().await?;
        debug!(first_boot, "Registry ready");
        self.advance(BootStage::DirReady);

        let report = self.store.reconcile().await?;
        self.advance(BootStage::Reconciled);

        let core_pending = report
            .pending
            .iter()
            .any(|m| m.namespace == self.config.core_namespace);
        if !core_pending {
            self.ensure_core().await?;
        }
        self.advance(BootStage::CoreEnsured);

        self.install_pending(&report.pending).await?;
        if !self.store.snapshot().contains(&self.config.core_namespace) {
            return Err(InstallError::NotAModule(self.config.core_source.clone()).into());
        }
        self.advance(BootStage::PendingInstalled);

        self.store.flush().await?;
        Ok(())
    }

    /// Install the core module from its default source when it is missing.
    pub async fn ensure_core(&self) -> Result<(), HostError> {
        if self.store.snapshot().contains(&self.config.core_namespace) {
            return Ok(());
        }
        info!(source = %self.config.core_source, "Installing core module");
        let source = ModuleSource::remote(self.config.core_source.clone(), None);
        let module = self.installer.install(&source).await?;
        if module.namespace != self.config.core_namespace {
            warn!(
                namespace = %module.namespace,
                "Core source installed a module with a different namespace"
            );
        }
        Ok(())
    }

    /// Reinstall registry entries that have nothing materialized, from their
    /// recorded origin. Validation rejections are logged and skipped, except
    /// for the core module, whose reinstall must succeed.
    pub async fn install_pending(&self, pending: &[Module]) -> Result<(), HostError> {
        for module in pending {
            let source = ModuleSource::from_origin(&module.origin);
            info!(namespace = %module.namespace, source = %source.locator(), "Reinstalling module");
            let is_core = module.namespace == self.config.core_namespace;
            match self.installer.install(&source).await {
                Ok(_) => {}
                Err(e) if e.class() == ErrorClass::Validation && !is_core => {
                    warn!(namespace = %module.namespace, "Pending module skipped: {}", e);
                    self.errors.record(&module.display_name, &e);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn report(&self, title: &str, display_name: &str, error: &InstallError) {
        self.errors.record(display_name, error);
        if error.class() == ErrorClass::Validation {
            warn!(display_name, "{}", error);
        } else {
            self.notifier
                .show_error(title, &serialize_error(error), false);
        }
    }

    /// Fetch and validate the manifest of `source` without installing.
    pub async fn info(&self, source: &ModuleSource) -> Result<Option<Manifest>, HostError> {
        self.installer.info(source).await.map_err(|e| {
            self.report("Module lookup failed", &source.locator(), &e);
            e.into()
        })
    }

    pub async fn install(&self, source: &ModuleSource) -> Result<bool, HostError> {
        self.install_with(source, &InstallOptions::default()).await
    }

    /// Install `source`. `Ok(false)` when it is not a module or its
    /// namespace is already installed.
    pub async fn install_with(
        &self,
        source: &ModuleSource,
        options: &InstallOptions,
    ) -> Result<bool, HostError> {
        match self.installer.install_with(source, options).await {
            Ok(_) => Ok(true),
            Err(e) => {
                self.report("Module install failed", &source.locator(), &e);
                if e.class() == ErrorClass::Validation {
                    Ok(false)
                } else {
                    Err(e.into())
                }
            }
        }
    }

    /// Uninstall `namespace`. `Ok(false)` when unknown or not closeable.
    pub async fn uninstall(&self, namespace: &str) -> Result<bool, HostError> {
        match self.installer.uninstall(namespace).await {
            Ok(removed) => Ok(removed),
            Err(e) => {
                self.report("Module uninstall failed", namespace, &e);
                if e.class() == ErrorClass::Validation {
                    Ok(false)
                } else {
                    Err(e.into())
                }
            }
        }
    }

    /// Branch names published by a remote source.
    pub async fn list_remote_refs(&self, url: &str) -> Result<Vec<String>, HostError> {
        self.installer.list_remote_refs(url).await.map_err(|e| {
            self.report("Listing refs failed", url, &e);
            e.into()
        })
    }

    pub fn resolver(&self) -> Arc<Resolver> {
        self.resolver.clone()
    }

    /// Handler for `<item_scheme>://namespace/id` requests.
    pub fn item_protocol(&self) -> ItemProtocol {
        ItemProtocol::new(self.resolver.clone(), self.config.item_scheme.clone())
    }

    /// Handler for rewritten asset URIs.
    pub fn asset_protocol(&self) -> AssetProtocol {
        AssetProtocol::new(self.config.module_root.clone(), self.config.asset_scheme.clone())
    }

    /// Publish every registered item to the catalog and run ready listeners.
    pub fn publish_catalog(&self) {
        self.catalog.publish(&self.store.snapshot());
    }

    pub fn on_catalog_ready(&self, listener: impl FnOnce() + Send + 'static) {
        self.catalog.on_ready(listener);
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn errors(&self) -> Vec<ErrorRecord> {
        self.errors.entries()
    }

    pub fn error_log(&self) -> &ErrorLog {
        &self.errors
    }
}
