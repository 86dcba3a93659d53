//! Cucumber Host: content modules for the desktop host
//!
//! Discovers, installs and uninstalls content modules, keeps a durable
//! registry of them, and resolves a requested item into one materialized
//! document through a multi-source inheritance merge. Every piece of shared
//! state (registry, boot flag, error log, catalog) is a replicated value kept
//! consistent between the owning process and its presentation surfaces.

pub mod config;
pub mod error;
pub mod installer;
pub mod logging;
pub mod manager;
pub mod registry;
pub mod replica;
pub mod resolver;
pub mod types;

pub use config::HostConfig;
pub use error::{ErrorClass, HostError, InstallError, RegistryError, ReplicaError, ResolveError};
pub use installer::{InstallOptions, Installer, ModuleSource};
pub use manager::{HostBackends, ModuleHost};
pub use registry::{BootState, RegistryStore};
pub use replica::{ReplicaNode, ReplicatedValue};
pub use resolver::{AssetProtocol, ItemProtocol, ProtocolResponse, Resolver};
pub use types::{ItemDefine, Manifest, Module, ModuleOrigin, ModuleRegistry, ResourceLocation};
