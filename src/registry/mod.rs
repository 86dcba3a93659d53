//! Registry Store
//!
//! The durable list of installed modules. The document lives in a replicated
//! value named `modules`, so every surface sees the same registry; the owner
//! rewrites the backing JSON file after each mutation through a single
//! serialized writer.

mod persist;
pub mod provenance;
mod scan;
mod store;

pub use scan::{parse_manifest, read_manifest, scan_root, MaterializedModule};
pub use store::{BootState, ReconcileReport, RegistryStore, BOOT_VALUE, REGISTRY_VALUE};
