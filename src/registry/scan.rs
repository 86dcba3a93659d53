//! Discovery of materialized module directories under the module root.

use super::provenance::read_origin;
use crate::error::{InstallError, RegistryError};
use crate::types::{Manifest, ModuleOrigin};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A directory under the module root that carries a valid manifest.
#[derive(Debug, Clone)]
pub struct MaterializedModule {
    pub dir: PathBuf,
    pub manifest: Manifest,
    /// `None` when the provenance sidecar is absent or unreadable.
    pub origin: Option<ModuleOrigin>,
}

/// Read and interpret the manifest inside `dir`.
///
/// A missing manifest file and a manifest without the marker block both
/// yield `Ok(None)`: the directory is not a module.
pub async fn read_manifest(dir: &Path, manifest_file: &str) -> Result<Option<Manifest>, InstallError> {
    let path = dir.join(manifest_file);
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(InstallError::io(&path, e)),
    };
    parse_manifest(&path.display().to_string(), &bytes)
}

/// Interpret manifest bytes fetched from anywhere.
pub fn parse_manifest(origin: &str, bytes: &[u8]) -> Result<Option<Manifest>, InstallError> {
    let raw: serde_json::Value = serde_json::from_slice(bytes).map_err(|e| InstallError::Manifest {
        path: origin.to_string(),
        message: e.to_string(),
    })?;
    Manifest::from_value(raw).map_err(|message| InstallError::Manifest {
        path: origin.to_string(),
        message,
    })
}

/// List every module directory under `root`, sorted by directory name.
///
/// Directories whose manifest is unreadable are skipped with a warning so one
/// broken module cannot block discovery of the rest.
pub async fn scan_root(
    root: &Path,
    manifest_file: &str,
    provenance_file: &str,
) -> Result<Vec<MaterializedModule>, RegistryError> {
    let mut entries = tokio::fs::read_dir(root)
        .await
        .map_err(|e| RegistryError::io(root, e))?;

    let mut found = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| RegistryError::io(root, e))?
    {
        let file_type = entry
            .file_type()
            .await
            .map_err(|e| RegistryError::io(entry.path(), e))?;
        if !file_type.is_dir() {
            continue;
        }
        let dir = entry.path();

        let manifest = match read_manifest(&dir, manifest_file).await {
            Ok(Some(manifest)) => manifest,
            Ok(None) => {
                debug!(dir = %dir.display(), "Directory is not a module");
                continue;
            }
            Err(e) => {
                warn!(dir = %dir.display(), "Skipping module directory: {}", e);
                continue;
            }
        };

        let origin = match read_origin(&dir, provenance_file).await {
            Ok(origin) => origin,
            Err(e) => {
                warn!(dir = %dir.display(), "Unreadable provenance record: {}", e);
                None
            }
        };

        found.push(MaterializedModule {
            dir,
            manifest,
            origin,
        });
    }

    found.sort_by(|a, b| a.dir.cmp(&b.dir));
    Ok(found)
}
