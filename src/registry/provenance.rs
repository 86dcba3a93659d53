//! Provenance sidecar: the origin record written next to materialized content.

use crate::error::InstallError;
use crate::types::ModuleOrigin;
use std::path::Path;

/// Write the origin record into `module_dir`.
pub async fn write_origin(
    module_dir: &Path,
    file_name: &str,
    origin: &ModuleOrigin,
) -> Result<(), InstallError> {
    let path = module_dir.join(file_name);
    let bytes = serde_json::to_vec(origin).map_err(|e| InstallError::Manifest {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|e| InstallError::io(&path, e))
}

/// Read the origin record from `module_dir`. `Ok(None)` when absent.
pub async fn read_origin(
    module_dir: &Path,
    file_name: &str,
) -> Result<Option<ModuleOrigin>, InstallError> {
    let path = module_dir.join(file_name);
    let text = match tokio::fs::read_to_string(&path).await {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(InstallError::io(&path, e)),
    };

    serde_json::from_str(&text)
        .map(Some)
        .map_err(|e| InstallError::Manifest {
            path: path.display().to_string(),
            message: format!("unrecognized origin record: {}", e),
        })
}
