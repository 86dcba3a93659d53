//! Recursive directory copy for local sources.

use crate::error::InstallError;
use std::path::Path;
use walkdir::WalkDir;

/// Copy every file under `source` into `dest`, creating `dest`.
pub async fn copy_dir(source: &Path, dest: &Path) -> Result<u64, InstallError> {
    let source = dunce::canonicalize(source).map_err(|e| InstallError::io(source, e))?;

    let mut entries = Vec::new();
    for entry in WalkDir::new(&source).follow_links(false) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(&source).to_path_buf();
            InstallError::io(path, e.into())
        })?;
        let relative = entry
            .path()
            .strip_prefix(&source)
            .map_err(|e| InstallError::Manifest {
                path: entry.path().display().to_string(),
                message: e.to_string(),
            })?
            .to_path_buf();
        entries.push((entry.path().to_path_buf(), relative, entry.file_type().is_dir()));
    }

    tokio::fs::create_dir_all(dest)
        .await
        .map_err(|e| InstallError::io(dest, e))?;

    let mut copied = 0;
    for (from, relative, is_dir) in entries {
        let to = dest.join(&relative);
        if is_dir {
            tokio::fs::create_dir_all(&to)
                .await
                .map_err(|e| InstallError::io(&to, e))?;
        } else {
            copied += tokio::fs::copy(&from, &to)
                .await
                .map_err(|e| InstallError::io(&to, e))?;
        }
    }
    Ok(copied)
}
