//! Install source descriptor.

use crate::types::ModuleOrigin;
use std::path::{Path, PathBuf};

/// Where module content comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleSource {
    /// A hosted repository. `reference` is a branch name; `None` means the
    /// configured default.
    Remote {
        url: String,
        reference: Option<String>,
    },
    /// A directory on this machine.
    Local { path: PathBuf },
}

impl ModuleSource {
    pub fn remote(url: impl Into<String>, reference: Option<&str>) -> Self {
        ModuleSource::Remote {
            url: url.into(),
            reference: reference.map(str::to_string),
        }
    }

    pub fn local(path: impl AsRef<Path>) -> Self {
        ModuleSource::Local {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Rebuild the source a module was installed from.
    pub fn from_origin(origin: &ModuleOrigin) -> Self {
        match origin {
            ModuleOrigin::Remote { locator, reference } => ModuleSource::Remote {
                url: locator.clone(),
                reference: reference.clone(),
            },
            ModuleOrigin::Local { locator } => ModuleSource::Local {
                path: locator.clone(),
            },
        }
    }

    /// The provenance record for this source with the ref pinned.
    pub fn to_origin(&self, default_reference: &str) -> ModuleOrigin {
        match self {
            ModuleSource::Remote { url, reference } => ModuleOrigin::Remote {
                locator: url.clone(),
                reference: Some(
                    reference
                        .clone()
                        .unwrap_or_else(|| default_reference.to_string()),
                ),
            },
            ModuleSource::Local { path } => ModuleOrigin::Local {
                locator: path.clone(),
            },
        }
    }

    pub fn locator(&self) -> String {
        match self {
            ModuleSource::Remote { url, .. } => url.clone(),
            ModuleSource::Local { path } => path.display().to_string(),
        }
    }

    /// Directory name the content is materialized under: the last path
    /// segment of the locator, without trailing separators or a `.git` suffix.
    pub fn save_dir_name(&self) -> Option<String> {
        let locator = self.locator();
        let trimmed = locator.trim_end_matches(['/', '\\']);
        let segment = trimmed.rsplit(['/', '\\']).next()?;
        let segment = segment.strip_suffix(".git").unwrap_or(segment);
        if segment.is_empty() || segment == "." || segment == ".." {
            return None;
        }
        Some(segment.to_string())
    }
}

/// URL of the manifest file at `reference` in a hosted repository.
pub fn raw_manifest_url(url: &str, reference: &str, manifest_file: &str) -> String {
    let base = url.trim_end_matches('/');
    let base = base.strip_suffix(".git").unwrap_or(base);
    format!("{}/raw/refs/heads/{}/{}", base, reference, manifest_file)
}
