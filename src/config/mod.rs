//! Host configuration
//!
//! Loaded through the `config` crate: built-in defaults, then the global
//! config file, then an optional explicit file, then `CUCUMBER__*`
//! environment variables.

mod facade;
pub mod merge;
pub mod paths;
pub mod sources;

pub use facade::ConfigLoader;

use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the module host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Directory holding every materialized module and the registry file.
    #[serde(default = "paths::default_module_root")]
    pub module_root: PathBuf,

    /// Registry document file name, relative to `module_root`.
    #[serde(default = "default_registry_file")]
    pub registry_file: String,

    /// Manifest file name inside a module directory or remote ref.
    #[serde(default = "default_manifest_file")]
    pub manifest_file: String,

    /// Provenance sidecar file name inside a module directory.
    #[serde(default = "default_provenance_file")]
    pub provenance_file: String,

    /// Reserved namespace that must always be installed.
    #[serde(default = "default_core_namespace")]
    pub core_namespace: String,

    /// Remote source installed when the core namespace is missing.
    #[serde(default = "default_core_source")]
    pub core_source: String,

    /// Ref used for remote sources when none is given.
    #[serde(default = "default_reference")]
    pub default_reference: String,

    /// Scheme of rewritten asset URIs.
    #[serde(default = "default_asset_scheme")]
    pub asset_scheme: String,

    /// Scheme of resolved item URLs.
    #[serde(default = "default_item_scheme")]
    pub item_scheme: String,

    /// Maximum entries kept in the rolling error log.
    #[serde(default = "default_error_log_capacity")]
    pub error_log_capacity: usize,

    /// Program used for clones and ref listing.
    #[serde(default = "default_git_program")]
    pub git_program: String,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_registry_file() -> String {
    "modules.json".to_string()
}

fn default_manifest_file() -> String {
    "package.json".to_string()
}

fn default_provenance_file() -> String {
    "origin.txt".to_string()
}

fn default_core_namespace() -> String {
    "core".to_string()
}

fn default_core_source() -> String {
    "https://github.com/wenxig/desktop-cucumber_core".to_string()
}

fn default_reference() -> String {
    "main".to_string()
}

fn default_asset_scheme() -> String {
    "atom".to_string()
}

fn default_item_scheme() -> String {
    "model".to_string()
}

fn default_error_log_capacity() -> usize {
    100
}

fn default_git_program() -> String {
    "git".to_string()
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            module_root: paths::default_module_root(),
            registry_file: default_registry_file(),
            manifest_file: default_manifest_file(),
            provenance_file: default_provenance_file(),
            core_namespace: default_core_namespace(),
            core_source: default_core_source(),
            default_reference: default_reference(),
            asset_scheme: default_asset_scheme(),
            item_scheme: default_item_scheme(),
            error_log_capacity: default_error_log_capacity(),
            git_program: default_git_program(),
            logging: LoggingConfig::default(),
        }
    }
}

impl HostConfig {
    /// Defaults rooted at `module_root`.
    pub fn with_module_root(module_root: impl Into<PathBuf>) -> Self {
        Self {
            module_root: module_root.into(),
            ..Self::default()
        }
    }

    pub fn registry_path(&self) -> PathBuf {
        self.module_root.join(&self.registry_file)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        let required = [
            ("registry_file", &self.registry_file),
            ("manifest_file", &self.manifest_file),
            ("provenance_file", &self.provenance_file),
            ("core_namespace", &self.core_namespace),
            ("default_reference", &self.default_reference),
            ("asset_scheme", &self.asset_scheme),
            ("item_scheme", &self.item_scheme),
            ("git_program", &self.git_program),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(format!("{} cannot be empty", field));
            }
        }

        for (field, scheme) in [("asset_scheme", &self.asset_scheme), ("item_scheme", &self.item_scheme)] {
            if !scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.')
            {
                return Err(format!("{} is not a valid URI scheme: {}", field, scheme));
            }
        }

        if self.module_root.as_os_str().is_empty() {
            return Err("module_root cannot be empty".to_string());
        }

        Ok(())
    }
}
