//! Error types for the module host.
//!
//! Each subsystem owns its error enum; `HostError` is the umbrella the
//! context object returns. Every error can be classified into the four
//! severity classes used for propagation decisions.

use std::path::PathBuf;
use thiserror::Error;

/// Severity class used to decide whether a failure is recoverable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Not a module, namespace collision. Recoverable, reported as `false`.
    Validation,
    /// Fetch or clone failure.
    Transport,
    /// Missing directory, permission, unreadable document.
    Filesystem,
    /// Unknown namespace/id or broken document, local to one resolve call.
    Resolution,
}

/// Replication errors
#[derive(Debug, Error)]
pub enum ReplicaError {
    #[error("Endpoint disconnected: {0}")]
    Disconnected(String),
}

/// Installer errors
#[derive(Debug, Error)]
pub enum InstallError {
    #[error("Install fail ({0} is not a module)")]
    NotAModule(String),

    #[error("Install fail ({0} is already existed)")]
    NamespaceExists(String),

    #[error("Module {0} is not closeable")]
    ProtectedModule(String),

    #[error("Request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("Request to {url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("Request to {0} was aborted")]
    Aborted(String),

    #[error("Clone of {url} failed: {message}")]
    Clone { url: String, message: String },

    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid manifest at {path}: {message}")]
    Manifest { path: String, message: String },
}

impl InstallError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        InstallError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            InstallError::NotAModule(_)
            | InstallError::NamespaceExists(_)
            | InstallError::ProtectedModule(_) => ErrorClass::Validation,
            InstallError::Transport { .. }
            | InstallError::Status { .. }
            | InstallError::Aborted(_)
            | InstallError::Clone { .. } => ErrorClass::Transport,
            InstallError::Io { .. } | InstallError::Manifest { .. } => ErrorClass::Filesystem,
        }
    }
}

/// Registry store errors
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse registry file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to persist registry to {}: {message}", path.display())]
    Persist { path: PathBuf, message: String },

    #[error("Registry persistence queue is closed")]
    PersistClosed,
}

impl RegistryError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RegistryError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn class(&self) -> ErrorClass {
        ErrorClass::Filesystem
    }
}

/// Resolution errors
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("module not found: {0}")]
    ModuleNotFound(String),

    #[error("item not found: {0}")]
    ItemNotFound(String),

    #[error("invalid request path: {0}")]
    InvalidPath(String),

    #[error("failed to load document {path}: {message}")]
    Document { path: String, message: String },

    #[error("inheritance cycle through {0}")]
    Cycle(String),
}

/// Umbrella error returned by the module host context
#[derive(Debug, Error)]
pub enum HostError {
    #[error(transparent)]
    Install(#[from] InstallError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl HostError {
    pub fn class(&self) -> ErrorClass {
        match self {
            HostError::Install(e) => e.class(),
            HostError::Registry(e) => e.class(),
            HostError::Resolve(_) => ErrorClass::Resolution,
            HostError::Config(_) => ErrorClass::Filesystem,
        }
    }
}

impl From<config::ConfigError> for HostError {
    fn from(err: config::ConfigError) -> Self {
        HostError::Config(err.to_string())
    }
}

/// Render an error and its source chain on one line.
pub fn serialize_error(err: &(dyn std::error::Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !out.ends_with(&text) {
            out.push_str(": ");
            out.push_str(&text);
        }
        source = cause.source();
    }
    out
}
