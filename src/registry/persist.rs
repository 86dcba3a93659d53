//! Serialized registry persistence.
//!
//! Every registry mutation enqueues a full-document rewrite. A single task
//! drains the queue so overlapping writes never interleave; pending writes
//! are coalesced to the latest document. A flush reports the outcome of the
//! last write before it.

use crate::error::RegistryError;
use crate::types::ModuleRegistry;
use std::path::{Path, PathBuf};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

enum PersistJob {
    Write(Box<ModuleRegistry>),
    Flush(oneshot::Sender<Option<String>>),
}

/// Handle to the registry writer task.
#[derive(Clone)]
pub(crate) struct PersistQueue {
    path: PathBuf,
    tx: mpsc::UnboundedSender<PersistJob>,
}

impl PersistQueue {
    /// Spawn the writer task. Must be called from within a tokio runtime.
    pub(crate) fn spawn(path: PathBuf) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<PersistJob>();
        let target = path.clone();
        tokio::spawn(async move {
            let mut failure: Option<String> = None;
            while let Some(job) = rx.recv().await {
                let mut document = match job {
                    PersistJob::Write(document) => document,
                    PersistJob::Flush(ack) => {
                        let _ = ack.send(failure.clone());
                        continue;
                    }
                };

                let mut acks = Vec::new();
                while let Ok(next) = rx.try_recv() {
                    match next {
                        PersistJob::Write(newer) => document = newer,
                        PersistJob::Flush(ack) => {
                            acks.push(ack);
                            break;
                        }
                    }
                }

                failure = match write_document(&target, &document).await {
                    Ok(()) => None,
                    Err(e) => {
                        error!("Failed to persist registry: {}", e);
                        Some(e.to_string())
                    }
                };
                for ack in acks {
                    let _ = ack.send(failure.clone());
                }
            }
            debug!("Registry writer stopped");
        });
        Self { path, tx }
    }

    pub(crate) fn enqueue(&self, document: ModuleRegistry) {
        if self.tx.send(PersistJob::Write(Box::new(document))).is_err() {
            warn!("Registry writer is gone; mutation not persisted");
        }
    }

    /// Wait until every write enqueued before this call has completed.
    pub(crate) async fn flush(&self) -> Result<(), RegistryError> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(PersistJob::Flush(ack))
            .map_err(|_| RegistryError::PersistClosed)?;
        match done.await.map_err(|_| RegistryError::PersistClosed)? {
            None => Ok(()),
            Some(message) => Err(RegistryError::Persist {
                path: self.path.clone(),
                message,
            }),
        }
    }
}

/// Write the whole document through a sibling temp file and rename it into place.
pub(crate) async fn write_document(path: &Path, document: &ModuleRegistry) -> Result<(), RegistryError> {
    let bytes = serde_json::to_vec_pretty(document).map_err(|e| RegistryError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;
    let temp = path.with_extension("json.tmp");
    tokio::fs::write(&temp, &bytes)
        .await
        .map_err(|e| RegistryError::io(&temp, e))?;
    tokio::fs::rename(&temp, path)
        .await
        .map_err(|e| RegistryError::io(path, e))?;
    debug!(path = %path.display(), modules = document.modules.len(), "Registry persisted");
    Ok(())
}

/// Read and parse the registry document.
pub(crate) async fn read_document(path: &Path) -> Result<ModuleRegistry, RegistryError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| RegistryError::io(path, e))?;
    serde_json::from_slice(&bytes).map_err(|e| RegistryError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}
