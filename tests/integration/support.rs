//! Shared fixtures: module directories on disk, a scripted transport, a
//! cloner that copies fixture directories, and a recording notifier.

use async_trait::async_trait;
use cucumber_host::installer::{
    copy_dir, raw_manifest_url, Cloner, FetchRequest, FetchResponse, InstallOptions, Progress,
    Transport,
};
use cucumber_host::manager::{HostBackends, UserNotifier};
use cucumber_host::{HostConfig, InstallError, ModuleHost, ReplicaNode};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One item of a fixture module: id, raw document, extends.
pub struct FixtureItem<'a> {
    pub id: &'a str,
    pub document: Value,
    pub extends: &'a [&'a str],
}

pub fn item<'a>(id: &'a str, document: Value, extends: &'a [&'a str]) -> FixtureItem<'a> {
    FixtureItem {
        id,
        document,
        extends,
    }
}

pub fn manifest(namespace: &str, items: &[FixtureItem<'_>]) -> Value {
    let models: Vec<Value> = items
        .iter()
        .map(|item| {
            json!({
                "id": item.id,
                "path": format!("models/{}.json", item.id),
                "displayName": item.id.to_uppercase(),
                "extends": item.extends,
            })
        })
        .collect();
    json!({
        "name": format!("{}-module", namespace),
        "version": "1.0.0",
        "desktopCucumber": {
            "module": {"namespace": namespace, "displayName": namespace.to_uppercase()},
            "models": models
        }
    })
}

/// Write a module source directory with its manifest and item documents.
pub fn write_module(dir: &Path, namespace: &str, items: &[FixtureItem<'_>]) -> PathBuf {
    std::fs::create_dir_all(dir.join("models")).unwrap();
    std::fs::write(
        dir.join("package.json"),
        serde_json::to_vec_pretty(&manifest(namespace, items)).unwrap(),
    )
    .unwrap();
    for item in items {
        std::fs::write(
            dir.join("models").join(format!("{}.json", item.id)),
            item.document.to_string(),
        )
        .unwrap();
    }
    dir.to_path_buf()
}

/// Transport answering from a fixed table; unknown URLs get 404.
#[derive(Default)]
pub struct FakeTransport {
    responses: Mutex<HashMap<String, (u16, Vec<u8>)>>,
    requests: Mutex<Vec<String>>,
}

impl FakeTransport {
    pub fn serve(&self, url: &str, status: u16, body: Vec<u8>) {
        self.responses.lock().insert(url.to_string(), (status, body));
    }

    pub fn serve_manifest(&self, repo: &str, reference: &str, manifest: &Value) {
        self.serve(
            &raw_manifest_url(repo, reference, "package.json"),
            200,
            manifest.to_string().into_bytes(),
        );
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, InstallError> {
        self.requests.lock().push(request.url.clone());
        if request.abort.as_ref().is_some_and(|a| a.is_aborted()) {
            return Err(InstallError::Aborted(request.url));
        }
        let (status, body) = self
            .responses
            .lock()
            .get(&request.url)
            .cloned()
            .unwrap_or((404, b"Not Found".to_vec()));
        if let Some(progress) = &request.progress {
            progress(Progress {
                loaded: body.len() as u64,
                total: Some(body.len() as u64),
            });
        }
        Ok(FetchResponse { status, body })
    }
}

/// Cloner that copies a registered fixture directory for each repository,
/// reporting `0` before the copy and the copied byte count after it.
#[derive(Default)]
pub struct FakeCloner {
    repos: Mutex<HashMap<String, PathBuf>>,
    refs: Mutex<HashMap<String, Vec<String>>>,
    clones: Mutex<Vec<(String, String)>>,
}

impl FakeCloner {
    pub fn register(&self, url: &str, fixture: &Path) {
        self.repos.lock().insert(url.to_string(), fixture.to_path_buf());
    }

    pub fn set_refs(&self, url: &str, refs: &[&str]) {
        self.refs
            .lock()
            .insert(url.to_string(), refs.iter().map(|r| r.to_string()).collect());
    }

    pub fn clones(&self) -> Vec<(String, String)> {
        self.clones.lock().clone()
    }
}

#[async_trait]
impl Cloner for FakeCloner {
    async fn clone_repo(
        &self,
        url: &str,
        reference: &str,
        dest: &Path,
        options: &InstallOptions,
    ) -> Result<(), InstallError> {
        if options.abort.as_ref().is_some_and(|a| a.is_aborted()) {
            return Err(InstallError::Aborted(url.to_string()));
        }
        self.clones
            .lock()
            .push((url.to_string(), reference.to_string()));
        let fixture = self.repos.lock().get(url).cloned();
        let Some(fixture) = fixture else {
            return Err(InstallError::Clone {
                url: url.to_string(),
                message: "repository not found".to_string(),
            });
        };
        let report = |loaded: u64, total: Option<u64>| {
            if let Some(progress) = &options.progress {
                progress(Progress { loaded, total });
            }
        };
        report(0, None);
        let bytes = copy_dir(&fixture, dest).await?;
        report(bytes, Some(bytes));
        Ok(())
    }

    async fn list_refs(&self, url: &str) -> Result<Vec<String>, InstallError> {
        self.refs
            .lock()
            .get(url)
            .cloned()
            .ok_or_else(|| InstallError::Clone {
                url: url.to_string(),
                message: "repository not found".to_string(),
            })
    }
}

/// Notifier recording `(title, message, blocking)`.
#[derive(Default)]
pub struct RecordingNotifier {
    calls: Mutex<Vec<(String, String, bool)>>,
}

impl RecordingNotifier {
    pub fn calls(&self) -> Vec<(String, String, bool)> {
        self.calls.lock().clone()
    }
}

impl UserNotifier for RecordingNotifier {
    fn show_error(&self, title: &str, message: &str, blocking: bool) {
        self.calls
            .lock()
            .push((title.to_string(), message.to_string(), blocking));
    }
}

/// A host over a temporary module root with fake collaborators.
pub struct TestHost {
    pub temp: tempfile::TempDir,
    pub host: ModuleHost,
    pub transport: Arc<FakeTransport>,
    pub cloner: Arc<FakeCloner>,
    pub notifier: Arc<RecordingNotifier>,
}

impl TestHost {
    pub fn new() -> Self {
        let temp = tempfile::tempdir().unwrap();
        let config = HostConfig::with_module_root(temp.path().join("modules"));
        let transport = Arc::new(FakeTransport::default());
        let cloner = Arc::new(FakeCloner::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let host = ModuleHost::with_backends(
            config,
            ReplicaNode::owner(),
            HostBackends {
                transport: transport.clone(),
                cloner: cloner.clone(),
                notifier: notifier.clone(),
            },
        )
        .unwrap();
        Self {
            temp,
            host,
            transport,
            cloner,
            notifier,
        }
    }

    pub fn root(&self) -> PathBuf {
        self.host.config().module_root.clone()
    }

    /// Directory outside the module root for source fixtures.
    pub fn sources(&self) -> PathBuf {
        self.temp.path().join("sources")
    }

    /// Make the default core source installable.
    pub fn serve_core(&self, items: &[FixtureItem<'_>]) {
        let core_source = self.host.config().core_source.clone();
        let fixture = write_module(&self.sources().join("core-repo"), "core", items);
        self.transport
            .serve_manifest(&core_source, "main", &manifest("core", items));
        self.cloner.register(&core_source, &fixture);
    }

    /// Boot with a minimal core module available.
    pub async fn booted() -> Self {
        let test = Self::new();
        test.serve_core(&[item("base", json!({"Version": 3}), &[])]);
        test.host.boot().await.unwrap();
        test
    }
}
