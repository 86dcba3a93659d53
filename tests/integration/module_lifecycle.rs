use crate::integration::support::{item, manifest, write_module, TestHost};
use cucumber_host::installer::{AbortSignal, InstallOptions, Progress};
use cucumber_host::{HostError, InstallError, ModuleOrigin, ModuleSource};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn installing_two_namespaces_registers_both() {
    let test = TestHost::booted().await;
    let first = write_module(&test.sources().join("alpha"), "alpha", &[item("a", json!({}), &[])]);
    let second = write_module(&test.sources().join("beta"), "beta", &[item("b", json!({}), &[])]);

    assert!(test.host.install(&ModuleSource::local(&first)).await.unwrap());
    assert!(test.host.install(&ModuleSource::local(&second)).await.unwrap());

    let registry = test.host.store().snapshot();
    let mut namespaces: Vec<&str> = registry
        .modules
        .iter()
        .map(|m| m.namespace.as_str())
        .filter(|ns| *ns != "core")
        .collect();
    namespaces.sort();
    assert_eq!(namespaces, vec!["alpha", "beta"]);

    let alpha = registry.get("alpha").unwrap();
    assert_eq!(alpha.local_path, test.root().join("alpha"));
    assert!(alpha.local_path.join("models/a.json").exists());
    assert_eq!(
        alpha.origin,
        ModuleOrigin::Local {
            locator: first.clone()
        }
    );
}

#[tokio::test]
async fn installing_same_namespace_twice_is_idempotent() {
    let test = TestHost::booted().await;
    let first = write_module(&test.sources().join("one/extra"), "extra", &[]);
    let again = write_module(&test.sources().join("two/extra-copy"), "extra", &[]);

    assert!(test.host.install(&ModuleSource::local(&first)).await.unwrap());
    assert!(!test.host.install(&ModuleSource::local(&again)).await.unwrap());

    let registry = test.host.store().snapshot();
    let count = registry.modules.iter().filter(|m| m.namespace == "extra").count();
    assert_eq!(count, 1);
    assert!(!test.root().join("extra-copy").exists());

    let errors = test.host.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].error.contains("extra is already existed"));
    assert!(test.notifier.calls().is_empty(), "validation rejections are not dialogs");
}

#[tokio::test]
async fn local_source_without_marker_is_not_installed() {
    let test = TestHost::booted().await;
    let plain = test.sources().join("plain");
    std::fs::create_dir_all(&plain).unwrap();
    std::fs::write(plain.join("package.json"), json!({"name": "plain"}).to_string()).unwrap();
    let before = test.host.store().snapshot();

    let source = ModuleSource::local(&plain);
    assert!(test.host.info(&source).await.unwrap().is_none());
    assert!(!test.host.install(&source).await.unwrap());

    assert_eq!(test.host.store().snapshot(), before);
    assert!(!test.root().join("plain").exists());
}

#[tokio::test]
async fn uninstall_unknown_namespace_changes_nothing() {
    let test = TestHost::booted().await;
    let before = test.host.store().snapshot();
    let entries: Vec<_> = std::fs::read_dir(test.root()).unwrap().collect();

    assert!(!test.host.uninstall("nobody").await.unwrap());

    assert_eq!(test.host.store().snapshot(), before);
    assert_eq!(std::fs::read_dir(test.root()).unwrap().count(), entries.len());
    assert!(test.host.errors().is_empty());
}

#[tokio::test]
async fn uninstall_removes_directory_and_entry() {
    let test = TestHost::booted().await;
    let source = write_module(&test.sources().join("extra"), "extra", &[]);
    assert!(test.host.install(&ModuleSource::local(&source)).await.unwrap());
    let dir = test.root().join("extra");
    assert!(dir.exists());

    assert!(test.host.uninstall("extra").await.unwrap());
    assert!(!dir.exists());
    assert!(!test.host.store().snapshot().contains("extra"));

    test.host.store().flush().await.unwrap();
    let persisted: serde_json::Value =
        serde_json::from_slice(&std::fs::read(test.root().join("modules.json")).unwrap()).unwrap();
    let namespaces: Vec<&str> = persisted["modules"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|m| m["namespace"].as_str())
        .collect();
    assert_eq!(namespaces, vec!["core"]);
}

#[tokio::test]
async fn core_module_cannot_be_uninstalled() {
    let test = TestHost::booted().await;
    assert!(!test.host.uninstall("core").await.unwrap());
    assert!(test.host.store().snapshot().contains("core"));
    assert_eq!(test.host.errors().len(), 1);
}

#[tokio::test]
async fn failed_clone_is_reported_and_leaves_no_directory() {
    let test = TestHost::booted().await;
    let repo = "https://example.com/team/broken";
    test.transport
        .serve_manifest(repo, "main", &manifest("broken", &[]));

    let err = test
        .host
        .install(&ModuleSource::remote(repo, None))
        .await
        .unwrap_err();
    assert!(matches!(err, HostError::Install(InstallError::Clone { .. })));
    assert!(!test.root().join("broken").exists());
    assert!(!test.host.store().snapshot().contains("broken"));

    let calls = test.notifier.calls();
    assert_eq!(calls.len(), 1);
    assert!(!calls[0].2, "install failures are not blocking");
    assert_eq!(test.host.errors()[0].display_name, repo);
}

#[tokio::test]
async fn remote_manifest_status_error_is_transport_class() {
    let test = TestHost::booted().await;
    let repo = "https://example.com/team/flaky";
    test.transport.serve(
        &cucumber_host::installer::raw_manifest_url(repo, "main", "package.json"),
        503,
        Vec::new(),
    );
    let err = test
        .host
        .info(&ModuleSource::remote(repo, None))
        .await
        .unwrap_err();
    assert_eq!(err.class(), cucumber_host::ErrorClass::Transport);
}

#[tokio::test]
async fn install_reports_progress_and_honours_abort() {
    let test = TestHost::booted().await;
    let repo = "https://example.com/team/extra";
    let items = [item("a", json!({}), &[])];
    let fixture = write_module(&test.sources().join("extra-repo"), "extra", &items);
    test.transport.serve_manifest(repo, "main", &manifest("extra", &items));
    test.cloner.register(repo, &fixture);

    let (handle, signal) = AbortSignal::pair();
    handle.abort();
    let aborted = InstallOptions {
        progress: None,
        abort: Some(signal),
    };
    let err = test
        .host
        .install_with(&ModuleSource::remote(repo, None), &aborted)
        .await
        .unwrap_err();
    assert!(matches!(err, HostError::Install(InstallError::Aborted(_))));

    let seen: Arc<Mutex<Vec<Progress>>> = Arc::default();
    let sink = seen.clone();
    let options = InstallOptions {
        progress: Some(Arc::new(move |p: Progress| sink.lock().push(p))),
        abort: None,
    };
    assert!(test
        .host
        .install_with(&ModuleSource::remote(repo, None), &options)
        .await
        .unwrap());
    let seen = seen.lock().clone();
    assert_eq!(seen.len(), 3, "manifest fetch then two clone reports: {:?}", seen);
    assert_eq!(seen[1], Progress { loaded: 0, total: None });
    assert!(seen[2].loaded > 0);
    assert_eq!(Some(seen[2].loaded), seen[2].total);
}

#[tokio::test]
async fn remote_refs_are_listed() {
    let test = TestHost::booted().await;
    let repo = "https://example.com/team/extra";
    test.cloner.set_refs(repo, &["main", "dev"]);
    assert_eq!(
        test.host.list_remote_refs(repo).await.unwrap(),
        vec!["main".to_string(), "dev".to_string()]
    );
    assert!(test.host.list_remote_refs("https://example.com/none").await.is_err());
}
