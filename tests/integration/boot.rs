use crate::integration::support::{item, manifest, write_module, TestHost};
use cucumber_host::installer::raw_manifest_url;
use cucumber_host::manager::BootStage;
use cucumber_host::{BootState, ErrorClass, ModuleOrigin, ReplicatedValue};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn fresh_root_boots_to_ready_with_protected_core() {
    let test = TestHost::new();
    test.serve_core(&[item("base", json!({"Version": 3}), &[])]);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = seen.clone();
    let flag = ReplicatedValue::create(test.host.node(), "modulesBooting", BootState::Booting);
    flag.watch(move |state: &BootState| recorder.lock().push(state.clone()));

    test.host.boot().await.unwrap();

    assert!(test.root().join("modules.json").exists());
    assert_eq!(test.host.stage(), BootStage::Ready);
    assert_eq!(test.host.store().boot_state(), BootState::Ready);
    assert_eq!(seen.lock().first(), Some(&BootState::Booting));
    assert_eq!(seen.lock().last(), Some(&BootState::Ready));

    let registry = test.host.store().snapshot();
    let core = registry.get("core").unwrap();
    assert!(!core.closeable);
    assert!(core.enabled);
    assert_eq!(core.local_path, test.root().join("desktop-cucumber_core"));
    assert!(core.local_path.join("origin.txt").exists());
    assert_eq!(
        test.cloner.clones(),
        vec![(test.host.config().core_source.clone(), "main".to_string())]
    );
}

#[tokio::test]
async fn second_boot_adopts_existing_core_without_fetching() {
    let test = TestHost::booted().await;
    let requests = test.transport.requests().len();

    test.host.boot().await.unwrap();
    assert_eq!(test.transport.requests().len(), requests);
    assert_eq!(test.host.store().snapshot().modules.len(), 1);
}

#[tokio::test]
async fn unreachable_core_is_boot_fatal() {
    let test = TestHost::new();

    let err = test.host.boot().await.unwrap_err();
    assert!(matches!(test.host.stage(), BootStage::Error(_)));
    assert!(matches!(test.host.store().boot_state(), BootState::Error(_)));

    let calls = test.notifier.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].2, "boot failures are blocking");
    assert_eq!(test.host.errors().len(), 1);
    assert_eq!(test.host.errors()[0].display_name, "boot");
    assert!(test.host.errors()[0].error.contains("is not a module"));
    assert_eq!(err.class(), ErrorClass::Validation);
}

#[tokio::test]
async fn unrecorded_module_directory_is_adopted_on_boot() {
    let test = TestHost::new();
    test.serve_core(&[item("base", json!({}), &[])]);

    let dir = write_module(&test.root().join("extra"), "extra", &[item("a", json!({}), &[])]);
    let origin = ModuleOrigin::Local {
        locator: test.sources().join("extra"),
    };
    std::fs::write(dir.join("origin.txt"), serde_json::to_vec(&origin).unwrap()).unwrap();

    test.host.boot().await.unwrap();
    let registry = test.host.store().snapshot();
    let extra = registry.get("extra").unwrap();
    assert!(extra.closeable);
    assert!(!extra.enabled);
    assert_eq!(extra.origin, origin);
}

#[tokio::test]
async fn recorded_module_without_directory_is_reinstalled() {
    let test = TestHost::booted().await;
    let repo = "https://example.com/team/extra";
    let items = [item("a", json!({"x": 1}), &[])];
    let fixture = write_module(&test.sources().join("extra-repo"), "extra", &items);
    test.transport.serve_manifest(repo, "dev", &manifest("extra", &items));
    test.cloner.register(repo, &fixture);

    let source = cucumber_host::ModuleSource::remote(repo, Some("dev"));
    assert!(test.host.install(&source).await.unwrap());
    let installed = test.host.store().snapshot().get("extra").cloned().unwrap();
    test.host.store().flush().await.unwrap();

    std::fs::remove_dir_all(&installed.local_path).unwrap();
    test.host.boot().await.unwrap();

    let registry = test.host.store().snapshot();
    assert!(registry.contains("extra"));
    assert!(installed.local_path.join("models/a.json").exists());
    let clones = test.cloner.clones();
    assert_eq!(clones.last(), Some(&(repo.to_string(), "dev".to_string())));
}

#[tokio::test]
async fn missing_core_directory_is_reinstalled_from_its_origin() {
    let test = TestHost::booted().await;
    let core_dir = test.host.store().snapshot().get("core").unwrap().local_path.clone();
    std::fs::remove_dir_all(&core_dir).unwrap();

    test.host.boot().await.unwrap();
    let registry = test.host.store().snapshot();
    assert!(!registry.get("core").unwrap().closeable);
    assert!(core_dir.join("package.json").exists());
    assert_eq!(test.cloner.clones().len(), 2);
}

#[tokio::test]
async fn failed_core_reinstall_is_boot_fatal() {
    let test = TestHost::booted().await;
    let core_source = test.host.config().core_source.clone();
    test.transport.serve(
        &raw_manifest_url(&core_source, "main", "package.json"),
        404,
        b"Not Found".to_vec(),
    );
    let core_dir = test.host.store().snapshot().get("core").unwrap().local_path.clone();
    std::fs::remove_dir_all(&core_dir).unwrap();

    let err = test.host.boot().await.unwrap_err();
    assert_eq!(err.class(), ErrorClass::Validation);
    assert!(matches!(test.host.stage(), BootStage::Error(_)));
    assert!(matches!(test.host.store().boot_state(), BootState::Error(_)));
    let calls = test.notifier.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].2);
}

#[tokio::test]
async fn ready_is_published_after_the_registry_is_on_disk() {
    let test = TestHost::new();
    test.serve_core(&[item("base", json!({}), &[])]);
    let registry_file = test.root().join("modules.json");

    let on_disk_at_ready = Arc::new(Mutex::new(None));
    let recorder = on_disk_at_ready.clone();
    let flag = ReplicatedValue::create(test.host.node(), "modulesBooting", BootState::Booting);
    flag.watch(move |state: &BootState| {
        if *state == BootState::Ready {
            let text = std::fs::read_to_string(&registry_file).unwrap_or_default();
            *recorder.lock() = Some(text.contains("\"core\""));
        }
    });

    test.host.boot().await.unwrap();
    assert_eq!(*on_disk_at_ready.lock(), Some(true));
}

#[tokio::test]
async fn registry_write_failure_is_boot_fatal() {
    let test = TestHost::booted().await;
    std::fs::create_dir_all(test.root().join("modules.json.tmp")).unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = seen.clone();
    let flag = ReplicatedValue::create(test.host.node(), "modulesBooting", BootState::Booting);
    flag.watch(move |state: &BootState| recorder.lock().push(state.clone()));

    let err = test.host.boot().await.unwrap_err();
    assert_eq!(err.class(), ErrorClass::Filesystem);
    assert!(err.to_string().contains("modules.json"));
    assert!(matches!(test.host.store().boot_state(), BootState::Error(_)));
    assert!(!seen.lock().contains(&BootState::Ready));
}

#[tokio::test]
async fn origin_records_from_earlier_installs_are_adopted() {
    let test = TestHost::new();
    test.serve_core(&[item("base", json!({}), &[])]);

    let local = write_module(&test.root().join("local-one"), "local_one", &[item("a", json!({}), &[])]);
    let source = test.sources().join("local-one");
    std::fs::write(
        local.join("origin.txt"),
        json!({"from": "local", "url": source.to_string_lossy()}).to_string(),
    )
    .unwrap();

    let remote = write_module(&test.root().join("remote-one"), "remote_one", &[item("b", json!({}), &[])]);
    std::fs::write(
        remote.join("origin.txt"),
        r#"{"from":"github","url":"https://github.com/wenxig/remote-one"}"#,
    )
    .unwrap();

    test.host.boot().await.unwrap();
    let registry = test.host.store().snapshot();
    assert_eq!(
        registry.get("local_one").unwrap().origin,
        ModuleOrigin::Local { locator: source }
    );
    assert_eq!(
        registry.get("remote_one").unwrap().origin,
        ModuleOrigin::Remote {
            locator: "https://github.com/wenxig/remote-one".to_string(),
            reference: None,
        }
    );
}
