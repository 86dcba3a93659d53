use crate::integration::support::{item, write_module, TestHost};
use cucumber_host::{ModuleRegistry, ModuleSource, ReplicaNode, ReplicatedValue};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn counted(value: &ReplicatedValue<i64>) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let c = count.clone();
    value.watch(move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    });
    count
}

#[test]
fn late_surface_starts_from_latest_value() {
    let owner = ReplicaNode::owner();
    let value = ReplicatedValue::create(&owner, "counter", 0i64);
    for n in 1..=5 {
        value.set(n);
    }

    let surface = owner.attach_surface();
    let late = ReplicatedValue::create(&surface, "counter", -1i64);
    assert_eq!(late.get(), 5);
}

#[test]
fn surface_change_reaches_other_surfaces_without_echo() {
    let owner = ReplicaNode::owner();
    let a = owner.attach_surface();
    let b = owner.attach_surface();
    let vo = ReplicatedValue::create(&owner, "counter", 0i64);
    let va = ReplicatedValue::create(&a, "counter", 0i64);
    let vb = ReplicatedValue::create(&b, "counter", 0i64);
    let a_seen = counted(&va);
    let b_seen = counted(&vb);

    assert!(va.set(7));
    assert_eq!(a_seen.load(Ordering::SeqCst), 1);

    assert_eq!(owner.pump(), 1);
    assert_eq!(vo.get(), 7);
    assert_eq!(b.pump(), 1);
    assert_eq!(vb.get(), 7);
    assert_eq!(b_seen.load(Ordering::SeqCst), 1);

    assert_eq!(a.pump(), 0, "the originating surface gets nothing back");
    assert_eq!(a_seen.load(Ordering::SeqCst), 1);
}

#[test]
fn owner_change_reaches_every_surface() {
    let owner = ReplicaNode::owner();
    let surfaces: Vec<ReplicaNode> = (0..3).map(|_| owner.attach_surface()).collect();
    let vo = ReplicatedValue::create(&owner, "flag", 0i64);
    let held: Vec<ReplicatedValue<i64>> = surfaces
        .iter()
        .map(|s| ReplicatedValue::create(s, "flag", 0i64))
        .collect();

    vo.set(3);
    for (surface, value) in surfaces.iter().zip(&held) {
        assert_eq!(surface.pump(), 1);
        assert_eq!(value.get(), 3);
    }
    assert_eq!(owner.pump(), 0);
}

#[tokio::test]
async fn served_nodes_converge() {
    let owner = ReplicaNode::owner();
    let a = owner.attach_surface();
    let b = owner.attach_surface();
    let _vo = ReplicatedValue::create(&owner, "name", String::new());
    let va = ReplicatedValue::create(&a, "name", String::new());
    let vb = ReplicatedValue::create(&b, "name", String::new());

    let tasks: Vec<_> = [owner.clone(), b.clone()]
        .into_iter()
        .map(|node| tokio::spawn(async move { node.serve().await }))
        .collect();

    va.set("hiyori".to_string());
    tokio::time::timeout(Duration::from_secs(5), async {
        while vb.get() != "hiyori" {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    for task in tasks {
        task.abort();
    }
}

#[tokio::test]
async fn surface_follows_the_module_registry() {
    let test = TestHost::booted().await;
    let surface = test.host.node().attach_surface();
    let registry = ReplicatedValue::create(&surface, "modules", ModuleRegistry::default());
    assert!(registry.get().contains("core"));

    let source = write_module(
        &test.sources().join("extra"),
        "extra",
        &[item("a", json!({}), &[])],
    );
    assert!(test.host.install(&ModuleSource::local(&source)).await.unwrap());

    assert!(surface.pump() >= 1);
    assert!(registry.get().contains("extra"));
}
