use stagehand::domain::ServiceManifest;
use stagehand::infra::{CatalogStore, ImageQuery};
use stagehand::services::{
    Broker, ServiceBuildOpts, build_image_from_manifest, build_service_from_manifest,
};
use stagehand::test_support::MockRuntime;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn store() -> CatalogStore {
    let store = CatalogStore::open_in_memory().unwrap();
    store.init_tables().unwrap();
    store
}

fn demo_manifest(dir: &TempDir) -> ServiceManifest {
    ServiceManifest::loads(
        dir.path().join("service.yaml"),
        r#"
name: demo
version: "1.2"
tags:
  - "{{.Name}}:latest"
  - "{{.Name}}:{{.Version}}"
ports:
  - "25565:25565"
"#,
    )
    .unwrap()
}

#[test]
fn image_build_catalogues_one_record_per_tag() {
    let tmp = TempDir::new().unwrap();
    let manifest = demo_manifest(&tmp);

    let runtime = MockRuntime::new();
    runtime.set_image_id("demo:latest", "sha256:aaa");
    runtime.set_image_id("demo:1.2", "sha256:aaa");
    runtime.set_build_log("Step 1/2 : FROM scratch\n");
    let store = store();

    let mut out = Vec::new();
    let records = build_image_from_manifest(&runtime, &store, &manifest, &mut out).unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(
        String::from_utf8(out).unwrap(),
        "Step 1/2 : FROM scratch\n"
    );

    let catalogued = store.find_images(&ImageQuery::default()).unwrap();
    assert_eq!(catalogued.len(), 2);
    let mut tags: Vec<&str> = catalogued.iter().map(|r| r.tag.as_str()).collect();
    tags.sort();
    assert_eq!(tags, vec!["1.2", "latest"]);

    // Cleanup runs between the build and the id lookups.
    let commands = runtime.get_commands();
    assert_eq!(commands[0], "build:demo:latest,demo:1.2");
    assert_eq!(commands[1], "prune:images");
}

#[test]
fn rebuilding_updates_the_catalogued_ids() {
    let tmp = TempDir::new().unwrap();
    let manifest = demo_manifest(&tmp);
    let runtime = MockRuntime::new();
    let store = store();

    runtime.set_image_id("demo:latest", "sha256:aaa");
    runtime.set_image_id("demo:1.2", "sha256:aaa");
    build_image_from_manifest(&runtime, &store, &manifest, &mut Vec::new()).unwrap();

    runtime.set_image_id("demo:latest", "sha256:bbb");
    runtime.set_image_id("demo:1.2", "sha256:bbb");
    build_image_from_manifest(&runtime, &store, &manifest, &mut Vec::new()).unwrap();

    let catalogued = store.find_images(&ImageQuery::default()).unwrap();
    assert_eq!(catalogued.len(), 2);
    assert!(catalogued.iter().all(|r| r.runtime_id == "sha256:bbb"));
}

#[test]
fn prune_failure_aborts_before_cataloguing() {
    let tmp = TempDir::new().unwrap();
    let manifest = demo_manifest(&tmp);
    let runtime = MockRuntime::new();
    runtime.set_image_id("demo:latest", "sha256:aaa");
    runtime.set_image_id("demo:1.2", "sha256:aaa");
    runtime.set_fail_on("prune_images");
    let store = store();

    let err = build_image_from_manifest(&runtime, &store, &manifest, &mut Vec::new()).unwrap_err();
    assert!(err.to_string().contains("pruning"));
    assert!(store.find_images(&ImageQuery::default()).unwrap().is_empty());
}

#[test]
fn unresolvable_image_reference_is_fatal() {
    let tmp = TempDir::new().unwrap();
    let manifest = demo_manifest(&tmp);
    let runtime = MockRuntime::new();
    let store = store();

    let err = build_image_from_manifest(&runtime, &store, &manifest, &mut Vec::new()).unwrap_err();
    assert!(format!("{err:#}").contains("demo:latest"));
    assert!(store.find_images(&ImageQuery::default()).unwrap().is_empty());
}

#[test]
fn service_build_selects_the_substring_matched_tag() {
    let tmp = TempDir::new().unwrap();
    let manifest = demo_manifest(&tmp);
    let runtime = MockRuntime::new();
    let store = store();

    let opts = ServiceBuildOpts {
        service_name: None,
        tag_name: "1.2".to_string(),
    };
    let record = build_service_from_manifest(&runtime, &store, &manifest, &opts).unwrap();

    assert_eq!(record.name, "service-demo-1.2");
    let created = runtime.created_containers();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].config.image, "demo:1.2");
    assert_eq!(created[0].host.port_bindings.len(), 1);
}

#[test]
fn missing_tag_fails_without_touching_the_runtime() {
    let tmp = TempDir::new().unwrap();
    let manifest = demo_manifest(&tmp);
    let runtime = MockRuntime::new();
    let store = store();

    let opts = ServiceBuildOpts {
        service_name: None,
        tag_name: "9.9".to_string(),
    };
    let err = build_service_from_manifest(&runtime, &store, &manifest, &opts).unwrap_err();
    assert!(err.to_string().contains("no container image available"));
    assert!(runtime.created_containers().is_empty());
}

#[test]
fn broker_build_renders_template_assets_first() {
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join("server.properties.tmpl"),
        "motd={{.Name}} {{.Version}}\n",
    )
    .unwrap();
    let manifest = demo_manifest(&tmp);

    let runtime = Arc::new(MockRuntime::new());
    runtime.set_image_id("demo:latest", "sha256:aaa");
    runtime.set_image_id("demo:1.2", "sha256:aaa");
    let broker = Broker::new(runtime.clone(), store());

    broker.build_image(&manifest, &mut Vec::new()).unwrap();

    let rendered = fs::read_to_string(tmp.path().join("server.properties")).unwrap();
    assert_eq!(rendered, "motd=demo 1.2\n");

    let mut listing = Vec::new();
    broker
        .list_images(&mut listing, &ImageQuery::default())
        .unwrap();
    let listing = String::from_utf8(listing).unwrap();
    assert_eq!(listing.lines().count(), 2);
    assert!(listing.contains("demo\tlatest\tsha256:aaa\ttrue"));
}
