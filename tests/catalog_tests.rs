use stagehand::domain::{ContainerRecord, ImageRecord};
use stagehand::infra::{CatalogStore, ContainerQuery, ImageQuery};
use tempfile::TempDir;

#[test]
fn catalog_survives_reopening() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("data.db");

    {
        let store = CatalogStore::open(&path).unwrap();
        store.init_tables().unwrap();
        store
            .put(&[ImageRecord::new("demo", "latest", "sha256:aaa")])
            .unwrap();
    }

    let store = CatalogStore::open(&path).unwrap();
    store.init_tables().unwrap();
    let found = store.find_images(&ImageQuery::default()).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].name, "demo");
    assert_eq!(found[0].runtime_id, "sha256:aaa");
    assert!(found[0].is_available);
}

#[test]
fn put_is_an_upsert_under_the_natural_key() {
    let tmp = TempDir::new().unwrap();
    let store = CatalogStore::open(tmp.path().join("data.db")).unwrap();
    store.init_tables().unwrap();

    let first = ImageRecord::new("demo", "1.2", "sha256:aaa");
    let mut second = first.clone();
    second.runtime_id = "sha256:bbb".to_string();

    store.put(std::slice::from_ref(&first)).unwrap();
    store.put(std::slice::from_ref(&second)).unwrap();

    let found = store
        .find_images(&ImageQuery {
            name: Some("demo".into()),
            tag: Some("1.2".into()),
            ..ImageQuery::default()
        })
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].runtime_id, "sha256:bbb");
}

#[test]
fn containers_are_keyed_by_name() {
    let tmp = TempDir::new().unwrap();
    let store = CatalogStore::open(tmp.path().join("data.db")).unwrap();
    store.init_tables().unwrap();

    let record = ContainerRecord::new("service-demo-1.2", "ctr-1");
    store.add(std::slice::from_ref(&record)).unwrap();
    assert!(store.exists(&record).unwrap());

    // A second create for the same service replaces the old entry.
    let replacement = ContainerRecord::new("service-demo-1.2", "ctr-2");
    store.put(std::slice::from_ref(&replacement)).unwrap();

    let found = store
        .find_containers(&ContainerQuery::by_name("service-demo-1.2"))
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].runtime_id, "ctr-2");

    store.delete(std::slice::from_ref(&replacement)).unwrap();
    assert!(!store.exists(&replacement).unwrap());
}
