mod common;

use bson::{Bson, doc};
use common::{Fixtures, RecordingBackend, Write};
use docmap::{
    callbacks::Stage,
    document::DocumentTree,
    backend::StoreBackend,
    error::DocumentStoreError,
    memory::InMemoryStore,
    persist::{self, InsertOptions},
};

#[tokio::test]
async fn inserting_a_root_writes_the_whole_tree_once() {
    let fixtures = Fixtures::new();
    let backend = RecordingBackend::new();

    let mut tree = DocumentTree::new(&fixtures.band, doc! { "name": "Band" });
    let root = tree.root();
    let alice = tree.embed(root, "members", doc! { "name": "Alice" }).unwrap();
    let bass = tree.embed(alice, "instrument", doc! { "name": "Bass" }).unwrap();

    persist::insert(&backend, &mut tree, root, InsertOptions::default())
        .await
        .unwrap();

    for id in [root, alice, bass] {
        assert!(tree.node(id).is_persisted());
        assert!(tree.node(id).previously_new_record());
    }

    let writes = backend.writes().await;
    assert_eq!(writes.len(), 1);
    assert!(matches!(&writes[0], Write::Insert { collection, .. } if collection == "bands"));

    let stored = backend
        .store
        .find_one("bands", doc! { "_id": *tree.node(root).id() })
        .await
        .unwrap();
    assert_eq!(stored, Some(tree.as_attributes(root)));
}

#[tokio::test]
async fn orphaned_embedded_documents_fail_before_validation() {
    let fixtures = Fixtures::new();
    let backend = RecordingBackend::new();

    // Invalid on purpose: the missing parent must be reported first.
    let mut tree = DocumentTree::new(&fixtures.member, doc! {});
    let root = tree.root();

    let result = persist::insert(&backend, &mut tree, root, InsertOptions::default()).await;

    assert!(matches!(result, Err(DocumentStoreError::MissingParent(model)) if model == "Member"));
    assert!(tree.node(root).errors().is_empty());
    assert!(tree.node(root).is_new_record());
    assert!(backend.writes().await.is_empty());
    assert!(fixtures.hooks().is_empty());
}

#[tokio::test]
async fn embedded_document_with_new_parent_inserts_the_parent() {
    let fixtures = Fixtures::new();
    let backend = RecordingBackend::new();

    let mut tree = DocumentTree::new(&fixtures.band, doc! { "name": "Band" });
    let root = tree.root();
    let alice = tree.embed(root, "members", doc! { "name": "Alice" }).unwrap();

    persist::insert(&backend, &mut tree, alice, InsertOptions::default())
        .await
        .unwrap();

    assert!(tree.node(root).is_persisted());
    assert!(tree.node(alice).is_persisted());

    let writes = backend.writes().await;
    assert_eq!(writes.len(), 1);
    match &writes[0] {
        Write::Insert { collection, document, .. } => {
            assert_eq!(collection, "bands");
            assert_eq!(document, &tree.as_attributes(root));
            assert_eq!(document.get_array("members").unwrap().len(), 1);
        }
        other => panic!("expected an insert, got {:?}", other),
    }
}

#[tokio::test]
async fn embedded_documents_of_persisted_parents_are_pushed_or_set() {
    let fixtures = Fixtures::new();
    let backend = RecordingBackend::new();

    let mut tree = DocumentTree::new(&fixtures.band, doc! { "name": "Band" });
    let root = tree.root();
    persist::insert(&backend, &mut tree, root, InsertOptions::default())
        .await
        .unwrap();

    let alice = tree.embed(root, "members", doc! { "name": "Alice" }).unwrap();
    persist::insert(&backend, &mut tree, alice, InsertOptions::default())
        .await
        .unwrap();

    let label = tree.embed(root, "label", doc! { "name": "Indie" }).unwrap();
    persist::insert(&backend, &mut tree, label, InsertOptions::default())
        .await
        .unwrap();

    let band_id = *tree.node(root).id();
    let writes = backend.writes().await;
    assert_eq!(writes.len(), 3);
    assert_eq!(
        writes[1],
        Write::Update {
            collection: "bands".to_string(),
            selector: doc! { "_id": band_id },
            update: doc! { "$push": { "members": tree.as_attributes(alice) } },
            session: None,
        }
    );
    assert_eq!(
        writes[2],
        Write::Update {
            collection: "bands".to_string(),
            selector: doc! { "_id": band_id },
            update: doc! { "$set": { "label": tree.as_attributes(label) } },
            session: None,
        }
    );

    assert!(tree.node(alice).is_persisted());
    assert!(tree.node(label).is_persisted());
    assert_eq!(
        backend.store.find_one("bands", doc! { "_id": band_id }).await.unwrap(),
        Some(tree.as_attributes(root))
    );
}

#[tokio::test]
async fn deeply_embedded_documents_use_the_positional_operator() {
    let fixtures = Fixtures::new();
    let backend = RecordingBackend::new();

    let mut tree = DocumentTree::new(&fixtures.person, doc! { "name": "Pat" });
    let root = tree.root();
    tree.embed(root, "addresses", doc! { "city": "Berlin" }).unwrap();
    let home = tree.embed(root, "addresses", doc! { "city": "Paris" }).unwrap();
    let office = tree.embed(home, "locations", doc! { "name": "office" }).unwrap();
    persist::insert(&backend, &mut tree, root, InsertOptions::default())
        .await
        .unwrap();

    let tag = tree.embed(office, "tags", doc! { "label": "work" }).unwrap();
    persist::insert(&backend, &mut tree, tag, InsertOptions::default())
        .await
        .unwrap();

    match backend.writes().await.last() {
        Some(Write::Update { collection, selector, update, .. }) => {
            assert_eq!(collection, "people");
            assert_eq!(
                selector,
                &doc! {
                    "_id": *tree.node(root).id(),
                    "addresses._id": *tree.node(home).id(),
                    "addresses.1.locations._id": *tree.node(office).id(),
                }
            );
            assert_eq!(
                update,
                &doc! { "$push": { "addresses.1.locations.$.tags": tree.as_attributes(tag) } }
            );
        }
        other => panic!("expected an update, got {:?}", other),
    }

    assert!(tree.node(tag).is_persisted());
    assert_eq!(
        backend
            .store
            .find_one("people", doc! { "_id": *tree.node(root).id() })
            .await
            .unwrap(),
        Some(tree.as_attributes(root))
    );
}

#[tokio::test]
async fn unmatched_positional_update_leaves_the_child_new() {
    let fixtures = Fixtures::new();
    let writer = RecordingBackend::new();
    let empty = RecordingBackend::new();

    let mut tree = DocumentTree::new(&fixtures.band, doc! { "name": "Band" });
    let root = tree.root();
    persist::insert(&writer, &mut tree, root, InsertOptions::default())
        .await
        .unwrap();
    fixtures.clear_hooks();

    let alice = tree.embed(root, "members", doc! { "name": "Alice" }).unwrap();
    persist::insert(&empty, &mut tree, alice, InsertOptions::default())
        .await
        .unwrap();

    assert!(tree.node(alice).is_new_record());
    assert!(!tree.node(alice).previously_new_record());
    assert!(tree.node(alice).errors().is_empty());
    assert!(!fixtures.hooks().iter().any(|hook| hook.starts_with("after")));
    assert_eq!(empty.writes().await.len(), 1);
    assert_eq!(empty.store.count("bands").await, 0);
}

#[tokio::test]
async fn stale_sibling_index_does_not_report_a_phantom_write() {
    let fixtures = Fixtures::new();
    let backend = RecordingBackend::new();

    let mut tree = DocumentTree::new(&fixtures.person, doc! { "name": "Pat" });
    let root = tree.root();
    persist::insert(&backend, &mut tree, root, InsertOptions::default())
        .await
        .unwrap();

    // Only the second address is written, so it is stored at index 0 but sits at
    // index 1 in memory.
    tree.embed(root, "addresses", doc! { "name": "Draft" }).unwrap();
    let home = tree.embed(root, "addresses", doc! { "name": "Home" }).unwrap();
    let office = tree.embed(home, "locations", doc! { "name": "Office" }).unwrap();
    persist::insert(&backend, &mut tree, home, InsertOptions::default())
        .await
        .unwrap();
    assert!(tree.node(office).is_persisted());

    let tag = tree.embed(office, "tags", doc! { "name": "Urgent" }).unwrap();
    persist::insert(&backend, &mut tree, tag, InsertOptions::default())
        .await
        .unwrap();

    match backend.writes().await.last() {
        Some(Write::Update { selector, .. }) => {
            assert_eq!(
                selector.get("addresses.1.locations._id"),
                Some(&Bson::from(*tree.node(office).id()))
            );
        }
        other => panic!("expected an update, got {:?}", other),
    }

    assert!(tree.node(tag).is_new_record());

    let stored = backend
        .store
        .find_one("people", doc! { "_id": *tree.node(root).id() })
        .await
        .unwrap()
        .unwrap();
    let locations = stored.get_array("addresses").unwrap()[0]
        .as_document()
        .unwrap()
        .get_array("locations")
        .unwrap();
    assert!(!locations[0].as_document().unwrap().contains_key("tags"));
}

#[tokio::test]
async fn invalid_documents_are_not_written() {
    let fixtures = Fixtures::new();
    let backend = RecordingBackend::new();

    let mut tree = DocumentTree::new(&fixtures.band, doc! {});
    let root = tree.root();
    persist::insert(&backend, &mut tree, root, InsertOptions::default())
        .await
        .unwrap();

    assert!(tree.node(root).is_new_record());
    assert_eq!(tree.node(root).errors().on("name"), vec!["can't be blank"]);
    assert!(backend.writes().await.is_empty());
    assert!(fixtures.hooks().is_empty());

    // A later valid attempt starts from a clean slate.
    tree.node_mut(root).set("name", "Band");
    persist::insert(&backend, &mut tree, root, InsertOptions::default())
        .await
        .unwrap();

    assert!(tree.node(root).is_persisted());
    assert!(tree.node(root).errors().is_empty());
}

#[tokio::test]
async fn invalid_children_invalidate_their_parent() {
    let fixtures = Fixtures::new();
    let backend = RecordingBackend::new();

    let mut tree = DocumentTree::new(&fixtures.band, doc! { "name": "Band" });
    let root = tree.root();
    let nameless = tree.embed(root, "members", doc! {}).unwrap();

    persist::insert(&backend, &mut tree, root, InsertOptions::default())
        .await
        .unwrap();

    assert_eq!(tree.node(root).errors().on("members"), vec!["is invalid"]);
    assert!(tree.node(nameless).is_new_record());
    assert!(backend.writes().await.is_empty());

    persist::insert(&backend, &mut tree, root, InsertOptions::new().without_validation())
        .await
        .unwrap();

    assert!(tree.node(root).is_persisted());
    assert!(tree.node(nameless).is_persisted());
    assert_eq!(backend.writes().await.len(), 1);
}

#[tokio::test]
async fn child_stays_new_when_its_new_parent_is_invalid() {
    let fixtures = Fixtures::new();
    let backend = RecordingBackend::new();

    let mut tree = DocumentTree::new(&fixtures.band, doc! {});
    let root = tree.root();
    let alice = tree.embed(root, "members", doc! { "name": "Alice" }).unwrap();

    persist::insert(&backend, &mut tree, alice, InsertOptions::default())
        .await
        .unwrap();

    assert!(tree.node(alice).is_new_record());
    assert!(tree.node(alice).errors().is_empty());
    assert_eq!(tree.node(root).errors().on("name"), vec!["can't be blank"]);
    assert!(backend.writes().await.is_empty());
    assert!(!fixtures.hooks().iter().any(|hook| hook.starts_with("after")));
}

#[tokio::test]
async fn storage_failures_propagate_and_leave_the_tree_new() {
    let fixtures = Fixtures::new();
    let backend = RecordingBackend::new();
    backend.fail_writes();

    let mut tree = DocumentTree::new(&fixtures.band, doc! { "name": "Band" });
    let root = tree.root();
    let alice = tree.embed(root, "members", doc! { "name": "Alice" }).unwrap();

    let result = persist::insert(&backend, &mut tree, alice, InsertOptions::default()).await;

    assert!(matches!(result, Err(DocumentStoreError::Backend(_))));
    assert!(tree.node(root).is_new_record());
    assert!(tree.node(alice).is_new_record());
    assert!(!fixtures.hooks().iter().any(|hook| hook.starts_with("after")));
}

#[tokio::test]
async fn duplicate_roots_are_rejected_by_the_store() {
    let fixtures = Fixtures::new();
    let backend = InMemoryStore::new();

    let mut tree = DocumentTree::new(&fixtures.band, doc! { "name": "Band" });
    let root = tree.root();
    persist::insert(&backend, &mut tree, root, InsertOptions::default())
        .await
        .unwrap();

    let mut copy = tree.clone();
    copy.node_mut(root).set("name", Bson::from("Copy"));
    let result = persist::insert(&backend, &mut copy, root, InsertOptions::default()).await;

    assert!(matches!(result, Err(DocumentStoreError::DocumentAlreadyExists(_, _))));
}

#[tokio::test]
async fn saving_routes_new_records_to_insert() {
    let fixtures = Fixtures::new();
    let backend = RecordingBackend::new();

    let mut tree = DocumentTree::new(&fixtures.band, doc! { "name": "Band" });
    let root = tree.root();

    persist::save(&backend, &mut tree, root, InsertOptions::default())
        .await
        .unwrap();
    assert!(tree.node(root).is_persisted());

    let result = persist::save(&backend, &mut tree, root, InsertOptions::default()).await;
    assert!(matches!(result, Err(DocumentStoreError::Unsupported(_))));
    assert_eq!(tree.node(root).halted_stage(), None::<Stage>);
}
