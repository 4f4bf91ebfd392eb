mod common;

use bson::{Bson, doc};
use common::{Fixtures, RecordingBackend};
use docmap::{
    backend::StoreBackend,
    callbacks::{CallbackKind, HookFlow, Stage},
    document::DocumentTree,
    model::{Model, Relation},
    persist::{self, InsertOptions},
};
use std::sync::{Arc, Mutex};

#[tokio::test]
async fn root_insert_cascades_hooks_to_new_children() {
    let fixtures = Fixtures::new();
    let backend = RecordingBackend::new();

    let mut tree = DocumentTree::new(&fixtures.band, doc! { "name": "Band" });
    let root = tree.root();
    let alice = tree.embed(root, "members", doc! { "name": "Alice" }).unwrap();
    tree.embed(alice, "instrument", doc! { "name": "Bass" }).unwrap();
    tree.embed(root, "label", doc! { "name": "Indie" }).unwrap();

    persist::insert(&backend, &mut tree, root, InsertOptions::default())
        .await
        .unwrap();

    assert_eq!(
        fixtures.hooks(),
        vec![
            "before save Band",
            "before create Band",
            "before persist_parent Band",
            "before save Alice (cascaded)",
            "before save Bass (cascaded)",
            "before create Alice (cascaded)",
            "before create Bass (cascaded)",
            "after create Alice (cascaded)",
            "after create Bass (cascaded)",
            "after save Alice (cascaded)",
            "after save Bass (cascaded)",
            "after persist_parent Band",
            "after create Band",
            "after save Band",
        ]
    );
}

#[tokio::test]
async fn hooks_fire_once_when_a_child_inserts_its_parent() {
    let fixtures = Fixtures::new();
    let backend = RecordingBackend::new();

    let mut tree = DocumentTree::new(&fixtures.band, doc! { "name": "Band" });
    let root = tree.root();
    let alice = tree.embed(root, "members", doc! { "name": "Alice" }).unwrap();
    tree.embed(alice, "instrument", doc! { "name": "Bass" }).unwrap();

    persist::insert(&backend, &mut tree, alice, InsertOptions::default())
        .await
        .unwrap();

    assert_eq!(
        fixtures.hooks(),
        vec![
            "before save Alice",
            "before create Alice",
            "before persist_parent Alice",
            "before save Bass (cascaded)",
            "before create Bass (cascaded)",
            "before save Band",
            "before create Band",
            "before persist_parent Band",
            "after persist_parent Band",
            "after create Band",
            "after save Band",
            "after create Bass (cascaded)",
            "after save Bass (cascaded)",
            "after persist_parent Alice",
            "after create Alice",
            "after save Alice",
        ]
    );
    assert_eq!(backend.writes().await.len(), 1);
}

#[tokio::test]
async fn hooks_fire_once_when_insertion_climbs_three_levels() {
    let fixtures = Fixtures::new();
    let backend = RecordingBackend::new();

    let mut tree = DocumentTree::new(&fixtures.person, doc! { "name": "Pat" });
    let root = tree.root();
    let home = tree.embed(root, "addresses", doc! { "name": "Home" }).unwrap();
    tree.embed(root, "addresses", doc! { "name": "Work" }).unwrap();
    let office = tree.embed(home, "locations", doc! { "name": "Office" }).unwrap();
    tree.embed(home, "locations", doc! { "name": "Lobby" }).unwrap();
    let tag = tree.embed(office, "tags", doc! { "name": "Urgent" }).unwrap();

    persist::insert(&backend, &mut tree, tag, InsertOptions::default())
        .await
        .unwrap();

    assert_eq!(
        fixtures.hooks(),
        vec![
            "before save Urgent",
            "before create Urgent",
            "before persist_parent Urgent",
            "before save Office",
            "before create Office",
            "before persist_parent Office",
            "before save Home",
            "before create Home",
            "before persist_parent Home",
            "before save Lobby (cascaded)",
            "before create Lobby (cascaded)",
            "before save Pat",
            "before create Pat",
            "before persist_parent Pat",
            "before save Work (cascaded)",
            "before create Work (cascaded)",
            "after create Work (cascaded)",
            "after save Work (cascaded)",
            "after persist_parent Pat",
            "after create Pat",
            "after save Pat",
            "after create Lobby (cascaded)",
            "after save Lobby (cascaded)",
            "after persist_parent Home",
            "after create Home",
            "after save Home",
            "after persist_parent Office",
            "after create Office",
            "after save Office",
            "after persist_parent Urgent",
            "after create Urgent",
            "after save Urgent",
        ]
    );

    for name in ["Pat", "Home", "Work", "Office", "Lobby", "Urgent"] {
        for kind in ["save", "create"] {
            let fired = |phase: &str| {
                fixtures
                    .hooks()
                    .iter()
                    .filter(|hook| {
                        hook.starts_with(&format!("{} {} ", phase, kind))
                            && hook.split(' ').nth(2) == Some(name)
                    })
                    .count()
            };

            assert_eq!(fired("before"), 1, "before {} of {}", kind, name);
            assert_eq!(fired("after"), 1, "after {} of {}", kind, name);
        }
    }

    assert_eq!(backend.writes().await.len(), 1);
    assert!(tree.descendants(root).iter().all(|id| tree.node(*id).is_persisted()));
}

#[tokio::test]
async fn persisted_children_are_not_cascaded_again() {
    let fixtures = Fixtures::new();
    let backend = RecordingBackend::new();

    let mut tree = DocumentTree::new(&fixtures.band, doc! { "name": "Band" });
    let root = tree.root();
    let alice = tree.embed(root, "members", doc! { "name": "Alice" }).unwrap();
    persist::insert(&backend, &mut tree, root, InsertOptions::default())
        .await
        .unwrap();
    fixtures.clear_hooks();

    tree.embed(alice, "instrument", doc! { "name": "Bass" }).unwrap();
    let bob = tree.embed(root, "members", doc! { "name": "Bob" }).unwrap();
    persist::insert(&backend, &mut tree, bob, InsertOptions::default())
        .await
        .unwrap();

    assert!(!fixtures.hooks().iter().any(|hook| hook.contains("Band") || hook.contains("Alice")));
    assert_eq!(fixtures.hooks().first().map(String::as_str), Some("before save Bob"));
}

#[tokio::test]
async fn halting_before_create_skips_the_write_and_after_hooks() {
    let calls = Arc::new(Mutex::new(Vec::<String>::new()));
    let (before_save, after_save) = (Arc::clone(&calls), Arc::clone(&calls));

    let album = Model::builder("Album")
        .before(CallbackKind::Save, move |_, _| {
            before_save.lock().unwrap().push("before save".to_string());
            HookFlow::Continue
        })
        .before(CallbackKind::Create, |document, _| {
            if document.get("draft") == Some(&Bson::Boolean(true)) {
                HookFlow::Halt
            } else {
                HookFlow::Continue
            }
        })
        .after(CallbackKind::Save, move |_, _| {
            after_save.lock().unwrap().push("after save".to_string());
        })
        .build();
    let backend = RecordingBackend::new();

    let mut tree = DocumentTree::new(&album, doc! { "title": "Demo", "draft": true });
    let root = tree.root();
    persist::insert(&backend, &mut tree, root, InsertOptions::default())
        .await
        .unwrap();

    assert!(tree.node(root).is_new_record());
    assert_eq!(tree.node(root).halted_stage(), Some(Stage::Create));
    assert!(tree.node(root).errors().is_empty());
    assert_eq!(*calls.lock().unwrap(), vec!["before save"]);
    assert!(backend.writes().await.is_empty());

    tree.node_mut(root).set("draft", false);
    persist::insert(&backend, &mut tree, root, InsertOptions::default())
        .await
        .unwrap();

    assert!(tree.node(root).is_persisted());
    assert_eq!(tree.node(root).halted_stage(), None);
    assert_eq!(*calls.lock().unwrap(), vec!["before save", "before save", "after save"]);
}

#[tokio::test]
async fn cascaded_children_can_halt_their_parent() {
    let roadie = Model::builder("Roadie")
        .embedded()
        .before(CallbackKind::Save, |document, context| {
            if context.cascaded && document.get("banned") == Some(&Bson::Boolean(true)) {
                HookFlow::Halt
            } else {
                HookFlow::Continue
            }
        })
        .build();
    let tour = Model::builder("Tour")
        .relation(Relation::embeds_many("crew", &roadie).cascade_callbacks())
        .build();
    let backend = RecordingBackend::new();

    let mut tree = DocumentTree::new(&tour, doc! { "name": "World" });
    let root = tree.root();
    let banned = tree.embed(root, "crew", doc! { "banned": true }).unwrap();

    persist::insert(&backend, &mut tree, root, InsertOptions::default())
        .await
        .unwrap();

    assert_eq!(tree.node(root).halted_stage(), Some(Stage::ChildSave));
    assert!(tree.node(root).is_new_record());
    assert!(tree.node(banned).is_new_record());
    assert!(backend.writes().await.is_empty());
}

#[tokio::test]
async fn hooks_can_fill_in_attributes_before_the_write() {
    let track = Model::builder("Track")
        .before(CallbackKind::Create, |document, _| {
            if document.get("position").is_none() {
                document.set("position", 1);
            }
            HookFlow::Continue
        })
        .build();
    let backend = RecordingBackend::new();

    let mut tree = DocumentTree::new(&track, doc! { "title": "Intro" });
    let root = tree.root();
    persist::insert(&backend, &mut tree, root, InsertOptions::default())
        .await
        .unwrap();

    let stored = backend
        .store
        .find_one("tracks", doc! { "_id": *tree.node(root).id() })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.get_i32("position").unwrap(), 1);
}
