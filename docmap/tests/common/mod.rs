#![allow(dead_code)]

use async_trait::async_trait;
use bson::{Bson, Document};
use docmap::{
    backend::{Session, StoreBackend},
    callbacks::{CallbackKind, HookContext, HookFlow},
    document::DocumentNode,
    error::{DocumentStoreError, DocumentStoreResult},
    memory::InMemoryStore,
    model::{Model, ModelBuilder, Relation},
};
use mea::mutex::Mutex;
use std::{
    fmt::{self, Debug},
    sync::{
        Arc,
        Mutex as SyncMutex,
        atomic::{AtomicBool, Ordering},
    },
};

/// A write the engine issued, as seen by the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    Insert {
        collection: String,
        document: Document,
        session: Option<Session>,
    },
    Update {
        collection: String,
        selector: Document,
        update: Document,
        session: Option<Session>,
    },
}

impl Write {
    pub fn session(&self) -> Option<Session> {
        match self {
            Write::Insert { session, .. } | Write::Update { session, .. } => *session,
        }
    }

    pub fn collection(&self) -> &str {
        match self {
            Write::Insert { collection, .. } | Write::Update { collection, .. } => collection,
        }
    }
}

/// In-memory backend that records every write and can be told to fail them.
pub struct RecordingBackend {
    pub store: InMemoryStore,
    writes: Mutex<Vec<Write>>,
    failing: AtomicBool,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self {
            store: InMemoryStore::new(),
            writes: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
        }
    }

    pub fn fail_writes(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub async fn writes(&self) -> Vec<Write> {
        self.writes.lock().await.clone()
    }

    fn check(&self) -> DocumentStoreResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(DocumentStoreError::Backend("connection reset".to_string()))
        } else {
            Ok(())
        }
    }
}

impl Debug for RecordingBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingBackend")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl StoreBackend for RecordingBackend {
    async fn insert_one(
        &self,
        collection: &str,
        document: Document,
        session: Option<&Session>,
    ) -> DocumentStoreResult<()> {
        self.check()?;
        self.writes.lock().await.push(Write::Insert {
            collection: collection.to_string(),
            document: document.clone(),
            session: session.copied(),
        });

        self.store.insert_one(collection, document, session).await
    }

    async fn update_one(
        &self,
        collection: &str,
        selector: Document,
        update: Document,
        session: Option<&Session>,
    ) -> DocumentStoreResult<u64> {
        self.check()?;
        self.writes.lock().await.push(Write::Update {
            collection: collection.to_string(),
            selector: selector.clone(),
            update: update.clone(),
            session: session.copied(),
        });

        self.store.update_one(collection, selector, update, session).await
    }

    async fn find_one(
        &self,
        collection: &str,
        selector: Document,
    ) -> DocumentStoreResult<Option<Document>> {
        self.store.find_one(collection, selector).await
    }

    async fn start_session(&self) -> DocumentStoreResult<Session> {
        self.store.start_session().await
    }

    async fn end_session(&self, session: Session) -> DocumentStoreResult<()> {
        self.store.end_session(session).await
    }
}

pub type HookLog = Arc<SyncMutex<Vec<String>>>;

fn label(document: &DocumentNode, context: &HookContext<'_>) -> String {
    let name = match document.get("name") {
        Some(Bson::String(name)) => name.clone(),
        _ => document.model().name().to_string(),
    };

    if context.cascaded {
        format!("{} (cascaded)", name)
    } else {
        name
    }
}

/// Registers before/after hooks of every kind that append to `log`.
pub fn recorded(mut builder: ModelBuilder, log: &HookLog) -> ModelBuilder {
    for kind in [CallbackKind::Save, CallbackKind::Create, CallbackKind::PersistParent] {
        let before = Arc::clone(log);
        let after = Arc::clone(log);

        builder = builder
            .before(kind, move |document, context| {
                before
                    .lock()
                    .unwrap()
                    .push(format!("before {} {}", kind, label(document, context)));
                HookFlow::Continue
            })
            .after(kind, move |document, context| {
                after
                    .lock()
                    .unwrap()
                    .push(format!("after {} {}", kind, label(document, context)));
            });
    }

    builder
}

fn require_name(builder: ModelBuilder) -> ModelBuilder {
    builder.validate(|document, _context, errors| {
        if document.get("name").is_none() {
            errors.add("name", "can't be blank");
        }
    })
}

/// Models shared by the integration tests.
///
/// - `Band` (collection `bands`) embeds many cascading `members` and one `label`
/// - `Member` embeds one cascading `instrument`
/// - `Person` (collection `people`) embeds cascading `addresses`, which embed cascading
///   `locations`, which embed cascading `tags`
pub struct Fixtures {
    pub log: HookLog,
    pub band: Arc<Model>,
    pub member: Arc<Model>,
    pub person: Arc<Model>,
}

impl Fixtures {
    pub fn new() -> Self {
        let log: HookLog = Arc::default();

        let instrument = recorded(Model::builder("Instrument").embedded(), &log).build();
        let member = recorded(require_name(Model::builder("Member").embedded()), &log)
            .relation(Relation::embeds_one("instrument", &instrument).cascade_callbacks())
            .build();
        let label = recorded(Model::builder("Label").embedded(), &log).build();
        let band = recorded(require_name(Model::builder("Band")), &log)
            .relation(Relation::embeds_many("members", &member).cascade_callbacks())
            .relation(Relation::embeds_one("label", &label))
            .build();

        let tag = recorded(Model::builder("Tag").embedded(), &log).build();
        let location = recorded(Model::builder("Location").embedded(), &log)
            .relation(Relation::embeds_many("tags", &tag).cascade_callbacks())
            .build();
        let address = recorded(Model::builder("Address").embedded(), &log)
            .relation(Relation::embeds_many("locations", &location).cascade_callbacks())
            .build();
        let person = recorded(Model::builder("Person").collection("people"), &log)
            .relation(Relation::embeds_many("addresses", &address).cascade_callbacks())
            .build();

        Self {
            log,
            band,
            member,
            person,
        }
    }

    pub fn hooks(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn clear_hooks(&self) {
        self.log.lock().unwrap().clear();
    }
}
