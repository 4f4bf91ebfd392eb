//! In-memory storage implementation for the document mapper.
//!
//! This module provides a simple backend that stores top-level documents as BSON
//! documents in HashMaps behind async-safe read-write locks.

use async_trait::async_trait;
use bson::{Bson, Document};
use log::debug;
use mea::rwlock::RwLock;
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};
use uuid::Uuid;

use docmap_core::{
    backend::{Session, StoreBackend, StoreBackendBuilder},
    error::{DocumentStoreError, DocumentStoreResult},
};

use crate::evaluator::DocumentEvaluator;

type CollectionMap = HashMap<String, Document>;
type StoreMap = HashMap<String, CollectionMap>;

/// Thread-safe in-memory document storage backend.
///
/// This struct implements the [`StoreBackend`] trait to provide a document store that
/// operates entirely in memory using async-aware read-write locks. Top-level documents
/// are indexed by their `_id`.
///
/// # Thread Safety
///
/// `InMemoryStore` is cloneable and uses an `Arc`-wrapped internal state, allowing
/// it to be safely shared across async tasks. Multiple clones of the same instance
/// share the same underlying data.
///
/// # Sessions
///
/// Sessions are tracked only to reject writes through unknown or ended sessions;
/// writes are applied immediately either way.
///
/// # Example
///
/// ```ignore
/// use docmap_memory::InMemoryStore;
/// use docmap::backend::StoreBackend;
/// use bson::{Uuid, doc};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = InMemoryStore::new();
///     let id = Uuid::new();
///
///     store.insert_one("bands", doc! { "_id": id, "name": "Band" }, None).await?;
///
///     let band = store.find_one("bands", doc! { "_id": id }).await?;
///     assert!(band.is_some());
///
///     Ok(())
/// }
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    /// The main storage map: collection_name -> (document_id -> document)
    store: Arc<RwLock<StoreMap>>,
    /// Sessions started and not yet ended
    sessions: Arc<RwLock<HashSet<Uuid>>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory document store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder for configuring an in-memory store.
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }

    /// Number of documents stored in `collection`.
    pub async fn count(&self, collection: &str) -> usize {
        self.store
            .read()
            .await
            .get(collection)
            .map(HashMap::len)
            .unwrap_or_default()
    }

    async fn check_session(&self, session: Option<&Session>) -> DocumentStoreResult<()> {
        if let Some(session) = session {
            if !self.sessions.read().await.contains(&session.id()) {
                return Err(DocumentStoreError::Backend(format!("{} is not active", session)));
            }
        }

        Ok(())
    }
}

fn document_key(document: &Document) -> DocumentStoreResult<String> {
    match document.get("_id") {
        Some(Bson::String(id)) => Ok(id.clone()),
        Some(id) => Ok(id.to_string()),
        None => Err(DocumentStoreError::InvalidDocument(
            "top-level documents must carry an _id".to_string()
        )),
    }
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn insert_one(
        &self,
        collection: &str,
        document: Document,
        session: Option<&Session>,
    ) -> DocumentStoreResult<()> {
        self.check_session(session).await?;

        let key = document_key(&document)?;
        let mut store = self.store.write().await;
        let collection_map = store
            .entry(collection.to_string())
            .or_default();

        if collection_map.contains_key(&key) {
            return Err(DocumentStoreError::DocumentAlreadyExists(key, collection.to_string()));
        }

        debug!("Stored {} in {}", key, collection);
        collection_map.insert(key, document);

        Ok(())
    }

    async fn update_one(
        &self,
        collection: &str,
        selector: Document,
        update: Document,
        session: Option<&Session>,
    ) -> DocumentStoreResult<u64> {
        self.check_session(session).await?;

        let mut store = self.store.write().await;
        let Some(collection_map) = store.get_mut(collection) else {
            return Ok(0);
        };

        let Some(document) = collection_map
            .values_mut()
            .find(|document| DocumentEvaluator::new(document).matches(&selector))
        else {
            return Ok(0);
        };

        // Applied to a copy so a failing path leaves the stored record untouched.
        let mut updated = document.clone();
        DocumentEvaluator::apply(&mut updated, &selector, &update)?;
        *document = updated;

        Ok(1)
    }

    async fn find_one(
        &self,
        collection: &str,
        selector: Document,
    ) -> DocumentStoreResult<Option<Document>> {
        let store = self.store.read().await;

        Ok(store
            .get(collection)
            .and_then(|collection_map| {
                collection_map
                    .values()
                    .find(|document| DocumentEvaluator::new(document).matches(&selector))
            })
            .cloned())
    }

    async fn start_session(&self) -> DocumentStoreResult<Session> {
        let session = Session::new();
        self.sessions.write().await.insert(session.id());

        Ok(session)
    }

    async fn end_session(&self, session: Session) -> DocumentStoreResult<()> {
        if self.sessions.write().await.remove(&session.id()) {
            Ok(())
        } else {
            Err(DocumentStoreError::Backend(format!("{} is not active", session)))
        }
    }
}

/// Builder for constructing [`InMemoryStore`] instances.
///
/// # Example
///
/// ```ignore
/// use docmap_memory::InMemoryStore;
/// use docmap::backend::StoreBackendBuilder;
///
/// #[tokio::main]
/// async fn main() {
///     let store = InMemoryStore::builder().build().await.unwrap();
/// }
/// ```
#[derive(Default)]
pub struct InMemoryStoreBuilder;

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    /// Builds and returns a new [`InMemoryStore`] instance.
    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        Ok(InMemoryStore::new())
    }
}
