//! Main mapper interface for creating and inserting documents.
//!
//! [`Mapper`] binds a [`StoreBackend`] to a [`ModelRegistry`] and a [`MapperConfig`], and
//! exposes the document creation API in two flavours:
//!
//! - lenient (`create`, `create_with`, `create_many`): validation failures and halting
//!   hooks are reported on the returned documents
//! - strict (`create_strict`, `create_strict_with`, `create_many_strict`): the same
//!   outcomes are returned as [`DocumentStoreError::Validation`] and
//!   [`DocumentStoreError::CallbackHalted`]
//!
//! # Example
//!
//! ```ignore
//! use docmap::{Mapper, memory::InMemoryStore};
//! use bson::doc;
//!
//! let mapper = Mapper::new(InMemoryStore::new());
//! let band = mapper.create(&band_model, doc! { "name": "Band" }).await?;
//!
//! assert!(band.node(band.root()).is_persisted());
//! ```

use bson::Document;
use log::info;
use std::sync::Arc;

use crate::{
    backend::{Session, StoreBackend},
    callbacks::Stage,
    config::MapperConfig,
    document::{DocumentTree, NodeId},
    error::{DocumentStoreError, DocumentStoreResult},
    model::Model,
    persist::{self, InsertOptions},
    registry::ModelRegistry,
};

/// A document mapper bound to a specific backend implementation.
///
/// # Type Parameters
///
/// * `B` - The backend implementation type
#[derive(Debug)]
pub struct Mapper<B: StoreBackend> {
    backend: B,
    registry: ModelRegistry,
    config: MapperConfig,
}

impl<B: StoreBackend> Mapper<B> {
    /// Creates a new mapper with the given backend and an empty configuration.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            registry: ModelRegistry::new(),
            config: MapperConfig::default(),
        }
    }

    /// Creates a new mapper and applies the configured log level.
    pub fn with_config(backend: B, config: MapperConfig) -> Self {
        config.apply_log_level();

        Self {
            backend,
            registry: ModelRegistry::new(),
            config,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn config(&self) -> &MapperConfig {
        &self.config
    }

    /// Records `model` in the registry. Returns `true` if it was not known yet.
    pub async fn register(&self, model: &Arc<Model>) -> bool {
        self.registry.register(model).await
    }

    /// Inserts a single document of `tree` as a new record.
    ///
    /// See [`persist::insert`] for the outcome semantics.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is an orphaned embedded document or the backend
    /// write fails.
    pub async fn insert(
        &self,
        tree: &mut DocumentTree,
        node: NodeId,
        options: InsertOptions,
    ) -> DocumentStoreResult<()> {
        persist::insert(&self.backend, tree, node, options).await
    }

    /// Persists a document, inserting it if it is a new record.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Unsupported`] if the document is already persisted.
    pub async fn save(
        &self,
        tree: &mut DocumentTree,
        node: NodeId,
        options: InsertOptions,
    ) -> DocumentStoreResult<()> {
        persist::save(&self.backend, tree, node, options).await
    }

    /// Builds a document of `model` from `attributes` and inserts it.
    ///
    /// The returned tree reports the outcome: persisted on success, errors populated on a
    /// validation failure, still new with a halted stage if a hook halted.
    ///
    /// # Errors
    ///
    /// Returns an error if `model` is embedded or the backend write fails.
    pub async fn create(
        &self,
        model: &Arc<Model>,
        attributes: Document,
    ) -> DocumentStoreResult<DocumentTree> {
        self.create_with(model, attributes, |_| Ok(())).await
    }

    /// Like [`Mapper::create`], running `init` on the new tree before it is inserted.
    ///
    /// `init` typically embeds children that are written together with the document.
    pub async fn create_with<F>(
        &self,
        model: &Arc<Model>,
        attributes: Document,
        init: F,
    ) -> DocumentStoreResult<DocumentTree>
    where
        F: FnOnce(&mut DocumentTree) -> DocumentStoreResult<()> + Send,
    {
        self.register(model).await;

        let mut tree = DocumentTree::new(model, attributes);
        init(&mut tree)?;

        let root = tree.root();
        persist::insert_creating(&self.backend, &mut tree, root, InsertOptions::default()).await?;

        Ok(tree)
    }

    /// Creates one document per attribute set, in order.
    ///
    /// Failed documents are returned alongside persisted ones; only storage errors stop
    /// the batch.
    pub async fn create_many(
        &self,
        model: &Arc<Model>,
        attributes: Vec<Document>,
    ) -> DocumentStoreResult<Vec<DocumentTree>> {
        info!("Creating {} {} documents", attributes.len(), model.name());

        let mut trees = Vec::with_capacity(attributes.len());

        for attributes in attributes {
            trees.push(self.create(model, attributes).await?);
        }

        Ok(trees)
    }

    /// Like [`Mapper::create`], failing unless the document ended up persisted.
    ///
    /// # Errors
    ///
    /// - [`DocumentStoreError::Validation`] if the document has errors after the attempt
    /// - [`DocumentStoreError::CallbackHalted`] if it is still a new record otherwise
    pub async fn create_strict(
        &self,
        model: &Arc<Model>,
        attributes: Document,
    ) -> DocumentStoreResult<DocumentTree> {
        self.create_strict_with(model, attributes, |_| Ok(())).await
    }

    pub async fn create_strict_with<F>(
        &self,
        model: &Arc<Model>,
        attributes: Document,
        init: F,
    ) -> DocumentStoreResult<DocumentTree>
    where
        F: FnOnce(&mut DocumentTree) -> DocumentStoreResult<()> + Send,
    {
        let tree = self.create_with(model, attributes, init).await?;
        ensure_persisted(&tree)?;

        Ok(tree)
    }

    /// Strictly creates one document per attribute set, stopping at the first failure.
    ///
    /// Documents created before the failure stay persisted.
    pub async fn create_many_strict(
        &self,
        model: &Arc<Model>,
        attributes: Vec<Document>,
    ) -> DocumentStoreResult<Vec<DocumentTree>> {
        info!("Strictly creating {} {} documents", attributes.len(), model.name());

        let mut trees = Vec::with_capacity(attributes.len());

        for attributes in attributes {
            trees.push(self.create_strict(model, attributes).await?);
        }

        Ok(trees)
    }

    /// Opens a backend session to thread through [`InsertOptions::with_session`].
    pub async fn start_session(&self) -> DocumentStoreResult<Session> {
        self.backend.start_session().await
    }

    pub async fn end_session(&self, session: Session) -> DocumentStoreResult<()> {
        self.backend.end_session(session).await
    }

    /// Shuts down the mapper and releases backend resources.
    pub async fn shutdown(self) -> DocumentStoreResult<()> {
        self.backend.shutdown().await?;

        Ok(())
    }
}

fn ensure_persisted(tree: &DocumentTree) -> DocumentStoreResult<()> {
    let document = tree.node(tree.root());
    let model = document.model().name().to_string();

    if !document.errors().is_empty() {
        return Err(DocumentStoreError::Validation {
            model,
            errors: document.errors().clone(),
        });
    }

    if document.is_new_record() {
        return Err(DocumentStoreError::CallbackHalted {
            model,
            stage: document.halted_stage().unwrap_or(Stage::Create),
        });
    }

    Ok(())
}
