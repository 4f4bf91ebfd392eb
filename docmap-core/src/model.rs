//! Model definitions: what a kind of document is, where it is stored and what it embeds.
//!
//! Models are built once with [`ModelBuilder`] and shared as `Arc<Model>`. A model owns
//! its embedded relations, lifecycle hooks and validators; documents only point back to
//! their model.
//!
//! # Example
//!
//! ```ignore
//! use docmap::model::{Model, Relation};
//!
//! let member = Model::builder("Member").embedded().build();
//! let band = Model::builder("Band")
//!     .relation(Relation::embeds_many("members", &member).cascade_callbacks())
//!     .build();
//!
//! assert_eq!(band.collection_name(), "bands");
//! ```

use std::{
    fmt::{self, Debug},
    sync::Arc,
};

use crate::{
    callbacks::{AfterHook, BeforeHook, CallbackKind, Callbacks, HookContext, HookFlow},
    document::DocumentNode,
    validation::{Errors, ValidationContext, Validator},
};

/// Cardinality of an embedded relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// A single sub-document stored under the relation name.
    EmbedsOne,
    /// An array of sub-documents stored under the relation name.
    EmbedsMany,
}

/// An embedded relation from a parent model to a child model.
#[derive(Clone)]
pub struct Relation {
    name: String,
    kind: RelationKind,
    model: Arc<Model>,
    cascade_callbacks: bool,
    validate: bool,
}

impl Relation {
    pub fn embeds_many(name: &str, model: &Arc<Model>) -> Self {
        Self::new(name, RelationKind::EmbedsMany, model)
    }

    pub fn embeds_one(name: &str, model: &Arc<Model>) -> Self {
        Self::new(name, RelationKind::EmbedsOne, model)
    }

    fn new(name: &str, kind: RelationKind, model: &Arc<Model>) -> Self {
        Self {
            name: name.to_string(),
            kind,
            model: Arc::clone(model),
            cascade_callbacks: false,
            validate: true,
        }
    }

    /// Runs the child model's save/create hooks when the parent is persisted.
    pub fn cascade_callbacks(mut self) -> Self {
        self.cascade_callbacks = true;
        self
    }

    /// Stops the parent's validation gate from validating children of this relation.
    pub fn without_validation(mut self) -> Self {
        self.validate = false;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> RelationKind {
        self.kind
    }

    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    pub fn cascades_callbacks(&self) -> bool {
        self.cascade_callbacks
    }

    pub fn validates(&self) -> bool {
        self.validate
    }
}

impl Debug for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relation")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("model", &self.model.name())
            .field("cascade_callbacks", &self.cascade_callbacks)
            .field("validate", &self.validate)
            .finish()
    }
}

/// A document model definition.
pub struct Model {
    name: String,
    collection: String,
    embedded: bool,
    relations: Vec<Relation>,
    callbacks: Callbacks,
    validators: Vec<Arc<dyn Validator>>,
}

impl Model {
    /// Starts defining a model. The collection defaults to the lowercased name plus `s`.
    pub fn builder(name: &str) -> ModelBuilder {
        ModelBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The collection top-level documents of this model are written to.
    pub fn collection_name(&self) -> &str {
        &self.collection
    }

    /// Whether documents of this model can only live inside a parent document.
    pub fn is_embedded(&self) -> bool {
        self.embedded
    }

    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.relations
            .iter()
            .find(|relation| relation.name == name)
    }

    pub fn callbacks(&self) -> &Callbacks {
        &self.callbacks
    }

    pub fn validators(&self) -> &[Arc<dyn Validator>] {
        &self.validators
    }
}

impl Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.name)
            .field("collection", &self.collection)
            .field("embedded", &self.embedded)
            .field("relations", &self.relations)
            .field("validators", &self.validators.len())
            .finish()
    }
}

/// Fluent builder for [`Model`].
pub struct ModelBuilder {
    name: String,
    collection: Option<String>,
    embedded: bool,
    relations: Vec<Relation>,
    callbacks: Callbacks,
    validators: Vec<Arc<dyn Validator>>,
}

impl ModelBuilder {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            collection: None,
            embedded: false,
            relations: Vec::new(),
            callbacks: Callbacks::default(),
            validators: Vec::new(),
        }
    }

    pub fn collection(mut self, name: &str) -> Self {
        self.collection = Some(name.to_string());
        self
    }

    /// Marks the model as embedded-only.
    pub fn embedded(mut self) -> Self {
        self.embedded = true;
        self
    }

    pub fn relation(mut self, relation: Relation) -> Self {
        self.relations.push(relation);
        self
    }

    /// Registers a hook that runs before the `kind` stage and may halt the chain.
    pub fn before<F>(mut self, kind: CallbackKind, hook: F) -> Self
    where
        F: Fn(&mut DocumentNode, &HookContext<'_>) -> HookFlow + Send + Sync + 'static,
    {
        let hook: BeforeHook = Arc::new(hook);
        self.callbacks.add_before(kind, hook);
        self
    }

    /// Registers a hook that runs after the `kind` stage completed a write.
    pub fn after<F>(mut self, kind: CallbackKind, hook: F) -> Self
    where
        F: Fn(&mut DocumentNode, &HookContext<'_>) + Send + Sync + 'static,
    {
        let hook: AfterHook = Arc::new(hook);
        self.callbacks.add_after(kind, hook);
        self
    }

    /// Registers a validation rule written as a closure.
    pub fn validate<F>(self, rule: F) -> Self
    where
        F: Fn(&DocumentNode, &ValidationContext, &mut Errors) + Send + Sync + 'static,
    {
        self.validator(rule)
    }

    pub fn validator<V>(mut self, validator: V) -> Self
    where
        V: Validator + 'static,
    {
        self.validators.push(Arc::new(validator));
        self
    }

    pub fn build(self) -> Arc<Model> {
        let collection = self
            .collection
            .unwrap_or_else(|| format!("{}s", self.name.to_lowercase()));

        Arc::new(Model {
            name: self.name,
            collection,
            embedded: self.embedded,
            relations: self.relations,
            callbacks: self.callbacks,
            validators: self.validators,
        })
    }
}
