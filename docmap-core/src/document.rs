//! The in-memory document tree.
//!
//! A [`DocumentTree`] owns one top document together with every document embedded in it,
//! however deep. Documents are addressed by [`NodeId`]; the parent and root of a document
//! are looked up through the tree instead of being stored as references, so the tree is
//! owned strictly top-down.
//!
//! # Example
//!
//! ```ignore
//! use docmap::document::DocumentTree;
//! use bson::doc;
//!
//! let mut tree = DocumentTree::new(&band, doc! { "name": "Band" });
//! let alice = tree.embed(tree.root(), "members", doc! { "name": "Alice" })?;
//!
//! assert_eq!(tree.parent(alice), Some(tree.root()));
//! assert!(tree.node(alice).is_new_record());
//! ```

use bson::{Bson, Document, Uuid};
use serde_json::Value;
use std::sync::Arc;

use crate::{
    callbacks::Stage,
    error::{DocumentStoreError, DocumentStoreResult},
    model::{Model, Relation, RelationKind},
    validation::Errors,
};

/// Index of a document inside its [`DocumentTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// A single document: its attributes plus the lifecycle state the engine tracks.
#[derive(Debug, Clone)]
pub struct DocumentNode {
    id: Uuid,
    model: Arc<Model>,
    attributes: Document,
    parent: Option<NodeId>,
    relation: Option<String>,
    children: Vec<NodeId>,
    new_record: bool,
    previously_new_record: bool,
    errors: Errors,
    halted: Option<Stage>,
}

impl DocumentNode {
    fn new(model: &Arc<Model>, mut attributes: Document, parent: Option<(NodeId, &str)>) -> Self {
        // The identifier is owned by the tree, never by the attribute map.
        attributes.remove("_id");

        Self {
            id: Uuid::new(),
            model: Arc::clone(model),
            attributes,
            parent: parent.map(|(id, _)| id),
            relation: parent.map(|(_, relation)| relation.to_string()),
            children: Vec::new(),
            new_record: true,
            previously_new_record: false,
            errors: Errors::new(),
            halted: None,
        }
    }

    pub fn id(&self) -> &Uuid {
        &self.id
    }

    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    pub fn attributes(&self) -> &Document {
        &self.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut Document {
        &mut self.attributes
    }

    pub fn get(&self, key: &str) -> Option<&Bson> {
        self.attributes.get(key)
    }

    pub fn set(&mut self, key: &str, value: impl Into<Bson>) {
        self.attributes.insert(key, value.into());
    }

    /// Name of the relation this document is stored under in its parent.
    pub fn relation_name(&self) -> Option<&str> {
        self.relation.as_deref()
    }

    pub fn is_embedded(&self) -> bool {
        self.model.is_embedded()
    }

    pub fn is_new_record(&self) -> bool {
        self.new_record
    }

    pub fn is_persisted(&self) -> bool {
        !self.new_record
    }

    /// `true` when the most recent insert of this document succeeded.
    pub fn previously_new_record(&self) -> bool {
        self.previously_new_record
    }

    pub fn errors(&self) -> &Errors {
        &self.errors
    }

    pub fn errors_mut(&mut self) -> &mut Errors {
        &mut self.errors
    }

    /// The stage whose hook halted the last insert attempt, if one did.
    pub fn halted_stage(&self) -> Option<Stage> {
        self.halted
    }

    pub(crate) fn begin_attempt(&mut self) {
        self.errors.clear();
        self.halted = None;
    }

    pub(crate) fn reject(&mut self, errors: Errors) {
        self.errors = errors;
    }

    pub(crate) fn halt(&mut self, stage: Stage) {
        self.halted = Some(stage);
    }

    pub(crate) fn mark_persisted(&mut self) {
        if self.new_record {
            self.new_record = false;
            self.previously_new_record = true;
        }
    }
}

/// Owner of a top document and all of its embedded descendants.
#[derive(Debug, Clone)]
pub struct DocumentTree {
    nodes: Vec<DocumentNode>,
}

impl DocumentTree {
    /// Creates a tree whose top document is a new record of `model`.
    ///
    /// Any `_id` in `attributes` is discarded; documents receive a generated identifier.
    pub fn new(model: &Arc<Model>, attributes: Document) -> Self {
        Self {
            nodes: vec![DocumentNode::new(model, attributes, None)],
        }
    }

    /// The top document of the tree.
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// # Panics
    ///
    /// Panics if `id` was not produced by this tree.
    pub fn node(&self, id: NodeId) -> &DocumentNode {
        &self.nodes[id.0]
    }

    /// # Panics
    ///
    /// Panics if `id` was not produced by this tree.
    pub fn node_mut(&mut self, id: NodeId) -> &mut DocumentNode {
        &mut self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Embeds a new document of the relation's model under `parent`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidDocument`] if the parent's model has no relation
    /// named `relation`, if the relation targets a model that is not embedded, or if an
    /// `embeds_one` relation is already occupied.
    pub fn embed(
        &mut self,
        parent: NodeId,
        relation: &str,
        attributes: Document,
    ) -> DocumentStoreResult<NodeId> {
        let parent_model = Arc::clone(self.node(parent).model());
        let definition = parent_model
            .relation(relation)
            .ok_or_else(|| DocumentStoreError::InvalidDocument(
                format!("{} has no embedded relation named {}", parent_model.name(), relation)
            ))?;

        if !definition.model().is_embedded() {
            return Err(DocumentStoreError::InvalidDocument(
                format!("{} is not an embedded model", definition.model().name())
            ));
        }

        if definition.kind() == RelationKind::EmbedsOne && self.children_in(parent, relation).next().is_some() {
            return Err(DocumentStoreError::InvalidDocument(
                format!("{}.{} already holds a document", parent_model.name(), relation)
            ));
        }

        let id = NodeId(self.nodes.len());
        self.nodes.push(DocumentNode::new(definition.model(), attributes, Some((parent, relation))));
        self.nodes[parent.0].children.push(id);

        Ok(id)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    /// Walks up the parent chain to the top-most document containing `id`.
    pub fn root_of(&self, id: NodeId) -> NodeId {
        let mut current = id;

        while let Some(parent) = self.parent(current) {
            current = parent;
        }

        current
    }

    /// Direct children of `id`, in embedding order.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    /// Direct children of `id` stored under `relation`, in embedding order.
    pub fn children_in<'a>(&'a self, id: NodeId, relation: &'a str) -> impl Iterator<Item = NodeId> + 'a {
        self.children(id)
            .iter()
            .copied()
            .filter(move |child| self.node(*child).relation_name() == Some(relation))
    }

    /// Every document below `id`, depth first in embedding order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut descendants = Vec::new();

        for child in self.children(id) {
            descendants.push(*child);
            descendants.extend(self.descendants(*child));
        }

        descendants
    }

    /// The relation definition `id` is embedded through, resolved on its parent's model.
    pub fn relation_of(&self, id: NodeId) -> Option<&Relation> {
        let parent = self.parent(id)?;
        let name = self.node(id).relation_name()?;

        self.node(parent).model().relation(name)
    }

    /// Position of `id` among its siblings stored under the same relation.
    pub fn index_in_relation(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        let relation = self.node(id).relation_name()?;

        self.children_in(parent, relation).position(|child| child == id)
    }

    /// Serializes `id` and everything embedded in it to the store's native representation.
    ///
    /// `_id` comes first, then the attributes in insertion order, then one entry per
    /// non-empty relation: an array for `embeds_many`, a sub-document for `embeds_one`.
    /// Lifecycle state is never serialized.
    pub fn as_attributes(&self, id: NodeId) -> Document {
        let node = self.node(id);
        let mut document = Document::new();

        document.insert("_id", node.id);

        for (key, value) in node.attributes.iter() {
            document.insert(key.clone(), value.clone());
        }

        for relation in node.model.relations() {
            let mut embedded = self
                .children_in(id, relation.name())
                .map(|child| self.as_attributes(child));

            match relation.kind() {
                RelationKind::EmbedsMany => {
                    let items = embedded
                        .map(Bson::Document)
                        .collect::<Vec<_>>();

                    if !items.is_empty() {
                        document.insert(relation.name(), items);
                    }
                }
                RelationKind::EmbedsOne => {
                    if let Some(child) = embedded.next() {
                        document.insert(relation.name(), child);
                    }
                }
            }
        }

        document
    }

    /// Serializes `id` like [`DocumentTree::as_attributes`], rendered as JSON.
    pub fn as_json(&self, id: NodeId) -> DocumentStoreResult<Value> {
        Ok(serde_json::to_value(self.as_attributes(id))?)
    }

    /// Marks `id` and every document below it as persisted.
    pub(crate) fn flag_persisted(&mut self, id: NodeId) {
        self.node_mut(id).mark_persisted();

        for descendant in self.descendants(id) {
            self.node_mut(descendant).mark_persisted();
        }
    }
}
