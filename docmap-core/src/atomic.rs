//! Composition of the positional atomic operation that writes an embedded document into
//! its root's stored record.
//!
//! Paths are built from the chain of relations between the root and the document:
//!
//! | document | `atomic_path` | `atomic_position` |
//! |---|---|---|
//! | root | `""` | `""` |
//! | `embeds_one` child | `parent_position.name` | same as path |
//! | new `embeds_many` child | `parent_position.name` | same as path (it is appended) |
//! | persisted `embeds_many` child | `parent_position.name` | `path.index` |
//!
//! The selector locating the parent record pins every embedded level by `_id`, and
//! [`positionally`] rewrites array indexes covered by the selector into the positional
//! `$` operator so the update lands on whatever index the element currently has.

use bson::{Bson, Document, doc};
use std::fmt::{self, Display};

use crate::{
    document::{DocumentTree, NodeId},
    error::{DocumentStoreError, DocumentStoreResult},
    model::RelationKind,
};

/// The update modifier an atomic operation applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtomicOperator {
    /// Replace or insert the value at the position.
    Set,
    /// Append the value to the array at the position.
    Push,
}

impl AtomicOperator {
    /// The store's update modifier key.
    pub fn modifier(&self) -> &'static str {
        match self {
            AtomicOperator::Set => "$set",
            AtomicOperator::Push => "$push",
        }
    }
}

impl Display for AtomicOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AtomicOperator::Set => write!(f, "set"),
            AtomicOperator::Push => write!(f, "push"),
        }
    }
}

/// A single patch against a root document's stored representation.
#[derive(Debug, Clone, PartialEq)]
pub struct AtomicOperation {
    pub operator: AtomicOperator,
    pub position: String,
    pub payload: Document,
}

impl AtomicOperation {
    /// Renders the operation as an update document, e.g. `{"$push": {"members": {..}}}`.
    pub fn to_update(&self) -> Document {
        doc! {
            self.operator.modifier(): {
                self.position.clone(): self.payload.clone(),
            }
        }
    }
}

/// Composes the operation that writes `id` into its root's record.
///
/// # Errors
///
/// Returns [`DocumentStoreError::MissingParent`] if `id` is not embedded in a parent.
pub fn compose(tree: &DocumentTree, id: NodeId) -> DocumentStoreResult<AtomicOperation> {
    let relation = tree
        .relation_of(id)
        .ok_or_else(|| DocumentStoreError::MissingParent(tree.node(id).model().name().to_string()))?;

    let operator = match relation.kind() {
        RelationKind::EmbedsMany if tree.node(id).is_new_record() => AtomicOperator::Push,
        _ => AtomicOperator::Set,
    };

    Ok(AtomicOperation {
        operator,
        position: atomic_position(tree, id),
        payload: tree.as_attributes(id),
    })
}

/// Dotted path of the field holding `id` inside the root record.
pub fn atomic_path(tree: &DocumentTree, id: NodeId) -> String {
    match (tree.parent(id), tree.node(id).relation_name()) {
        (Some(parent), Some(relation)) => join(&atomic_position(tree, parent), relation),
        _ => String::new(),
    }
}

/// Dotted path locating `id` itself inside the root record.
pub fn atomic_position(tree: &DocumentTree, id: NodeId) -> String {
    let path = atomic_path(tree, id);

    match tree.relation_of(id).map(|relation| relation.kind()) {
        Some(RelationKind::EmbedsMany) if tree.node(id).is_persisted() => {
            match tree.index_in_relation(id) {
                Some(index) => format!("{}.{}", path, index),
                None => path,
            }
        }
        _ => path,
    }
}

/// Selector matching the root record that contains `id`, pinning every embedded level.
pub fn atomic_selector(tree: &DocumentTree, id: NodeId) -> Document {
    match tree.parent(id) {
        None => doc! { "_id": *tree.node(id).id() },
        Some(parent) => {
            let mut selector = atomic_selector(tree, parent);
            selector.insert(format!("{}._id", atomic_path(tree, id)), *tree.node(id).id());
            selector
        }
    }
}

/// Rewrites the update paths so array indexes pinned by `selector` use the positional `$`.
///
/// Selector keys are tried longest first; each update path is rewritten at most once. A
/// selector pinning only the root `_id` leaves the update untouched.
pub fn positionally(selector: &Document, update: Document) -> Document {
    if selector.len() <= 1 {
        return update;
    }

    let mut prefixes = selector
        .keys()
        .filter(|key| key.as_str() != "_id")
        .map(|key| key.strip_suffix("._id").unwrap_or(key).to_string())
        .collect::<Vec<_>>();
    prefixes.sort_by(|a, b| b.len().cmp(&a.len()));

    update
        .into_iter()
        .map(|(modifier, fields)| match fields {
            Bson::Document(fields) => (
                modifier,
                Bson::Document(
                    fields
                        .into_iter()
                        .map(|(path, value)| (replace_index(&prefixes, &path), value))
                        .collect(),
                ),
            ),
            other => (modifier, other),
        })
        .collect()
}

fn replace_index(prefixes: &[String], position: &str) -> String {
    for prefix in prefixes {
        let Some(rest) = position
            .strip_prefix(prefix.as_str())
            .and_then(|rest| rest.strip_prefix('.'))
        else {
            continue;
        };

        if let Some((index, tail)) = rest.split_once('.') {
            if !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()) {
                return format!("{}.$.{}", prefix, tail);
            }
        }
    }

    position.to_string()
}

fn join(prefix: &str, segment: &str) -> String {
    if prefix.is_empty() {
        segment.to_string()
    } else {
        format!("{}.{}", prefix, segment)
    }
}
