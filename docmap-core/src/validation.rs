//! The validation gate consulted before any insert writes.
//!
//! Validation rules themselves are supplied by callers as [`Validator`]s registered on a
//! [`Model`](crate::model::Model). The gate only runs them and turns the outcome into a
//! [`Verdict`]. A failing verdict is an ordinary outcome: the pipeline copies the errors
//! onto the document and returns without raising.

use std::fmt::{self, Display};

use crate::document::{DocumentNode, DocumentTree, NodeId};

/// A single failure recorded against a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// The attribute or relation the failure is about.
    pub field: String,
    /// Human readable message, phrased to follow the field name.
    pub message: String,
}

/// Ordered collection of failures accumulated by the last operation attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Errors {
    entries: Vec<FieldError>,
}

impl Errors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a failure for `field`.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.entries.push(FieldError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.entries.iter()
    }

    /// Returns the messages recorded for `field`, in insertion order.
    pub fn on(&self, field: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|entry| entry.field == field)
            .map(|entry| entry.message.as_str())
            .collect()
    }

    /// Returns every failure rendered as `"<field> <message>"`.
    pub fn full_messages(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|entry| format!("{} {}", entry.field, entry.message))
            .collect()
    }
}

impl Display for Errors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full_messages().join(", "))
    }
}

/// The context a validation runs in, letting rules apply only on some operations.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ValidationContext {
    #[default]
    Create,
    Update,
    Custom(String),
}

/// A validation rule attached to a model.
///
/// Closures with the matching signature implement this trait:
///
/// ```ignore
/// let model = Model::builder("Band")
///     .validate(|doc, _context, errors| {
///         if doc.get("name").is_none() {
///             errors.add("name", "can't be blank");
///         }
///     })
///     .build();
/// ```
pub trait Validator: Send + Sync {
    fn validate(&self, document: &DocumentNode, context: &ValidationContext, errors: &mut Errors);
}

impl<F> Validator for F
where
    F: Fn(&DocumentNode, &ValidationContext, &mut Errors) + Send + Sync,
{
    fn validate(&self, document: &DocumentNode, context: &ValidationContext, errors: &mut Errors) {
        self(document, context, errors)
    }
}

/// Outcome of running the gate on a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub passed: bool,
    pub errors: Errors,
}

/// Runs the document's validators, then validates new embedded children through every
/// relation that has validation enabled.
///
/// A failing child is reported on the parent as `"<relation>": "is invalid"`, once per
/// relation.
pub fn validate(tree: &DocumentTree, node: NodeId, context: &ValidationContext) -> Verdict {
    let document = tree.node(node);
    let mut errors = Errors::new();

    for validator in document.model().validators() {
        validator.validate(document, context, &mut errors);
    }

    for relation in document.model().relations() {
        if !relation.validates() {
            continue;
        }

        let invalid = tree
            .children_in(node, relation.name())
            .filter(|child| tree.node(*child).is_new_record())
            .any(|child| !validate(tree, child, context).passed);

        if invalid {
            errors.add(relation.name(), "is invalid");
        }
    }

    Verdict {
        passed: errors.is_empty(),
        errors,
    }
}
