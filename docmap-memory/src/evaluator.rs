//! Selector matching and update application for in-memory documents.
//!
//! Selectors are flat maps of dotted paths to expected values; a path traverses embedded
//! documents, numeric segments index arrays, and any other segment applied to an array
//! fans out over its elements. Updates support `$set` and `$push`, including the
//! positional `$` segment, which is resolved through the selector's `<prefix>._id` key.

use bson::{Bson, Document, spec::BinarySubtype};
use std::collections::HashMap;

use docmap_core::error::{DocumentStoreError, DocumentStoreResult};

const POSITIONAL: &str = "$";

/// Type-erased, comparable representation of BSON values.
///
/// Numeric types are normalized to f64 so an `Int32` selector matches an `Int64` field.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    /// Null value
    Null,
    /// Boolean value
    Bool(bool),
    /// Numeric value (all integers and floats normalized to f64)
    Number(f64),
    /// String value
    String(&'a str),
    /// Binary value, identifiers included
    Binary(BinarySubtype, &'a [u8]),
    /// Array of comparable values
    Array(Vec<Comparable<'a>>),
    /// Map/Object of comparable values
    Map(HashMap<&'a str, Comparable<'a>>),
    /// Anything else, compared by identity of its BSON value
    Other(&'a Bson),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::Binary(binary) => Comparable::Binary(binary.subtype, &binary.bytes),
            Bson::Array(arr) => Comparable::Array(
                arr
                    .iter()
                    .map(Comparable::from)
                    .collect::<Vec<_>>()
            ),
            Bson::Document(doc) => Comparable::Map(
                doc
                    .iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect::<HashMap<_, _>>()
            ),
            other => Comparable::Other(other),
        }
    }
}

impl<'a> PartialEq for Comparable<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::Binary(a, x), Comparable::Binary(b, y)) => a == b && x == y,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            (Comparable::Other(a), Comparable::Other(b)) => a == b,
            _ => false,
        }
    }
}

pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Document,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    /// Whether every selector entry matches a value of the document.
    pub fn matches(&self, selector: &Document) -> bool {
        selector.iter().all(|(path, expected)| {
            let segments = path.split('.').collect::<Vec<_>>();
            let expected = Comparable::from(expected);

            values_at(self.document, &segments)
                .into_iter()
                .any(|value| match Comparable::from(value) {
                    Comparable::Array(items) => items.iter().any(|item| item == &expected),
                    value => value == expected,
                })
        })
    }

    /// Applies a `$set` / `$push` update, resolving positional segments with `selector`.
    pub fn apply(
        document: &mut Document,
        selector: &Document,
        update: &Document,
    ) -> DocumentStoreResult<()> {
        for (modifier, fields) in update {
            let fields = fields.as_document().ok_or_else(|| DocumentStoreError::Backend(
                format!("Modifiers operate on fields but {} was given a {:?}", modifier, fields.element_type())
            ))?;

            for (path, value) in fields {
                let segments = resolve_positional(document, selector, path)?;
                let (last, parents) = segments
                    .split_last()
                    .ok_or_else(|| DocumentStoreError::Backend("Empty update path".to_string()))?;

                let mut target = Bson::Document(std::mem::take(document));
                let outcome = slot(&mut target, parents)
                    .and_then(|parent| entry(parent, last))
                    .and_then(|field| write(field, modifier, value.clone(), path));

                if let Bson::Document(updated) = target {
                    *document = updated;
                }

                outcome?;
            }
        }

        Ok(())
    }
}

fn values_at<'b>(document: &'b Document, segments: &[&str]) -> Vec<&'b Bson> {
    let Some((head, rest)) = segments.split_first() else {
        return Vec::new();
    };

    document
        .get(*head)
        .map(|value| descend(value, rest))
        .unwrap_or_default()
}

fn descend<'b>(value: &'b Bson, segments: &[&str]) -> Vec<&'b Bson> {
    let Some((head, rest)) = segments.split_first() else {
        return vec![value];
    };

    match value {
        Bson::Document(doc) => doc
            .get(*head)
            .map(|value| descend(value, rest))
            .unwrap_or_default(),
        Bson::Array(items) => match head.parse::<usize>() {
            Ok(index) => items
                .get(index)
                .map(|value| descend(value, rest))
                .unwrap_or_default(),
            Err(_) => items
                .iter()
                .flat_map(|item| descend(item, segments))
                .collect(),
        },
        _ => Vec::new(),
    }
}

/// Replaces each `$` segment with the index of the array element the selector pins.
fn resolve_positional(
    document: &Document,
    selector: &Document,
    path: &str,
) -> DocumentStoreResult<Vec<String>> {
    let mut raw = Vec::new();
    let mut resolved: Vec<String> = Vec::new();

    for segment in path.split('.') {
        if segment == POSITIONAL {
            let prefix = raw.join(".");
            let not_found = || DocumentStoreError::Backend(format!(
                "The positional operator did not find the match needed from the query for {}",
                path
            ));

            let expected = selector
                .get(format!("{}._id", prefix))
                .ok_or_else(not_found)?;
            let concrete = resolved.iter().map(String::as_str).collect::<Vec<_>>();
            let index = lookup(document, &concrete)
                .and_then(Bson::as_array)
                .and_then(|items| {
                    items.iter().position(|item| {
                        item.as_document().and_then(|doc| doc.get("_id")) == Some(expected)
                    })
                })
                .ok_or_else(not_found)?;

            resolved.push(index.to_string());
        } else {
            resolved.push(segment.to_string());
        }

        raw.push(segment);
    }

    Ok(resolved)
}

fn lookup<'b>(document: &'b Document, segments: &[&str]) -> Option<&'b Bson> {
    let (head, rest) = segments.split_first()?;
    let mut current = document.get(*head)?;

    for segment in rest {
        current = match current {
            Bson::Document(doc) => doc.get(*segment)?,
            Bson::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

fn slot<'b>(target: &'b mut Bson, segments: &[String]) -> DocumentStoreResult<&'b mut Bson> {
    let mut current = target;

    for segment in segments {
        current = entry(current, segment)?;
    }

    Ok(current)
}

/// The value stored under `segment`, created as null inside documents when absent.
fn entry<'b>(target: &'b mut Bson, segment: &str) -> DocumentStoreResult<&'b mut Bson> {
    if matches!(target, Bson::Null) {
        *target = Bson::Document(Document::new());
    }

    match target {
        Bson::Document(doc) => {
            if !doc.contains_key(segment) {
                doc.insert(segment, Bson::Null);
            }

            doc.get_mut(segment).ok_or_else(|| DocumentStoreError::Backend(
                format!("Cannot create field {}", segment)
            ))
        }
        Bson::Array(items) => {
            let index = segment.parse::<usize>().map_err(|_| DocumentStoreError::Backend(
                format!("Cannot create field {} in an array", segment)
            ))?;

            items.get_mut(index).ok_or_else(|| DocumentStoreError::Backend(
                format!("Array index {} is out of bounds", index)
            ))
        }
        other => Err(DocumentStoreError::Backend(format!(
            "Cannot create field {} in element of type {:?}",
            segment,
            other.element_type()
        ))),
    }
}

fn write(field: &mut Bson, modifier: &str, value: Bson, path: &str) -> DocumentStoreResult<()> {
    match modifier {
        "$set" => {
            *field = value;
            Ok(())
        }
        "$push" => match field {
            Bson::Null => {
                *field = Bson::Array(vec![value]);
                Ok(())
            }
            Bson::Array(items) => {
                items.push(value);
                Ok(())
            }
            other => Err(DocumentStoreError::Backend(format!(
                "The field {} must be an array but is of type {:?}",
                path,
                other.element_type()
            ))),
        },
        other => Err(DocumentStoreError::Unsupported(format!("Update modifier {}", other))),
    }
}
