//! Field name sanitization for MongoDB compatibility.
//!
//! MongoDB reserves dots and dollar signs in field names for path and operator syntax.
//! Attribute names containing them are escaped on the way in and restored on the way out.
//! Values are never touched, and neither are the modifier and path keys of an update.

use bson::{Bson, Document};

/// Escapes and restores document keys.
///
/// MongoDB does not allow field names (document keys) to contain:
/// - Dots (`.`) - used for nested field access in queries
/// - Dollar signs (`$`) - used for operators in queries
/// - Null bytes (`\0`) - field name terminators
pub(crate) struct KeySanitizer;

impl KeySanitizer {
    /// Character replacements for sanitization
    const REPLACEMENTS: [(&'static str, &'static str); 3] = [
        (".", "__dot__"),
        ("$", "__dollar__"),
        ("\0", "__null__"),
    ];

    /// Escapes every key of `document`, recursing into embedded documents and arrays.
    pub(crate) fn sanitize_document(document: &Document) -> Document {
        document
            .iter()
            .map(|(k, v)| (Self::sanitize_key(k), Self::sanitize_value(v)))
            .collect()
    }

    /// Escapes the keys inside the values of an update, keeping modifiers and paths.
    pub(crate) fn sanitize_update(update: &Document) -> Document {
        update
            .iter()
            .map(|(modifier, fields)| match fields {
                Bson::Document(fields) => (
                    modifier.clone(),
                    Bson::Document(
                        fields
                            .iter()
                            .map(|(path, value)| (path.clone(), Self::sanitize_value(value)))
                            .collect(),
                    ),
                ),
                other => (modifier.clone(), other.clone()),
            })
            .collect()
    }

    /// Reverts [`KeySanitizer::sanitize_document`] on a document read back from MongoDB.
    pub(crate) fn restore_document(document: &Document) -> Document {
        document
            .iter()
            .map(|(k, v)| (Self::restore_key(k), Self::restore_value(v)))
            .collect()
    }

    fn sanitize_value(value: &Bson) -> Bson {
        match value {
            Bson::Array(arr) => Bson::Array(
                arr
                    .iter()
                    .map(Self::sanitize_value)
                    .collect(),
            ),
            Bson::Document(doc) => Bson::Document(Self::sanitize_document(doc)),
            _ => value.clone(),
        }
    }

    fn restore_value(value: &Bson) -> Bson {
        match value {
            Bson::Array(arr) => Bson::Array(
                arr
                    .iter()
                    .map(Self::restore_value)
                    .collect(),
            ),
            Bson::Document(doc) => Bson::Document(Self::restore_document(doc)),
            _ => value.clone(),
        }
    }

    pub(crate) fn sanitize_key(input: &str) -> String {
        let mut sanitized = input.to_string();
        for (target, replacement) in Self::REPLACEMENTS.iter() {
            sanitized = sanitized.replace(*target, *replacement);
        }
        sanitized
    }

    fn restore_key(input: &str) -> String {
        let mut restored = input.to_string();
        for (target, replacement) in Self::REPLACEMENTS.iter().rev() {
            restored = restored.replace(*replacement, *target);
        }
        restored
    }
}
