//! Error types and result types for document mapper operations.
//!
//! This module provides the error taxonomy for the persistence engine.
//! Use [`DocumentStoreResult<T>`] as the return type for fallible operations.
//!
//! Validation failures and callback halts are *expected* outcomes of an insert:
//! the lenient API reports them on the document itself, and only the strict
//! API converts them into [`DocumentStoreError::Validation`] and
//! [`DocumentStoreError::CallbackHalted`].

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use serde_yaml::Error as SerdeYamlError;
use std::io::Error as IoError;
use thiserror::Error;

use crate::{callbacks::Stage, validation::Errors};

/// Represents all possible errors that can occur while persisting documents.
#[derive(Error, Debug)]
pub enum DocumentStoreError {
    /// Serialization/deserialization error when converting between document formats (BSON, JSON).
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Error during backend initialization or connection setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// The mapper configuration is missing or malformed.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// A document with the given ID already exists in the collection.
    /// The first argument is the document ID, the second is the collection name.
    #[error("Document {0} already exists in collection {1}")]
    DocumentAlreadyExists(String, String),
    /// The document tree is not shaped the way its models declare.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// An embedded document was inserted without a parent to live in.
    #[error("Cannot persist embedded document {0} without a parent document")]
    MissingParent(String),
    /// Strict creation found validation errors on the document.
    #[error("Validation of {model} failed: {errors}")]
    Validation {
        /// Name of the model that failed validation.
        model: String,
        /// The errors collected by the validation gate.
        errors: Errors,
    },
    /// Strict creation found the document unpersisted because a hook halted the chain.
    #[error("Creation of {model} was halted by a {stage} callback")]
    CallbackHalted {
        /// Name of the model whose creation was halted.
        model: String,
        /// The stage that produced the halt signal.
        stage: Stage,
    },
    /// The requested persistence path is not provided by this engine.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
    /// An error occurred in the underlying storage backend.
    #[error("Backend error: {0}")]
    Backend(String),
    /// An unknown error occurred.
    #[error("Unknown error: {0}")]
    Unknown(String),
}

/// A specialized `Result` type for document mapper operations.
pub type DocumentStoreResult<T> = Result<T, DocumentStoreError>;

impl From<BsonError> for DocumentStoreError {
    fn from(err: BsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for DocumentStoreError {
    fn from(err: SerdeJsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

impl From<SerdeYamlError> for DocumentStoreError {
    fn from(err: SerdeYamlError) -> Self {
        DocumentStoreError::Configuration(err.to_string())
    }
}

impl From<IoError> for DocumentStoreError {
    fn from(err: IoError) -> Self {
        DocumentStoreError::Configuration(err.to_string())
    }
}
