//! Convenient re-exports of commonly used types from docmap.
//!
//! ```ignore
//! use docmap::prelude::*;
//! ```
//!
//! This provides access to:
//! - Models, relations and document trees
//! - The mapper and insert options
//! - Store backends and builders
//! - Hooks, validation and error types

pub use docmap_core::{
    atomic::{AtomicOperation, AtomicOperator},
    backend::{Session, StoreBackend, StoreBackendBuilder},
    callbacks::{CallbackKind, HookContext, HookFlow, Stage},
    config::{ClientSettings, MapperConfig},
    document::{DocumentNode, DocumentTree, NodeId},
    error::{DocumentStoreError, DocumentStoreResult},
    mapper::Mapper,
    model::{Model, Relation, RelationKind},
    persist::InsertOptions,
    validation::{Errors, ValidationContext, Validator},
};
