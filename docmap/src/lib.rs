//! Main docmap crate providing a document mapper over MongoDB-style stores.
//!
//! This crate is the primary entry point for users of the docmap framework.
//! It re-exports the core types and functionality from the sub-crates and provides
//! convenient access to the different storage backends.
//!
//! # Features
//!
//! - **Embedded documents** - Models declare `embeds_one` / `embeds_many` relations,
//!   persisted inside their root's record
//! - **Lifecycle hooks** - `before`/`after` hooks on save, create and parent persistence,
//!   optionally cascading to embedded children
//! - **Validation** - Per-model rules gate every insert
//! - **Multiple backends** - In-memory and MongoDB storage behind one trait
//!
//! # Quick Start
//!
//! ```ignore
//! use docmap::{prelude::*, memory::InMemoryStore};
//! use bson::doc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let member = Model::builder("Member").embedded().build();
//!     let band = Model::builder("Band")
//!         .relation(Relation::embeds_many("members", &member).cascade_callbacks())
//!         .validate(|doc, _context, errors| {
//!             if doc.get("name").is_none() {
//!                 errors.add("name", "can't be blank");
//!             }
//!         })
//!         .build();
//!
//!     let mapper = Mapper::new(InMemoryStore::builder().build().await.unwrap());
//!
//!     // Create a band together with its first member
//!     let mut tree = mapper
//!         .create_with(&band, doc! { "name": "Band" }, |tree| {
//!             tree.embed(tree.root(), "members", doc! { "name": "Alice" })?;
//!             Ok(())
//!         })
//!         .await
//!         .unwrap();
//!
//!     // Add a member to the persisted band with a positional $push
//!     let bob = tree.embed(tree.root(), "members", doc! { "name": "Bob" }).unwrap();
//!     mapper.insert(&mut tree, bob, InsertOptions::default()).await.unwrap();
//!
//!     // Strict creation turns validation failures into errors
//!     let result = mapper.create_strict(&band, doc! {}).await;
//!     assert!(matches!(result, Err(DocumentStoreError::Validation { .. })));
//!
//!     mapper.shutdown().await.unwrap();
//! }
//! ```
//!
//! # Backends
//!
//! - [`memory`] - Fast in-memory storage for development and testing
//! - [`mongodb`] - Persistent MongoDB backend (requires `mongodb` feature)

pub mod prelude;

pub use docmap_core::{
    atomic, backend, callbacks, config, document, error, mapper, model, persist, registry, validation,
};
pub use docmap_core::mapper::Mapper;

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend implementations.
pub mod memory {
    pub use docmap_memory::{InMemoryStore, InMemoryStoreBuilder};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docmap_mongodb::{MongoDbStore, MongoDbStoreBuilder};
}
