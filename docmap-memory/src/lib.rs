//! In-memory document storage backend for docmap.
//!
//! This crate provides a thread-safe, in-memory implementation of the `StoreBackend` trait.
//! It uses async-aware read-write locks for concurrent access and is ideal for development
//! and testing.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using async-aware RwLock
//! - **Positional updates** - `$set` and `$push` on dotted paths, including the `$` operator
//! - **Session tracking** - Writes through unknown sessions are rejected
//!
//! # Quick Start
//!
//! ```ignore
//! use docmap::{Mapper, model::Model, memory::InMemoryStore};
//! use bson::doc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = InMemoryStore::builder().build().await?;
//!     let mapper = Mapper::new(backend);
//!     let band = Model::builder("Band").build();
//!
//!     let tree = mapper.create(&band, doc! { "name": "Band" }).await?;
//!     assert!(tree.node(tree.root()).is_persisted());
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmap_memory;

pub mod store;
pub mod evaluator;

pub use store::{InMemoryStore, InMemoryStoreBuilder};
