//! A MongoDB-style document mapper core: models with embedded relations, and the
//! create/insert persistence pipeline that writes them.
//!
//! This crate is the core of the docmap project and provides:
//!
//! - **Models** ([`model`]) - Model definitions, embedded relations, hooks and validators
//! - **Document trees** ([`document`]) - Top documents owning their embedded descendants
//! - **Store backend abstraction** ([`backend`]) - The write contract backends implement
//! - **Atomic operations** ([`atomic`]) - Positional `$set`/`$push` composition for embedded writes
//! - **Callbacks** ([`callbacks`]) - The ordered before/after stage chain around inserts
//! - **Validation** ([`validation`]) - The gate consulted before any write
//! - **Insert pipeline** ([`persist`]) - Routing of inserts to the right write
//! - **Mapper** ([`mapper`]) - Main interface with lenient and strict creation
//! - **Registry** ([`registry`]) - The set of models persisted through a mapper
//! - **Configuration** ([`config`]) - YAML configuration keyed by environment
//! - **Error handling** ([`error`]) - Error types and result types
//!
//! # Example
//!
//! ```ignore
//! use docmap::{Mapper, model::{Model, Relation}, memory::InMemoryStore};
//! use bson::doc;
//!
//! let member = Model::builder("Member").embedded().build();
//! let band = Model::builder("Band")
//!     .relation(Relation::embeds_many("members", &member))
//!     .build();
//!
//! let mapper = Mapper::new(InMemoryStore::new());
//! let tree = mapper
//!     .create_with(&band, doc! { "name": "Band" }, |tree| {
//!         tree.embed(tree.root(), "members", doc! { "name": "Alice" })?;
//!         Ok(())
//!     })
//!     .await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmap_core;

pub mod atomic;
pub mod backend;
pub mod callbacks;
pub mod config;
pub mod document;
pub mod error;
pub mod mapper;
pub mod model;
pub mod persist;
pub mod registry;
pub mod validation;
