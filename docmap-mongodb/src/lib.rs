//! MongoDB backend implementation for docmap.
//!
//! This crate provides a MongoDB-based implementation of the `StoreBackend` trait,
//! writing top-level documents with `insertOne` and embedded documents with positional
//! `updateOne` calls.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! docmap = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Features
//!
//! - **Persistent storage** - Data is persisted to MongoDB Atlas or self-hosted MongoDB
//! - **Sessions** - Driver sessions are tracked per handle and attached to every write
//! - **Key sanitization** - Attribute names containing `.` or `$` are escaped
//! - **Configuration** - Builders can be created from a loaded `MapperConfig`
//!
//! # Example
//!
//! ```ignore
//! use docmap::{backend::StoreBackendBuilder, config::MapperConfig, mongodb::MongoDbStoreBuilder};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = MapperConfig::load("config/docmap.yml", None)?;
//!     let store = MongoDbStoreBuilder::from_config(&config, "default")?
//!         .build()
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmap_mongodb;

pub mod store;
pub mod sanitizer;

pub use store::{MongoDbStore, MongoDbStoreBuilder};
