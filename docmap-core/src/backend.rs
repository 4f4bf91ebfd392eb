//! Storage backend abstraction for the document mapper.
//!
//! This module defines the write contract the persistence engine consumes. A backend
//! receives fully serialized BSON documents and positional update documents; it knows
//! nothing about models, callbacks or document trees.
//!
//! # Traits
//!
//! - [`StoreBackend`]: The core trait for storage backends
//! - [`StoreBackendBuilder`]: Factory trait for creating backend instances
//!
//! # Sessions
//!
//! A [`Session`] is an opaque handle to a backend transaction context. When a caller
//! supplies one, the engine passes the very same handle to every write it issues for
//! that call, including writes triggered by recursive parent inserts.
//!
//! # Examples
//!
//! ```ignore
//! use docmap::backend::StoreBackend;
//! use bson::{Uuid, doc};
//!
//! let backend = MyBackendImpl::new();
//!
//! backend.insert_one("bands", doc! { "_id": Uuid::new(), "name": "Band" }, None).await?;
//! backend
//!     .update_one(
//!         "bands",
//!         doc! { "name": "Band" },
//!         doc! { "$push": { "members": { "name": "Alice" } } },
//!         None,
//!     )
//!     .await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use async_trait::async_trait;
use bson::Document;
use std::fmt::{self, Debug, Display};
use uuid::Uuid;

use crate::error::DocumentStoreResult;

/// Opaque handle to a backend session (transaction context).
///
/// Sessions are created by [`StoreBackend::start_session`] and are cheap to clone.
/// Backends resolve the handle to their own session object on every write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Session {
    id: Uuid,
}

impl Session {
    /// Creates a new session handle with a fresh identifier.
    pub fn new() -> Self {
        Self { id: Uuid::new_v4() }
    }

    /// Returns the identifier backends use to look up the session.
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session {}", self.id)
    }
}

/// Abstract interface for document storage backends.
///
/// # Thread Safety
///
/// All implementations must be thread-safe. The engine never issues two writes for the
/// same insert concurrently, but unrelated inserts may run in parallel on separate tasks.
///
/// # Error Handling
///
/// Backends report write failures as [`DocumentStoreError::Backend`](crate::error::DocumentStoreError::Backend).
/// The engine propagates them unchanged and never retries.
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Writes a whole document as a new top-level record of `collection`.
    ///
    /// The document carries its `_id`. Implementations must reject a duplicate `_id`.
    async fn insert_one(
        &self,
        collection: &str,
        document: Document,
        session: Option<&Session>,
    ) -> DocumentStoreResult<()>;

    /// Applies an atomic update (`$set` / `$push` keyed by dotted paths, possibly containing
    /// the positional `$` operator) to the first record of `collection` matching `selector`.
    ///
    /// # Returns
    ///
    /// The number of records matched (0 or 1). Matching nothing is not an error.
    async fn update_one(
        &self,
        collection: &str,
        selector: Document,
        update: Document,
        session: Option<&Session>,
    ) -> DocumentStoreResult<u64>;

    /// Reads back the first record of `collection` matching `selector`.
    async fn find_one(
        &self,
        collection: &str,
        selector: Document,
    ) -> DocumentStoreResult<Option<Document>>;

    /// Opens a new session that can be threaded through writes.
    async fn start_session(&self) -> DocumentStoreResult<Session>;

    /// Closes a session previously returned by [`StoreBackend::start_session`].
    async fn end_session(&self, session: Session) -> DocumentStoreResult<()>;

    /// Releases backend resources.
    async fn shutdown(self) -> DocumentStoreResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

#[async_trait]
impl<B> StoreBackend for &B
where
    B: StoreBackend,
{
    async fn insert_one(
        &self,
        collection: &str,
        document: Document,
        session: Option<&Session>,
    ) -> DocumentStoreResult<()> {
        (*self)
            .insert_one(collection, document, session)
            .await
    }

    async fn update_one(
        &self,
        collection: &str,
        selector: Document,
        update: Document,
        session: Option<&Session>,
    ) -> DocumentStoreResult<u64> {
        (*self)
            .update_one(collection, selector, update, session)
            .await
    }

    async fn find_one(
        &self,
        collection: &str,
        selector: Document,
    ) -> DocumentStoreResult<Option<Document>> {
        (*self)
            .find_one(collection, selector)
            .await
    }

    async fn start_session(&self) -> DocumentStoreResult<Session> {
        (*self).start_session().await
    }

    async fn end_session(&self, session: Session) -> DocumentStoreResult<()> {
        (*self).end_session(session).await
    }
}

/// Factory for backends that need asynchronous setup (connections, pools).
#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> DocumentStoreResult<Self::Backend>;
}
