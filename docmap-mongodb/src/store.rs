use async_trait::async_trait;
use bson::Document;
use log::debug;
use mea::mutex::Mutex;
use mongodb::{
    Client, ClientSession, Collection as MongoCollection,
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::ClientOptions,
};
use std::{
    collections::HashMap,
    fmt::{self, Debug},
};
use uuid::Uuid;

use docmap_core::{
    backend::{Session, StoreBackend, StoreBackendBuilder},
    config::MapperConfig,
    error::{DocumentStoreError, DocumentStoreResult},
};

use crate::sanitizer::KeySanitizer;

const DUPLICATE_KEY: i32 = 11000;

pub struct MongoDbStore {
    client: Client,
    database: String,
    sessions: Mutex<HashMap<Uuid, ClientSession>>,
}

impl MongoDbStore {
    pub fn new(client: Client, database: String) -> Self {
        Self {
            client,
            database,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn builder(dsn: &str, database: &str) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(dsn, database)
    }

    fn get_collection(&self, collection_name: &str) -> MongoCollection<Document> {
        self.client
            .database(&self.database)
            .collection(&KeySanitizer::sanitize_key(collection_name))
    }

    async fn shutdown(self) -> DocumentStoreResult<()> {
        // Outstanding sessions keep the client alive.
        self.sessions.lock().await.clear();
        self.client.shutdown().await;

        Ok(())
    }
}

impl Debug for MongoDbStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MongoDbStore")
            .field("client", &self.client)
            .field("database", &self.database)
            .finish_non_exhaustive()
    }
}

fn inactive(session: &Session) -> DocumentStoreError {
    DocumentStoreError::Backend(format!("{} is not active", session))
}

fn insert_error(error: MongoError, id: String, collection: &str) -> DocumentStoreError {
    match error.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(failure)) if failure.code == DUPLICATE_KEY => {
            DocumentStoreError::DocumentAlreadyExists(id, collection.to_string())
        }
        _ => DocumentStoreError::Backend(error.to_string()),
    }
}

#[async_trait]
impl StoreBackend for MongoDbStore {
    async fn insert_one(
        &self,
        collection: &str,
        document: Document,
        session: Option<&Session>,
    ) -> DocumentStoreResult<()> {
        let id = document
            .get("_id")
            .map(ToString::to_string)
            .ok_or_else(|| DocumentStoreError::InvalidDocument(
                "top-level documents must carry an _id".to_string()
            ))?;
        let target = self.get_collection(collection);
        let document = KeySanitizer::sanitize_document(&document);

        let result = match session {
            Some(session) => {
                let mut sessions = self.sessions.lock().await;
                let client_session = sessions
                    .get_mut(&session.id())
                    .ok_or_else(|| inactive(session))?;

                target
                    .insert_one(document)
                    .session(client_session)
                    .await
            }
            None => target.insert_one(document).await,
        };

        result.map_err(|e| insert_error(e, id, collection))?;

        Ok(())
    }

    async fn update_one(
        &self,
        collection: &str,
        selector: Document,
        update: Document,
        session: Option<&Session>,
    ) -> DocumentStoreResult<u64> {
        let target = self.get_collection(collection);
        let update = KeySanitizer::sanitize_update(&update);

        debug!("update_one on {}: {} {}", collection, selector, update);

        let result = match session {
            Some(session) => {
                let mut sessions = self.sessions.lock().await;
                let client_session = sessions
                    .get_mut(&session.id())
                    .ok_or_else(|| inactive(session))?;

                target
                    .update_one(selector, update)
                    .session(client_session)
                    .await
            }
            None => target.update_one(selector, update).await,
        };

        Ok(result
            .map_err(|e| DocumentStoreError::Backend(e.to_string()))?
            .matched_count)
    }

    async fn find_one(
        &self,
        collection: &str,
        selector: Document,
    ) -> DocumentStoreResult<Option<Document>> {
        Ok(self
            .get_collection(collection)
            .find_one(selector)
            .await
            .map_err(|e| DocumentStoreError::Backend(e.to_string()))?
            .map(|document| KeySanitizer::restore_document(&document)))
    }

    async fn start_session(&self) -> DocumentStoreResult<Session> {
        let client_session = self
            .client
            .start_session()
            .await
            .map_err(|e| DocumentStoreError::Backend(e.to_string()))?;
        let session = Session::new();

        self.sessions
            .lock()
            .await
            .insert(session.id(), client_session);

        Ok(session)
    }

    async fn end_session(&self, session: Session) -> DocumentStoreResult<()> {
        self.sessions
            .lock()
            .await
            .remove(&session.id())
            .map(drop)
            .ok_or_else(|| inactive(&session))
    }

    async fn shutdown(self) -> DocumentStoreResult<()> {
        self.shutdown().await
    }
}

pub struct MongoDbStoreBuilder {
    dsn: String,
    database: String,
    app_name: Option<String>,
}

impl MongoDbStoreBuilder {
    pub fn new(dsn: &str, database: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            database: database.to_string(),
            app_name: None,
        }
    }

    /// Creates a builder for the client named `client` in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Configuration`] if no such client is configured or
    /// no database name can be determined for it.
    pub fn from_config(config: &MapperConfig, client: &str) -> DocumentStoreResult<Self> {
        let settings = config
            .client(client)
            .ok_or_else(|| DocumentStoreError::Configuration(format!(
                "no client named {} is configured",
                client
            )))?;

        Ok(Self {
            dsn: settings.dsn(),
            database: config.database(client)?,
            app_name: config.options().app_name.clone(),
        })
    }
}

#[async_trait]
impl StoreBackendBuilder for MongoDbStoreBuilder {
    type Backend = MongoDbStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        let mut options = ClientOptions::parse(&self.dsn)
            .await
            .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?;

        if self.app_name.is_some() {
            options.app_name = self.app_name;
        }

        Ok(MongoDbStore::new(
            Client::with_options(options)
                .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?,
            self.database,
        ))
    }
}
