//! MongoDB-backed [`DocumentStore`] using the driver's synchronous API.
//!
//! The synchronous driver drives its own internal runtime, so none of these
//! methods may run on a Tokio worker thread. Callers reach them through the
//! execution bridge, which moves them onto the blocking pool.

use std::sync::RwLock;

use mongodb::bson::{doc, Bson, Document};
use mongodb::sync::{Client, Database};

use super::{DbError, DbResult, DocumentStore};

/// A live client plus the database it was opened for.
pub struct MongoStore {
    /// `None` once the store has been shut down or closed.
    state: RwLock<Option<(Client, Database)>>,
}

impl MongoStore {
    /// Creates a client for `uri` and selects `database`.
    ///
    /// The driver connects lazily; use [`DocumentStore::ping`] to verify the
    /// server is reachable.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection string cannot be parsed.
    pub fn connect(uri: &str, database: &str) -> DbResult<Self> {
        let client = Client::with_uri_str(uri).map_err(|e| {
            DbError::connection(crate::config::redact_uri(uri), e.to_string())
        })?;
        let db = client.database(database);
        Ok(Self {
            state: RwLock::new(Some((client, db))),
        })
    }

    fn take(&self) -> Option<(Client, Database)> {
        match self.state.write() {
            Ok(mut state) => state.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }

    fn database(&self) -> DbResult<Database> {
        let state = self
            .state
            .read()
            .map_err(|e| DbError::operation(format!("Failed to acquire client lock: {e}")))?;
        state.as_ref().map(|(_, db)| db.clone()).ok_or(DbError::Closed)
    }
}

impl DocumentStore for MongoStore {
    fn ping(&self) -> DbResult<()> {
        self.database()?.run_command(doc! { "ping": 1 }).run()?;
        Ok(())
    }

    fn find_one(&self, collection: &str, filter: Document) -> DbResult<Option<Document>> {
        let found = self
            .database()?
            .collection::<Document>(collection)
            .find_one(filter)
            .run()?;
        Ok(found)
    }

    fn find(&self, collection: &str, limit: usize) -> DbResult<Vec<Document>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let cursor = self
            .database()?
            .collection::<Document>(collection)
            .find(doc! {})
            .limit(limit)
            .run()?;
        cursor
            .collect::<Result<Vec<_>, _>>()
            .map_err(DbError::from)
    }

    fn insert_one(&self, collection: &str, document: Document) -> DbResult<Bson> {
        let result = self
            .database()?
            .collection::<Document>(collection)
            .insert_one(document)
            .run()?;
        Ok(result.inserted_id)
    }

    fn delete_one(&self, collection: &str, filter: Document) -> DbResult<u64> {
        let result = self
            .database()?
            .collection::<Document>(collection)
            .delete_one(filter)
            .run()?;
        Ok(result.deleted_count)
    }

    fn list_collection_names(&self) -> DbResult<Vec<String>> {
        Ok(self.database()?.list_collection_names().run()?)
    }

    fn shutdown(&self) {
        let Some((client, database)) = self.take() else {
            return;
        };
        drop(database);
        // Waits for the driver's monitors and pools to stop. In-flight
        // operations are abandoned rather than awaited.
        client.shutdown().immediate(true).run();
    }

    fn close(&self) {
        // `Client::shutdown` blocks on the driver runtime, which panics on a
        // Tokio worker; plain drop lets the pools wind down in the background.
        drop(self.take());
    }
}
