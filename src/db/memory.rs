//! In-process [`DocumentStore`].
//!
//! Collections are created on first insert, like MongoDB. Filters are
//! exact-match on every field they name. Useful for testing and for running
//! the server without a database.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use indexmap::IndexMap;
use mongodb::bson::{oid::ObjectId, Bson, Document};

use super::{DbError, DbResult, DocumentStore};

/// Documents kept in memory, grouped by collection in creation order.
#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<IndexMap<String, Vec<Document>>>,
    unavailable: AtomicBool,
    shutdowns: AtomicUsize,
    closes: AtomicUsize,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail as if the server were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of times [`DocumentStore::shutdown`] has been called.
    #[must_use]
    pub fn shutdown_count(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    /// Number of times [`DocumentStore::close`] has been called.
    #[must_use]
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> DbResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DbError::operation("server selection timeout: no servers available"));
        }
        Ok(())
    }

    fn lock(&self) -> DbResult<std::sync::MutexGuard<'_, IndexMap<String, Vec<Document>>>> {
        self.check_available()?;
        self.collections
            .lock()
            .map_err(|e| DbError::operation(format!("Failed to acquire store lock: {e}")))
    }

    fn matches(document: &Document, filter: &Document) -> bool {
        filter
            .iter()
            .all(|(key, value)| document.get(key) == Some(value))
    }
}

impl DocumentStore for MemoryStore {
    fn ping(&self) -> DbResult<()> {
        self.check_available()
    }

    fn find_one(&self, collection: &str, filter: Document) -> DbResult<Option<Document>> {
        let collections = self.lock()?;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|d| Self::matches(d, &filter)))
            .cloned())
    }

    fn find(&self, collection: &str, limit: usize) -> DbResult<Vec<Document>> {
        let collections = self.lock()?;
        Ok(collections
            .get(collection)
            .map(|docs| docs.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    fn insert_one(&self, collection: &str, document: Document) -> DbResult<Bson> {
        let mut collections = self.lock()?;

        // MongoDB places a generated `_id` first.
        let document = if document.contains_key("_id") {
            document
        } else {
            let mut with_id = Document::new();
            with_id.insert("_id", ObjectId::new());
            for (key, value) in document {
                with_id.insert(key, value);
            }
            with_id
        };

        let docs = collections.entry(collection.to_string()).or_default();
        if let Some(id) = document.get("_id") {
            if docs.iter().any(|d| d.get("_id") == Some(id)) {
                return Err(DbError::operation(format!(
                    "E11000 duplicate key error collection: {collection} index: _id_"
                )));
            }
        }

        let id = document.get("_id").cloned().unwrap_or(Bson::Null);
        docs.push(document);
        Ok(id)
    }

    fn delete_one(&self, collection: &str, filter: Document) -> DbResult<u64> {
        let mut collections = self.lock()?;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(0);
        };
        match docs.iter().position(|d| Self::matches(d, &filter)) {
            Some(index) => {
                docs.remove(index);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    fn list_collection_names(&self) -> DbResult<Vec<String>> {
        let collections = self.lock()?;
        Ok(collections.keys().cloned().collect())
    }

    fn shutdown(&self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}
