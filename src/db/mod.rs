//! Document store access.
//!
//! Every datastore call in this crate is blocking. Request handlers never
//! call a [`DocumentStore`] directly; they go through
//! [`crate::bridge::ExecutionBridge`] so the request loop keeps running
//! while a query is in flight.
//!
//! # Modules
//!
//! - [`connection`] — lifecycle of the process-wide [`ConnectionHandle`]
//! - [`mongo`] — the MongoDB implementation
//! - [`memory`] — an in-process implementation for tests and embedding

pub mod connection;
mod error;
pub mod memory;
pub mod mongo;

pub use connection::{ConnectionHandle, ConnectionManager};
pub use error::{DbError, DbResult};
pub use memory::MemoryStore;
pub use mongo::MongoStore;

use mongodb::bson::{Bson, Document};
use serde_json::Value;

/// Blocking access to a single database.
///
/// Implementations must be safe to call from several worker threads at once;
/// the server shares one store between all in-flight requests.
pub trait DocumentStore: Send + Sync {
    /// Checks that the server is reachable.
    ///
    /// # Errors
    ///
    /// Returns an error if the server does not answer.
    fn ping(&self) -> DbResult<()>;

    /// Returns the first document matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn find_one(&self, collection: &str, filter: Document) -> DbResult<Option<Document>>;

    /// Returns up to `limit` documents in natural order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn find(&self, collection: &str, limit: usize) -> DbResult<Vec<Document>>;

    /// Inserts a document and returns its `_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn insert_one(&self, collection: &str, document: Document) -> DbResult<Bson>;

    /// Deletes at most one document matching `filter` and returns the count removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn delete_one(&self, collection: &str, filter: Document) -> DbResult<u64>;

    /// Lists the collections that currently exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing fails.
    fn list_collection_names(&self) -> DbResult<Vec<String>>;

    /// Releases sockets and pools, waiting for the driver's background
    /// cleanup to finish. May block; called once by
    /// [`ConnectionManager::stop`] on the blocking pool.
    fn shutdown(&self);

    /// Releases without waiting. Used when the last [`ConnectionHandle`] is
    /// dropped without an orderly stop, possibly on a runtime thread.
    ///
    /// The default delegates to [`Self::shutdown`]; stores whose shutdown
    /// blocks must override it.
    fn close(&self) {
        self.shutdown();
    }
}

/// Converts a stored document into caller-facing JSON.
///
/// An `ObjectId` primary key is rendered as its 24-character hex string; all
/// other values use relaxed extended JSON.
#[must_use]
pub fn document_to_json(mut document: Document) -> Value {
    if let Ok(oid) = document.get_object_id("_id") {
        document.insert("_id", oid.to_hex());
    }
    Bson::Document(document).into_relaxed_extjson()
}

/// Renders an inserted id the way callers see it.
#[must_use]
pub fn id_to_string(id: &Bson) -> String {
    match id {
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::String(s) => s.clone(),
        other => other.to_string(),
    }
}
