//! Error types for datastore operations.

use thiserror::Error;

/// Result type for datastore operations.
pub type DbResult<T> = Result<T, DbError>;

/// Errors that can occur while talking to the document store.
#[derive(Debug, Error)]
pub enum DbError {
    /// The initial connection or liveness check failed.
    #[error("Failed to connect to MongoDB at {uri}: {message}")]
    Connection {
        /// Redacted connection string.
        uri: String,
        /// Description of what went wrong.
        message: String,
    },

    /// A read or write against the store failed.
    #[error("{message}")]
    Operation {
        /// Description of what went wrong.
        message: String,
    },

    /// The connection handle was already released.
    #[error("Connection is closed")]
    Closed,

    /// The caller cancelled the request before the operation finished.
    #[error("Operation cancelled")]
    Cancelled,

    /// The operation did not finish within the configured request timeout.
    #[error("Operation timed out after {millis} ms")]
    Timeout {
        /// The timeout that elapsed.
        millis: u64,
    },

    /// The worker running the operation panicked or was aborted.
    #[error("Worker failed: {message}")]
    Worker {
        /// Panic payload or join error description.
        message: String,
    },
}

impl DbError {
    /// Creates an operation error.
    pub fn operation(message: impl Into<String>) -> Self {
        Self::Operation {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    pub fn connection(uri: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connection {
            uri: uri.into(),
            message: message.into(),
        }
    }
}

impl From<mongodb::error::Error> for DbError {
    fn from(e: mongodb::error::Error) -> Self {
        Self::operation(e.to_string())
    }
}

impl From<mongodb::bson::ser::Error> for DbError {
    fn from(e: mongodb::bson::ser::Error) -> Self {
        Self::operation(e.to_string())
    }
}
