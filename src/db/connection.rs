//! Lifecycle of the process-wide datastore connection.
//!
//! The server owns exactly one [`ConnectionHandle`]. It is created by
//! [`ConnectionManager::start`] before any request is read, cloned into every
//! request context, and released by [`ConnectionManager::stop`] after the
//! request loop has drained.
//!
//! Release happens exactly once. If the loop exits without reaching `stop`
//! (an error path or a panic), dropping the last clone releases the store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{DbError, DbResult, DocumentStore, MongoStore};
use crate::bridge::ExecutionBridge;
use crate::config::redact_uri;

struct HandleInner {
    store: Arc<dyn DocumentStore>,
    /// Redacted connection string.
    uri: String,
    database: String,
    closed: AtomicBool,
}

impl HandleInner {
    /// Releases the store unless that already happened.
    ///
    /// An orderly release waits for the driver's cleanup and must run off
    /// the runtime threads. Returns `true` if this call performed the release.
    fn release(&self, orderly: bool) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        if orderly {
            self.store.shutdown();
        } else {
            self.store.close();
        }
        true
    }
}

impl Drop for HandleInner {
    fn drop(&mut self) {
        if self.release(false) {
            warn!("Connection handle dropped without an orderly stop; connection released");
        }
    }
}

/// Shared reference to the verified datastore connection.
///
/// Cheap to clone; all clones observe the same open/closed state.
#[derive(Clone)]
pub struct ConnectionHandle {
    inner: Arc<HandleInner>,
}

impl ConnectionHandle {
    /// Wraps a store whose connectivity has already been verified.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, uri: &str, database: &str) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                store,
                uri: redact_uri(uri),
                database: database.to_string(),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Returns the store for a single operation.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Closed`] once the handle has been released.
    pub fn store(&self) -> DbResult<Arc<dyn DocumentStore>> {
        if self.is_closed() {
            return Err(DbError::Closed);
        }
        Ok(Arc::clone(&self.inner.store))
    }

    /// Returns `true` once the connection has been released.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// The connection string with any password masked.
    #[must_use]
    pub fn uri(&self) -> &str {
        &self.inner.uri
    }

    /// The database every operation targets.
    #[must_use]
    pub fn database(&self) -> &str {
        &self.inner.database
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("uri", &self.inner.uri)
            .field("database", &self.inner.database)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Establishes and releases the [`ConnectionHandle`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectionManager {
    bridge: ExecutionBridge,
}

impl ConnectionManager {
    /// Creates a manager that runs its blocking calls through `bridge`.
    #[must_use]
    pub const fn new(bridge: ExecutionBridge) -> Self {
        Self { bridge }
    }

    /// Connects to MongoDB and verifies the server answers a ping.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Connection`] if the client cannot be created or the
    /// ping fails. The server must not start in that case.
    pub async fn start(&self, uri: &str, database: &str) -> DbResult<ConnectionHandle> {
        self.start_with(uri, database, |uri, database| {
            MongoStore::connect(uri, database).map(|s| Arc::new(s) as Arc<dyn DocumentStore>)
        })
        .await
    }

    /// Like [`Self::start`], with a custom store constructor.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Connection`] if `connect` fails or the ping fails.
    pub async fn start_with<C>(
        &self,
        uri: &str,
        database: &str,
        connect: C,
    ) -> DbResult<ConnectionHandle>
    where
        C: FnOnce(&str, &str) -> DbResult<Arc<dyn DocumentStore>> + Send + 'static,
    {
        let redacted = redact_uri(uri);
        info!(uri = %redacted, database, "Attempting to connect to MongoDB");

        let cancel = CancellationToken::new();
        let (owned_uri, owned_db) = (uri.to_string(), database.to_string());
        let store = self
            .bridge
            .run(&cancel, move || connect(&owned_uri, &owned_db))
            .await
            .map_err(|e| match e {
                DbError::Connection { .. } => e,
                other => DbError::connection(redacted.clone(), other.to_string()),
            })?;

        let probe = Arc::clone(&store);
        if let Err(e) = self.bridge.run(&cancel, move || probe.ping()).await {
            error!(uri = %redacted, error = %e, "Failed to connect to MongoDB");
            // Release the half-initialised client before bailing out.
            let failed = store;
            let _ = ExecutionBridge::default()
                .run(&cancel, move || {
                    failed.shutdown();
                    Ok(())
                })
                .await;
            return Err(DbError::connection(redacted, e.to_string()));
        }

        info!(database, "Successfully connected to MongoDB");
        Ok(ConnectionHandle::new(store, uri, database))
    }

    /// Releases the connection. Requests still holding a clone see
    /// [`DbError::Closed`] afterwards.
    pub async fn stop(&self, handle: ConnectionHandle) {
        info!("Closing MongoDB connection");
        let inner = handle.inner;
        let released = ExecutionBridge::default()
            .run(&CancellationToken::new(), move || Ok(inner.release(true)))
            .await;

        match released {
            Ok(true) => info!("MongoDB connection closed"),
            Ok(false) => debug!("MongoDB connection was already closed"),
            Err(e) => warn!(error = %e, "Failed to release MongoDB connection cleanly"),
        }
    }
}
