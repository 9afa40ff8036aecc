//! Per-request state handed to resource, tool and prompt handlers.

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::bridge::ExecutionBridge;
use crate::db::{ConnectionHandle, DbResult, DocumentStore};
use crate::mcp::protocol::RequestId;

/// Everything a handler may touch while serving one request.
///
/// Created when the request is dispatched and dropped when its response has
/// been produced. The connection is shared with every other request; the
/// cancellation token and metadata belong to this request alone.
pub struct RequestContext {
    connection: ConnectionHandle,
    bridge: ExecutionBridge,
    cancel: CancellationToken,
    request_id: Option<RequestId>,
    meta: Option<Value>,
}

impl RequestContext {
    /// Creates a context with a fresh cancellation token.
    #[must_use]
    pub fn new(connection: ConnectionHandle, bridge: ExecutionBridge) -> Self {
        Self {
            connection,
            bridge,
            cancel: CancellationToken::new(),
            request_id: None,
            meta: None,
        }
    }

    /// Attaches the JSON-RPC id and caller `_meta`.
    #[must_use]
    pub fn with_request(mut self, id: RequestId, meta: Option<Value>) -> Self {
        self.request_id = Some(id);
        self.meta = meta;
        self
    }

    /// Replaces the cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The shared connection handle.
    #[must_use]
    pub const fn connection(&self) -> &ConnectionHandle {
        &self.connection
    }

    /// The id of the request being served, if it came over the wire.
    #[must_use]
    pub const fn request_id(&self) -> Option<&RequestId> {
        self.request_id.as_ref()
    }

    /// Caller-supplied `_meta`, if any.
    #[must_use]
    pub const fn meta(&self) -> Option<&Value> {
        self.meta.as_ref()
    }

    /// This request's cancellation token.
    #[must_use]
    pub const fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Runs a blocking datastore operation through the execution bridge.
    ///
    /// # Errors
    ///
    /// Returns [`crate::db::DbError::Closed`] if the connection was released,
    /// otherwise whatever the bridge or the operation returns.
    pub async fn run_blocking<F, T>(&self, operation: F) -> DbResult<T>
    where
        F: FnOnce(&dyn DocumentStore) -> DbResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.connection.store()?;
        self.bridge
            .run(&self.cancel, move || operation(store.as_ref()))
            .await
    }
}
