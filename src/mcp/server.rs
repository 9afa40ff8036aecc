//! MCP server for MongoDB-backed resources and tools.
//!
//! This module implements the MCP server lifecycle:
//!
//! 1. **Initialisation**: Capability negotiation and version agreement
//! 2. **Operation**: Handling resource reads, tool calls and prompt requests
//! 3. **Shutdown**: Stop reading, drain in-flight requests, flush responses
//!
//! # Concurrency
//!
//! Input lines are read one at a time. Lifecycle and listing requests are
//! answered inline. `resources/read`, `tools/call` and `prompts/get` each run
//! on their own task so a slow query does not hold up the requests behind
//! it; responses may therefore arrive out of order. All output goes through a
//! single writer task.
//!
//! Every spawned request gets a child of the server's shutdown token. A
//! client `notifications/cancelled` fires that token and suppresses the
//! response.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use serde_json::json;
use tokio::io::{AsyncBufRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::bridge::ExecutionBridge;
use crate::db::ConnectionHandle;
use crate::error::DispatchError;
use crate::mcp::context::RequestContext;
use crate::mcp::protocol::{
    parse_message, CancelledParams, ErrorCode, IncomingMessage, InitializeParams, JsonRpcError,
    JsonRpcErrorData, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, OutgoingMessage,
    PromptGetParams, RequestId, ResourceReadParams, ToolCallParams, MCP_PROTOCOL_VERSION,
    SERVER_NAME,
};
use crate::mcp::router::RESOURCE_MIME_TYPE;
use crate::mcp::tools::ToolCallResult;
use crate::mcp::transport::{self, MessageReader, MessageWriter};
use crate::mcp::Registry;

/// Server state in the MCP lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Waiting for initialize request.
    AwaitingInit,
    /// Initialize received, waiting for initialized notification.
    Initialising,
    /// Ready for normal operation.
    Running,
    /// Shutdown in progress.
    ShuttingDown,
}

/// Server capabilities advertised during initialisation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ServerCapabilities {
    /// Tool-related capabilities.
    pub tools: ListCapability,
    /// Resource-related capabilities.
    pub resources: ResourceCapabilities,
    /// Prompt-related capabilities.
    pub prompts: ListCapability,
}

/// Capabilities of a list that may change during the session.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ListCapability {
    /// Whether the list can change during the session.
    #[serde(rename = "listChanged", skip_serializing_if = "is_false")]
    pub list_changed: bool,
}

/// Resource-specific capabilities.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceCapabilities {
    /// Whether clients may subscribe to resource updates.
    #[serde(skip_serializing_if = "is_false")]
    pub subscribe: bool,
    /// Whether the resource list can change during the session.
    #[serde(skip_serializing_if = "is_false")]
    pub list_changed: bool,
}

#[allow(clippy::trivially_copy_pass_by_ref)] // serde's skip_serializing_if requires a predicate fn(&T) -> bool, so we must take &bool here
const fn is_false(b: &bool) -> bool {
    !*b
}

/// Server information for initialisation response.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version.
    pub version: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: SERVER_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Cancellation tokens of the requests currently running, by id.
type InFlight = Arc<Mutex<HashMap<RequestId, CancellationToken>>>;

fn lock(
    in_flight: &Mutex<HashMap<RequestId, CancellationToken>>,
) -> MutexGuard<'_, HashMap<RequestId, CancellationToken>> {
    in_flight.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Answers a request whose task unwinds before producing a response, and
/// frees its id for reuse.
struct UnwindReply {
    id: RequestId,
    in_flight: InFlight,
    outgoing: mpsc::UnboundedSender<OutgoingMessage>,
}

impl Drop for UnwindReply {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            return;
        }
        if lock(&self.in_flight).remove(&self.id).is_some() {
            let error = JsonRpcError::internal_error(
                self.id.clone(),
                "Internal error: request handler panicked",
            );
            if self.outgoing.send(error.into()).is_err() {
                tracing::warn!(id = %self.id, "Writer has stopped, dropping response");
            }
        }
    }
}

/// A request that runs on its own task.
#[derive(Debug)]
enum Call {
    Tool(ToolCallParams),
    Read(ResourceReadParams),
    Prompt(PromptGetParams),
}

/// The MCP server for MongoDB data access.
pub struct McpServer {
    registry: Arc<Registry>,
    connection: ConnectionHandle,
    bridge: ExecutionBridge,
    shutdown: CancellationToken,
}

impl McpServer {
    /// Creates a server answering from `registry` against `connection`.
    #[must_use]
    pub fn new(registry: Registry, connection: ConnectionHandle, bridge: ExecutionBridge) -> Self {
        Self {
            registry: Arc::new(registry),
            connection,
            bridge,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token that stops the server when cancelled.
    ///
    /// Cancelling it also cancels every in-flight request.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Runs the server on stdio until EOF or a termination signal.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails.
    pub async fn run(&self) -> io::Result<()> {
        let token = self.shutdown.clone();
        let listener = tokio::spawn(async move {
            match wait_for_signal().await {
                Ok(()) => token.cancel(),
                Err(e) => tracing::warn!(error = %e, "Failed to install signal handlers"),
            }
        });

        let (reader, writer) = transport::stdio();
        let result = self.serve(reader, writer).await;
        listener.abort();
        result
    }

    /// Serves one session over the given transport halves.
    ///
    /// Returns after the input closes or the shutdown token fires, once every
    /// in-flight request has answered and the writer has flushed.
    ///
    /// # Errors
    ///
    /// Returns the first read or write error.
    pub async fn serve<R, W>(
        &self,
        mut reader: MessageReader<R>,
        writer: MessageWriter<W>,
    ) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (outgoing, queue) = mpsc::unbounded_channel();
        let writer_task = transport::spawn_writer(writer, queue);

        let mut session = Session::new(self, outgoing);
        let read_result = session.read_loop(&mut reader).await;
        session.drain().await;
        drop(session);

        let write_result = writer_task.await.map_err(io::Error::other)?;
        read_result.and(write_result)
    }
}

/// Per-session protocol state.
struct Session<'a> {
    server: &'a McpServer,
    state: ServerState,
    /// Negotiated protocol version (set after initialisation).
    protocol_version: Option<String>,
    outgoing: mpsc::UnboundedSender<OutgoingMessage>,
    tasks: JoinSet<()>,
    in_flight: InFlight,
}

impl<'a> Session<'a> {
    fn new(server: &'a McpServer, outgoing: mpsc::UnboundedSender<OutgoingMessage>) -> Self {
        Self {
            server,
            state: ServerState::AwaitingInit,
            protocol_version: None,
            outgoing,
            tasks: JoinSet::new(),
            in_flight: InFlight::default(),
        }
    }

    async fn read_loop<R>(&mut self, reader: &mut MessageReader<R>) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let shutdown = self.server.shutdown.clone();
        let result = loop {
            let line = tokio::select! {
                biased;
                () = shutdown.cancelled() => {
                    tracing::info!("Shutdown requested, no longer reading input");
                    break Ok(());
                }
                line = reader.read_frame() => line,
            };

            match line {
                Ok(Some(Ok(line))) if line.trim().is_empty() => {}
                Ok(Some(Ok(line))) => {
                    self.handle_line(&line);
                    self.reap_finished();
                }
                Ok(Some(Err(e))) => {
                    tracing::warn!(error = %e, "Discarding line that is not valid UTF-8");
                    self.send(JsonRpcError::parse_error().into());
                }
                Ok(None) => {
                    tracing::info!("Input closed");
                    break Ok(());
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to read input");
                    break Err(e);
                }
            }
        };

        self.state = ServerState::ShuttingDown;
        result
    }

    /// Waits for every spawned request to finish.
    async fn drain(&mut self) {
        if !self.tasks.is_empty() {
            tracing::info!(pending = self.tasks.len(), "Waiting for in-flight requests");
        }
        while let Some(result) = self.tasks.join_next().await {
            log_task_result(result);
        }
    }

    fn reap_finished(&mut self) {
        while let Some(result) = self.tasks.try_join_next() {
            log_task_result(result);
        }
    }

    fn send(&self, message: OutgoingMessage) {
        if self.outgoing.send(message).is_err() {
            tracing::warn!("Writer has stopped, dropping message");
        }
    }

    /// Handles a single line of input.
    fn handle_line(&mut self, line: &str) {
        match parse_message(line) {
            Ok(IncomingMessage::Request(req)) => self.handle_request(req),
            Ok(IncomingMessage::Notification(notif)) => self.handle_notification(&notif),
            Err(error) => self.send(error.into()),
        }
    }

    /// Handles an incoming request.
    fn handle_request(&mut self, req: JsonRpcRequest) {
        tracing::debug!(id = %req.id, method = %req.method, "Request received");

        let response = match req.method.as_str() {
            "initialize" => self.handle_initialize(&req),
            "ping" => Ok(Self::handle_ping(&req)),
            "tools/list" => self.handle_tools_list(&req),
            "resources/list" => self.handle_resources_list(&req),
            "resources/templates/list" => self.handle_resource_templates_list(&req),
            "prompts/list" => self.handle_prompts_list(&req),
            "tools/call" | "resources/read" | "prompts/get" => match self.parse_call(&req) {
                Ok(call) => {
                    self.spawn_call(&req, call);
                    return;
                }
                Err(error) => Err(error),
            },
            _ => Err(JsonRpcError::method_not_found(req.id.clone(), &req.method)),
        };

        self.send(response.into());
    }

    /// Handles an incoming notification.
    fn handle_notification(&mut self, notif: &JsonRpcNotification) {
        match notif.method.as_str() {
            "notifications/initialized" => {
                if self.state == ServerState::Initialising {
                    self.state = ServerState::Running;
                    tracing::info!(
                        protocol = self.protocol_version.as_deref().unwrap_or(MCP_PROTOCOL_VERSION),
                        "Client initialised, serving requests"
                    );
                }
            }
            "notifications/cancelled" => self.handle_cancelled(notif),
            other => tracing::debug!(method = other, "Ignoring notification"),
        }
    }

    fn handle_cancelled(&self, notif: &JsonRpcNotification) {
        let Some(params) = notif
            .params
            .clone()
            .and_then(|p| serde_json::from_value::<CancelledParams>(p).ok())
        else {
            tracing::debug!("Ignoring malformed cancellation");
            return;
        };

        let token = lock(&self.in_flight).remove(&params.request_id);
        if let Some(token) = token {
            tracing::info!(
                id = %params.request_id,
                reason = params.reason.as_deref().unwrap_or(""),
                "Request cancelled by client"
            );
            token.cancel();
        }
    }

    /// Handles the initialize request.
    fn handle_initialize(&mut self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        if self.state != ServerState::AwaitingInit {
            return Err(JsonRpcError::new(
                Some(req.id.clone()),
                JsonRpcErrorData::with_message(
                    ErrorCode::InvalidRequest,
                    "Server already initialised",
                ),
            ));
        }

        let params: InitializeParams = req.parse_params()?;
        if let Some(client) = &params.client_info {
            tracing::info!(
                client = %client.name,
                client_version = client.version.as_deref().unwrap_or("unknown"),
                requested_version = %params.protocol_version,
                "Client connected"
            );
        }

        let negotiated_version = MCP_PROTOCOL_VERSION.to_string();

        self.protocol_version = Some(negotiated_version.clone());
        self.state = ServerState::Initialising;

        let result = json!({
            "protocolVersion": negotiated_version,
            "capabilities": ServerCapabilities::default(),
            "serverInfo": ServerInfo::default(),
        });

        Ok(JsonRpcResponse::success(req.id.clone(), result))
    }

    /// Handles the ping request.
    fn handle_ping(req: &JsonRpcRequest) -> JsonRpcResponse {
        JsonRpcResponse::success(req.id.clone(), json!({}))
    }

    /// Handles the tools/list request.
    fn handle_tools_list(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_running(&req.id)?;
        let tools = self.server.registry.tools.definitions();
        Ok(JsonRpcResponse::success(req.id.clone(), json!({ "tools": tools })))
    }

    /// Handles the resources/list request.
    fn handle_resources_list(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_running(&req.id)?;
        let resources = self.server.registry.resources.list_resources();
        Ok(JsonRpcResponse::success(
            req.id.clone(),
            json!({ "resources": resources }),
        ))
    }

    /// Handles the resources/templates/list request.
    fn handle_resource_templates_list(
        &self,
        req: &JsonRpcRequest,
    ) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_running(&req.id)?;
        let templates = self.server.registry.resources.list_templates();
        Ok(JsonRpcResponse::success(
            req.id.clone(),
            json!({ "resourceTemplates": templates }),
        ))
    }

    /// Handles the prompts/list request.
    fn handle_prompts_list(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_running(&req.id)?;
        let prompts = self.server.registry.prompts.list();
        Ok(JsonRpcResponse::success(
            req.id.clone(),
            json!({ "prompts": prompts }),
        ))
    }

    /// Validates a request that will run on its own task.
    fn parse_call(&self, req: &JsonRpcRequest) -> Result<Call, JsonRpcError> {
        self.require_running(&req.id)?;
        match req.method.as_str() {
            "tools/call" => req.parse_params().map(Call::Tool),
            "resources/read" => req.parse_params().map(Call::Read),
            _ => req.parse_params().map(Call::Prompt),
        }
    }

    fn spawn_call(&mut self, req: &JsonRpcRequest, call: Call) {
        let id = req.id.clone();
        let cancel = self.server.shutdown.child_token();

        let duplicate = {
            let mut in_flight = lock(&self.in_flight);
            let duplicate = in_flight.contains_key(&id);
            if !duplicate {
                in_flight.insert(id.clone(), cancel.clone());
            }
            duplicate
        };
        if duplicate {
            self.send(
                JsonRpcError::invalid_request_with(id, "Request id is already in flight").into(),
            );
            return;
        }

        let ctx = RequestContext::new(self.server.connection.clone(), self.server.bridge)
            .with_request(id.clone(), req.meta().cloned())
            .with_cancellation(cancel);
        let registry = Arc::clone(&self.server.registry);
        let in_flight = Arc::clone(&self.in_flight);
        let outgoing = self.outgoing.clone();

        self.tasks.spawn(async move {
            let _unwind = UnwindReply {
                id: id.clone(),
                in_flight: Arc::clone(&in_flight),
                outgoing: outgoing.clone(),
            };
            let response = dispatch(&registry, ctx, id.clone(), call).await;

            // A client cancellation removes the entry first; MCP says not to answer.
            if lock(&in_flight).remove(&id).is_none() {
                tracing::debug!(id = %id, "Suppressing response to cancelled request");
                return;
            }
            if outgoing.send(response.into()).is_err() {
                tracing::warn!(id = %id, "Writer has stopped, dropping response");
            }
        });
    }

    /// Ensures the server is in the Running state.
    fn require_running(&self, id: &RequestId) -> Result<(), JsonRpcError> {
        if self.state != ServerState::Running {
            return Err(JsonRpcError::new(
                Some(id.clone()),
                JsonRpcErrorData::with_message(ErrorCode::InvalidRequest, "Server not initialised"),
            ));
        }
        Ok(())
    }
}

/// Runs a spawned request to its JSON-RPC response.
async fn dispatch(
    registry: &Registry,
    ctx: RequestContext,
    id: RequestId,
    call: Call,
) -> Result<JsonRpcResponse, JsonRpcError> {
    let result = match call {
        Call::Tool(params) => {
            let outcome = registry
                .tools
                .invoke(ctx, &params.name, params.arguments)
                .await
                .map_err(|e| dispatch_error(&id, e))?;
            serde_json::to_value(ToolCallResult::from(&outcome)).map_err(|e| {
                tracing::error!(error = %e, "Failed to serialise tool call result");
                JsonRpcError::internal_error(
                    id.clone(),
                    "Internal error: failed to serialise result",
                )
            })?
        }
        Call::Read(params) => {
            let value = registry
                .resources
                .read(ctx, &params.uri)
                .await
                .map_err(|e| dispatch_error(&id, e))?;
            json!({
                "contents": [{
                    "uri": params.uri,
                    "mimeType": RESOURCE_MIME_TYPE,
                    "text": value.to_string(),
                }]
            })
        }
        Call::Prompt(params) => registry
            .prompts
            .render(&params.name, params.arguments)
            .map_err(|e| dispatch_error(&id, e))?,
    };

    Ok(JsonRpcResponse::success(id, result))
}

fn dispatch_error(id: &RequestId, error: DispatchError) -> JsonRpcError {
    tracing::debug!(id = %id, error = %error, "Request rejected");
    match error {
        DispatchError::ResourceNotFound { uri } => JsonRpcError::resource_not_found(id.clone(), &uri),
        other => JsonRpcError::invalid_params(id.clone(), other.to_string()),
    }
}

fn log_task_result(result: Result<(), JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            tracing::error!("Request task panicked; no response was sent");
        } else {
            tracing::debug!(error = %e, "Request task did not complete");
        }
    }
}

/// Resolves on the first termination signal.
#[cfg(unix)]
async fn wait_for_signal() -> io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::select! {
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT, initiating graceful shutdown");
        }
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
    Ok(())
}

/// Resolves on the first termination signal.
#[cfg(windows)]
async fn wait_for_signal() -> io::Result<()> {
    tokio::signal::ctrl_c().await?;
    tracing::info!("Received Ctrl+C, initiating graceful shutdown");
    Ok(())
}
