//! Model Context Protocol (MCP) server implementation.
//!
//! This module exposes MongoDB collections to AI assistants as MCP resources,
//! tools and prompts. The server communicates over stdio using JSON-RPC 2.0
//! messages.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                            MCP Server                            │
//! │                                                                  │
//! │   ┌─────────────┐    ┌─────────────┐    ┌──────────────────┐    │
//! │   │  Transport  │───▶│   Server    │───▶│ Router/Dispatcher│    │
//! │   │   (stdio)   │    │ (lifecycle) │    │  (per request)   │    │
//! │   └─────────────┘    └─────────────┘    └──────────────────┘    │
//! │          ▲                                       │              │
//! │          │ writer task                           ▼              │
//! │   ┌─────────────┐                      ┌──────────────────┐    │
//! │   │  responses  │◀─────────────────────│ Execution Bridge │    │
//! │   └─────────────┘                      └──────────────────┘    │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Protocol Version
//!
//! This implementation targets MCP protocol version 2024-11-05.

pub mod context;
pub mod prompts;
pub mod protocol;
pub mod router;
pub mod server;
pub mod tools;
pub mod transport;

use std::future::Future;
use std::pin::Pin;

pub use context::RequestContext;
pub use protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, MCP_PROTOCOL_VERSION};
pub use server::McpServer;

/// Boxed future returned by registered handlers.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Every resource, tool and prompt the server can answer.
///
/// Built once at startup and shared read-only by all requests.
#[derive(Debug, Default)]
pub struct Registry {
    /// Resource templates.
    pub resources: router::ResourceRouter,
    /// Tools by name.
    pub tools: tools::ToolDispatcher,
    /// Prompts by name.
    pub prompts: prompts::PromptRegistry,
}
