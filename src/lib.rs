//! mongo-mcp: MCP server exposing MongoDB collections to AI assistants
//!
//! This library provides URI-addressed resources, mutating tools and prompt
//! templates over a single MongoDB database.
//!
//! # Architecture
//!
//! Requests flow through a small routing core:
//!
//! - **Resource Router**: matches `scheme://seg/{param}` templates, most
//!   specific first, and extracts parameters
//! - **Tool Dispatcher**: validates a payload into typed parameters and
//!   returns a tagged success/failure result
//! - **Execution Bridge**: runs blocking driver calls on the worker pool so
//!   the request loop never stalls
//! - **Connection Manager**: verifies the connection before serving and
//!   releases it exactly once
//!
//! # Modules
//!
//! - [`bridge`] — Blocking-call offloading
//! - [`config`] — Configuration loading and validation
//! - [`db`] — Document store trait, MongoDB and in-memory stores, connection lifecycle
//! - [`error`] — Error types
//! - [`handlers`] — Built-in resources, tools and prompts
//! - [`mcp`] — MCP protocol implementation

pub mod bridge;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod mcp;
