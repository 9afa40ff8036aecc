//! Built-in resources, tools and prompts.
//!
//! Handlers here only translate between caller-facing JSON and
//! [`crate::db::DocumentStore`] calls; routing, validation and execution
//! live in [`crate::mcp`].

pub mod prompts;
pub mod resources;
pub mod tools;

use crate::error::RegistrationError;
use crate::mcp::Registry;

/// Most documents `mongo://{collection_name}/list_all` returns.
pub const LIST_ALL_LIMIT: usize = 20;

/// Builds a registry holding every built-in handler.
///
/// # Errors
///
/// Returns an error if two built-ins collide, which indicates a bug.
pub fn builtin_registry() -> Result<Registry, RegistrationError> {
    let mut registry = Registry::default();
    register_builtins(&mut registry)?;
    Ok(registry)
}

/// Adds the built-in handlers to an existing registry.
///
/// # Errors
///
/// Returns an error if a built-in collides with something already registered.
pub fn register_builtins(registry: &mut Registry) -> Result<(), RegistrationError> {
    resources::register(&mut registry.resources)?;
    tools::register(&mut registry.tools)?;
    prompts::register(&mut registry.prompts)?;
    Ok(())
}
