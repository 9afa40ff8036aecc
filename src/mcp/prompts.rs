//! Prompt templates.
//!
//! Prompts are pure: rendering never touches the datastore, so they run
//! inline on the request task.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::error::{DispatchError, RegistrationError};

/// Renders a prompt's messages from its arguments.
pub type PromptRenderer =
    Arc<dyn Fn(&PromptArguments) -> Result<Vec<PromptMessage>, DispatchError> + Send + Sync>;

/// Arguments passed to `prompts/get`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromptArguments(Map<String, Value>);

impl PromptArguments {
    /// Returns the argument as text.
    ///
    /// MCP sends prompt arguments as strings, but numbers and booleans are
    /// accepted and rendered as written.
    #[must_use]
    pub fn text(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Returns a required text argument.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the argument is missing.
    pub fn require_text(&self, key: &str) -> Result<String, DispatchError> {
        self.text(key)
            .ok_or_else(|| DispatchError::validation(format!("Missing required argument: {key}")))
    }
}

impl From<Map<String, Value>> for PromptArguments {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Speaker of a prompt message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The human side of the conversation.
    User,
}

/// Content of a prompt message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PromptContent {
    /// Plain text.
    Text {
        /// The text.
        text: String,
    },
}

/// One rendered message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptMessage {
    /// Who says it.
    pub role: Role,
    /// What is said.
    pub content: PromptContent,
}

impl PromptMessage {
    /// A user message with text content.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: PromptContent::Text { text: text.into() },
        }
    }
}

/// Declared prompt argument, as listed by `prompts/list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptArgument {
    /// Argument name.
    pub name: String,
    /// What it is for.
    pub description: String,
    /// Whether callers must supply it.
    pub required: bool,
}

impl PromptArgument {
    /// A required argument.
    #[must_use]
    pub fn required(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            required: true,
        }
    }

    /// An optional argument.
    #[must_use]
    pub fn optional(name: &str, description: &str) -> Self {
        Self {
            required: false,
            ..Self::required(name, description)
        }
    }
}

/// A named prompt bound to its renderer.
pub struct PromptDescriptor {
    name: String,
    description: String,
    arguments: Vec<PromptArgument>,
    render: PromptRenderer,
}

impl PromptDescriptor {
    /// Binds a render function.
    pub fn new<F>(name: &str, description: &str, arguments: Vec<PromptArgument>, render: F) -> Self
    where
        F: Fn(&PromptArguments) -> Result<Vec<PromptMessage>, DispatchError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            arguments,
            render: Arc::new(render),
        }
    }

    /// The prompt name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn listing(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "arguments": self.arguments,
        })
    }
}

impl fmt::Debug for PromptDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromptDescriptor")
            .field("name", &self.name)
            .field("arguments", &self.arguments)
            .finish_non_exhaustive()
    }
}

/// Maps prompt names to descriptors.
#[derive(Debug, Default)]
pub struct PromptRegistry {
    prompts: IndexMap<String, PromptDescriptor>,
}

impl PromptRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a prompt.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::Duplicate`] if the name is taken.
    pub fn register(&mut self, descriptor: PromptDescriptor) -> Result<(), RegistrationError> {
        if self.prompts.contains_key(&descriptor.name) {
            return Err(RegistrationError::Duplicate {
                kind: "prompt",
                name: descriptor.name,
            });
        }
        self.prompts.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    /// Renders a prompt into a `prompts/get` result.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::PromptNotFound`] for an unknown name, or the
    /// renderer's validation error.
    pub fn render(
        &self,
        name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> Result<Value, DispatchError> {
        let prompt = self
            .prompts
            .get(name)
            .ok_or_else(|| DispatchError::PromptNotFound {
                name: name.to_string(),
            })?;

        let arguments = PromptArguments::from(arguments.unwrap_or_default());
        let messages = (prompt.render)(&arguments)?;

        Ok(json!({
            "description": prompt.description,
            "messages": messages,
        }))
    }

    /// `prompts/list` entries in registration order.
    #[must_use]
    pub fn list(&self) -> Vec<Value> {
        self.prompts.values().map(PromptDescriptor::listing).collect()
    }

    /// Number of registered prompts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }
}
