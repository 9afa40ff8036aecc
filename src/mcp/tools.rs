//! Tool registration and dispatch.
//!
//! Tools are looked up by exact name. Each tool declares a typed parameter
//! struct implementing [`ToolParams`]; the payload is parsed into it before
//! the handler runs, so handlers never see raw JSON. Whatever happens, a
//! handler produces an [`OperationResult`] whose `success` field tells the
//! caller which branch to take.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::error::{DispatchError, RegistrationError};
use crate::mcp::context::RequestContext;
use crate::mcp::BoxFuture;

/// Bound tool handler.
pub type ToolHandler =
    Arc<dyn Fn(RequestContext, ToolArguments) -> BoxFuture<'static, OperationResult> + Send + Sync>;

/// The argument object of a `tools/call` request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolArguments(Map<String, Value>);

impl ToolArguments {
    /// Accepts an object, or `null` as an empty object.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Validation`] for any other JSON type.
    pub fn from_value(value: Value) -> Result<Self, DispatchError> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::Object(map) => Ok(Self(map)),
            other => Err(DispatchError::validation(format!(
                "Tool arguments must be a JSON object, got {}",
                json_type_name(&other)
            ))),
        }
    }

    /// Returns the raw value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns a required string parameter.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the key is absent or not a string.
    pub fn require_str(&self, key: &str) -> Result<&str, DispatchError> {
        match self.0.get(key) {
            None | Some(Value::Null) => Err(missing(key)),
            Some(Value::String(s)) => Ok(s),
            Some(other) => Err(wrong_type(key, "a string", other)),
        }
    }

    /// Returns a required object parameter.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the key is absent or not an object.
    pub fn require_object(&self, key: &str) -> Result<&Map<String, Value>, DispatchError> {
        match self.0.get(key) {
            None | Some(Value::Null) => Err(missing(key)),
            Some(Value::Object(map)) => Ok(map),
            Some(other) => Err(wrong_type(key, "an object", other)),
        }
    }
}

impl From<Map<String, Value>> for ToolArguments {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

fn missing(key: &str) -> DispatchError {
    DispatchError::validation(format!("Missing required parameter: {key}"))
}

fn wrong_type(key: &str, expected: &str, got: &Value) -> DispatchError {
    DispatchError::validation(format!(
        "Parameter '{key}' must be {expected}, got {}",
        json_type_name(got)
    ))
}

const fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A tool's typed parameters.
pub trait ToolParams: Sized + Send + 'static {
    /// JSON Schema advertised in `tools/list`.
    fn input_schema() -> Value;

    /// Extracts the parameters from the call payload.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Validation`] for missing or mistyped fields.
    fn from_arguments(arguments: &ToolArguments) -> Result<Self, DispatchError>;
}

/// Broad classification of a failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The payload was malformed.
    Validation,
    /// The operation ran but matched nothing.
    NotFound,
    /// The datastore reported an error.
    Datastore,
}

/// Outcome of a tool invocation.
///
/// Serialises to a JSON object whose `success` field is the tag, merged with
/// the payload fields.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationResult {
    /// The operation succeeded.
    Success(Map<String, Value>),
    /// The operation failed.
    Failure {
        /// What went wrong.
        kind: FailureKind,
        /// Fields reported to the caller.
        payload: Map<String, Value>,
    },
}

impl OperationResult {
    /// An empty success.
    #[must_use]
    pub fn success() -> Self {
        Self::Success(Map::new())
    }

    /// An empty failure of the given kind.
    #[must_use]
    pub fn failure(kind: FailureKind) -> Self {
        Self::Failure {
            kind,
            payload: Map::new(),
        }
    }

    /// A failure carrying an `error` message.
    #[must_use]
    pub fn error(kind: FailureKind, message: impl fmt::Display) -> Self {
        Self::failure(kind).with("error", message.to_string())
    }

    /// Adds a payload field.
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        let payload = match &mut self {
            Self::Success(payload) | Self::Failure { payload, .. } => payload,
        };
        payload.insert(key.to_string(), value.into());
        self
    }

    /// Returns `true` for [`OperationResult::Success`].
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// The failure kind, if any.
    #[must_use]
    pub const fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Success(_) => None,
            Self::Failure { kind, .. } => Some(*kind),
        }
    }

    /// Renders the result as a JSON object with a `success` field.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let (success, payload) = match self {
            Self::Success(payload) => (true, payload),
            Self::Failure { payload, .. } => (false, payload),
        };
        let mut object = payload.clone();
        object.insert("success".to_string(), Value::Bool(success));
        Value::Object(object)
    }
}

/// Content item in a tool call response.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    /// Text content.
    Text {
        /// The text content.
        text: String,
    },
}

/// Result of a tool call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    /// Content returned by the tool.
    pub content: Vec<ToolContent>,
    /// Whether the tool call resulted in an error.
    #[serde(skip_serializing_if = "is_false")]
    pub is_error: bool,
}

#[allow(clippy::trivially_copy_pass_by_ref)] // serde's skip_serializing_if requires fn(&T) -> bool
const fn is_false(b: &bool) -> bool {
    !*b
}

impl From<&OperationResult> for ToolCallResult {
    fn from(result: &OperationResult) -> Self {
        Self {
            content: vec![ToolContent::Text {
                text: result.to_value().to_string(),
            }],
            is_error: !result.is_success(),
        }
    }
}

/// A named tool bound to its handler.
pub struct ToolDescriptor {
    name: String,
    description: String,
    input_schema: Value,
    handler: ToolHandler,
}

impl ToolDescriptor {
    /// Binds a handler taking typed parameters.
    ///
    /// Payloads that fail [`ToolParams::from_arguments`] never reach the
    /// handler; they become a validation failure instead.
    pub fn new<P, H, Fut>(name: &str, description: &str, handler: H) -> Self
    where
        P: ToolParams,
        H: Fn(RequestContext, P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = OperationResult> + Send + 'static,
    {
        let handler: ToolHandler = Arc::new(
            move |ctx: RequestContext, arguments: ToolArguments| -> BoxFuture<'static, OperationResult> {
                match P::from_arguments(&arguments) {
                    Ok(params) => Box::pin(handler(ctx, params)),
                    Err(e) => Box::pin(std::future::ready(OperationResult::error(
                        FailureKind::Validation,
                        e,
                    ))),
                }
            },
        );

        Self {
            name: name.to_string(),
            description: description.to_string(),
            input_schema: P::input_schema(),
            handler,
        }
    }

    /// The tool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The `tools/list` entry for this tool.
    #[must_use]
    pub fn definition(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": self.input_schema,
        })
    }
}

impl fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Maps tool names to descriptors, in registration order.
#[derive(Debug, Default)]
pub struct ToolDispatcher {
    tools: IndexMap<String, ToolDescriptor>,
}

impl ToolDispatcher {
    /// Creates an empty dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::Duplicate`] if the name is taken.
    pub fn register(&mut self, descriptor: ToolDescriptor) -> Result<(), RegistrationError> {
        if self.tools.contains_key(&descriptor.name) {
            return Err(RegistrationError::Duplicate {
                kind: "tool",
                name: descriptor.name,
            });
        }
        tracing::debug!(tool = %descriptor.name, "Registered tool");
        self.tools.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    /// Invokes a tool by name.
    ///
    /// A payload that is not an object yields a validation failure result,
    /// not an error.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::ToolNotFound`] for an unknown name.
    pub async fn invoke(
        &self,
        ctx: RequestContext,
        name: &str,
        payload: Value,
    ) -> Result<OperationResult, DispatchError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| DispatchError::ToolNotFound {
                name: name.to_string(),
            })?;

        let arguments = match ToolArguments::from_value(payload) {
            Ok(arguments) => arguments,
            Err(e) => return Ok(OperationResult::error(FailureKind::Validation, e)),
        };

        tracing::debug!(tool = %name, "Invoking tool");
        let result = (tool.handler)(ctx, arguments).await;
        if let Some(kind) = result.failure_kind() {
            tracing::debug!(tool = %name, ?kind, "Tool reported failure");
        }
        Ok(result)
    }

    /// `tools/list` entries in registration order.
    #[must_use]
    pub fn definitions(&self) -> Vec<Value> {
        self.tools.values().map(ToolDescriptor::definition).collect()
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
