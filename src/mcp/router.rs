//! Resource URI routing.
//!
//! A template such as `mongo://{collection_name}/{item_id}` is a scheme plus
//! `/`-separated path segments. Each segment is either a literal or a whole
//! `{placeholder}`. A URI matches a template when the schemes are equal, the
//! segment counts are equal, every literal matches exactly (case-sensitive)
//! and every placeholder segment is non-empty.
//!
//! # Ambiguity
//!
//! Overlapping templates are checked when they are registered, not when a
//! request arrives. Two templates overlap if some URI matches both. An
//! overlap is accepted only when one template is strictly more specific:
//! wherever the two differ, it is that template which has the literal. The
//! more specific template then wins at resolve time:
//!
//! ```text
//! mongo://{collection_name}/list_all   ← wins for mongo://parts/list_all
//! mongo://{collection_name}/{item_id}  ← everything else
//! ```
//!
//! Identical shapes and criss-crossed overlaps (`x://{a}/b` vs `x://a/{b}`)
//! are registration errors.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::error::{DispatchError, RegistrationError};
use crate::mcp::context::RequestContext;
use crate::mcp::BoxFuture;

/// MIME type reported for every resource; handlers return JSON.
pub const RESOURCE_MIME_TYPE: &str = "application/json";

/// Bound resource handler.
pub type ResourceHandler =
    Arc<dyn Fn(RequestContext, UriParams) -> BoxFuture<'static, Value> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// How two templates relate to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Overlap {
    /// No URI matches both.
    Disjoint,
    /// Both match some URI and `self` has a literal wherever they differ.
    MoreSpecific,
    /// Both match some URI and `other` has a literal wherever they differ.
    LessSpecific,
    /// Both match some URI with no precedence between them.
    Ambiguous,
}

/// A parsed, immutable URI template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriTemplate {
    raw: String,
    scheme: String,
    segments: Vec<Segment>,
}

impl UriTemplate {
    /// Parses a template string.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::InvalidTemplate`] for a missing scheme,
    /// empty segments, partial placeholders (`item-{id}`), non-identifier
    /// placeholder names or duplicate placeholder names.
    pub fn parse(template: &str) -> Result<Self, RegistrationError> {
        let invalid = |message: &str| RegistrationError::InvalidTemplate {
            template: template.to_string(),
            message: message.to_string(),
        };

        let (scheme, path) = template
            .split_once("://")
            .ok_or_else(|| invalid("missing '://' after scheme"))?;
        if scheme.is_empty()
            || !scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        {
            return Err(invalid("scheme must be non-empty and alphanumeric"));
        }
        if path.is_empty() {
            return Err(invalid("template has no path segments"));
        }

        let mut segments = Vec::new();
        for part in path.split('/') {
            if part.is_empty() {
                return Err(invalid("empty path segment"));
            }
            let segment = match part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
                Some(name) => {
                    if !is_identifier(name) {
                        return Err(invalid(&format!(
                            "placeholder '{{{name}}}' is not a valid identifier"
                        )));
                    }
                    if segments
                        .iter()
                        .any(|s| matches!(s, Segment::Placeholder(n) if n == name))
                    {
                        return Err(invalid(&format!("placeholder '{{{name}}}' appears twice")));
                    }
                    Segment::Placeholder(name.to_string())
                }
                None if part.contains(['{', '}']) => {
                    return Err(invalid("placeholders must span a whole segment"));
                }
                None => Segment::Literal(part.to_string()),
            };
            segments.push(segment);
        }

        Ok(Self {
            raw: template.to_string(),
            scheme: scheme.to_string(),
            segments,
        })
    }

    /// The template as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Placeholder names in order of appearance.
    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Placeholder(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Returns `true` if the template has no placeholders.
    #[must_use]
    pub fn is_bare(&self) -> bool {
        self.placeholders().next().is_none()
    }

    fn literal_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Literal(_)))
            .count()
    }

    /// Matches a URI and extracts placeholder values in order.
    #[must_use]
    pub fn match_uri(&self, uri: &str) -> Option<UriParams> {
        let (scheme, path) = uri.split_once("://")?;
        if scheme != self.scheme {
            return None;
        }

        let parts: Vec<&str> = path.split('/').collect();
        if parts.len() != self.segments.len() {
            return None;
        }

        let mut params = UriParams::default();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(literal) if literal == part => {}
                Segment::Placeholder(name) if !part.is_empty() => {
                    params.values.push((name.clone(), part.to_string()));
                }
                _ => return None,
            }
        }
        Some(params)
    }

    fn overlap(&self, other: &Self) -> Overlap {
        if self.scheme != other.scheme || self.segments.len() != other.segments.len() {
            return Overlap::Disjoint;
        }

        let mut self_literal = false;
        let mut other_literal = false;
        for pair in self.segments.iter().zip(&other.segments) {
            match pair {
                (Segment::Literal(a), Segment::Literal(b)) if a != b => return Overlap::Disjoint,
                (Segment::Literal(_), Segment::Placeholder(_)) => self_literal = true,
                (Segment::Placeholder(_), Segment::Literal(_)) => other_literal = true,
                _ => {}
            }
        }

        match (self_literal, other_literal) {
            (true, false) => Overlap::MoreSpecific,
            (false, true) => Overlap::LessSpecific,
            _ => Overlap::Ambiguous,
        }
    }
}

impl fmt::Display for UriTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Placeholder values extracted from a URI, in template order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UriParams {
    values: Vec<(String, String)>,
}

impl UriParams {
    /// Looks up a value by placeholder name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Iterates `(name, value)` pairs in template order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Number of extracted values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if nothing was extracted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A registered template with its metadata and handler.
pub struct ResourceEntry {
    template: UriTemplate,
    name: String,
    description: String,
    handler: ResourceHandler,
}

impl ResourceEntry {
    /// The template this entry answers.
    #[must_use]
    pub const fn template(&self) -> &UriTemplate {
        &self.template
    }

    /// Short resource name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn descriptor(&self) -> Value {
        let key = if self.template.is_bare() {
            "uri"
        } else {
            "uriTemplate"
        };
        json!({
            key: self.template.as_str(),
            "name": self.name,
            "description": self.description,
            "mimeType": RESOURCE_MIME_TYPE,
        })
    }
}

impl fmt::Debug for ResourceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceEntry")
            .field("template", &self.template.as_str())
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Maps resource URIs to handlers.
#[derive(Debug, Default)]
pub struct ResourceRouter {
    entries: Vec<ResourceEntry>,
}

impl ResourceRouter {
    /// Creates an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for `template`.
    ///
    /// # Errors
    ///
    /// Returns an error if the template is malformed or ambiguous with one
    /// already registered.
    pub fn register<H, Fut>(
        &mut self,
        template: &str,
        name: &str,
        description: &str,
        handler: H,
    ) -> Result<(), RegistrationError>
    where
        H: Fn(RequestContext, UriParams) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Value> + Send + 'static,
    {
        let template = UriTemplate::parse(template)?;

        for existing in &self.entries {
            if template.overlap(&existing.template) == Overlap::Ambiguous {
                return Err(RegistrationError::AmbiguousTemplate {
                    template: template.raw,
                    existing: existing.template.raw.clone(),
                });
            }
        }

        tracing::debug!(template = %template, "Registered resource");
        let handler: ResourceHandler = Arc::new(
            move |ctx: RequestContext, params: UriParams| -> BoxFuture<'static, Value> {
                Box::pin(handler(ctx, params))
            },
        );
        self.entries.push(ResourceEntry {
            template,
            name: name.to_string(),
            description: description.to_string(),
            handler,
        });
        Ok(())
    }

    /// Finds the entry for `uri` and extracts its parameters.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::ResourceNotFound`] if no template matches.
    pub fn resolve(&self, uri: &str) -> Result<(&ResourceEntry, UriParams), DispatchError> {
        // Registration guarantees any two matches are strictly ordered by
        // specificity, which is the number of literal segments.
        self.entries
            .iter()
            .filter_map(|entry| entry.template.match_uri(uri).map(|params| (entry, params)))
            .max_by_key(|(entry, _)| entry.template.literal_count())
            .ok_or_else(|| DispatchError::ResourceNotFound {
                uri: uri.to_string(),
            })
    }

    /// Resolves `uri` and runs its handler.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::ResourceNotFound`] if no template matches.
    pub async fn read(&self, ctx: RequestContext, uri: &str) -> Result<Value, DispatchError> {
        let (entry, params) = self.resolve(uri)?;
        tracing::debug!(uri, template = %entry.template, "Reading resource");
        Ok((entry.handler)(ctx, params).await)
    }

    /// Descriptors for templates without placeholders (`resources/list`).
    #[must_use]
    pub fn list_resources(&self) -> Vec<Value> {
        self.entries
            .iter()
            .filter(|e| e.template.is_bare())
            .map(ResourceEntry::descriptor)
            .collect()
    }

    /// Descriptors for templates with placeholders (`resources/templates/list`).
    #[must_use]
    pub fn list_templates(&self) -> Vec<Value> {
        self.entries
            .iter()
            .filter(|e| !e.template.is_bare())
            .map(ResourceEntry::descriptor)
            .collect()
    }

    /// Number of registered templates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
