//! Prompt templates.

use crate::error::{DispatchError, RegistrationError};
use crate::mcp::prompts::{
    PromptArgument, PromptArguments, PromptDescriptor, PromptMessage, PromptRegistry,
};

/// Word limit used when `max_length` is omitted.
pub const DEFAULT_SUMMARY_LENGTH: u64 = 100;

/// Registers the built-in prompts.
///
/// # Errors
///
/// Returns an error if a prompt name is already taken.
pub fn register(registry: &mut PromptRegistry) -> Result<(), RegistrationError> {
    registry.register(PromptDescriptor::new(
        "generate_summary_request",
        "Ask for a summary of a piece of text",
        vec![
            PromptArgument::required("text_to_summarize", "Text to summarize"),
            PromptArgument::optional("max_length", "Word limit for the summary (default 100)"),
        ],
        |args| Ok(vec![PromptMessage::user(summary_request(args)?)]),
    ))?;
    registry.register(PromptDescriptor::new(
        "ask_about_mongo_item",
        "Ask about a named item in a collection",
        vec![
            PromptArgument::required("collection", "Collection holding the item"),
            PromptArgument::required("item_name", "Value of the item's name field"),
        ],
        |args| Ok(vec![PromptMessage::user(item_question(args)?)]),
    ))?;
    Ok(())
}

/// Text of `generate_summary_request`.
///
/// # Errors
///
/// Returns a validation error if the text is missing or `max_length` is not a
/// positive integer.
pub fn summary_request(args: &PromptArguments) -> Result<String, DispatchError> {
    let text = args
        .text("text_to_summarize")
        .or_else(|| args.text("text"))
        .ok_or_else(|| {
            DispatchError::validation("Missing required argument: text_to_summarize")
        })?;

    let max_length = match args.text("max_length") {
        None => DEFAULT_SUMMARY_LENGTH,
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| {
                DispatchError::validation(format!(
                    "max_length must be a positive integer, got '{raw}'"
                ))
            })?,
    };

    Ok(format!(
        "Please summarize the following text in under {max_length} words:\n\n{text}"
    ))
}

/// Text of `ask_about_mongo_item`.
///
/// # Errors
///
/// Returns a validation error if either argument is missing.
pub fn item_question(args: &PromptArguments) -> Result<String, DispatchError> {
    let collection = args.require_text("collection")?;
    let item_name = args.require_text("item_name")?;
    Ok(format!(
        "Tell me about the item named '{item_name}' in the '{collection}' MongoDB collection."
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map, Value};

    fn args(value: Value) -> PromptArguments {
        match value {
            Value::Object(map) => PromptArguments::from(map),
            _ => PromptArguments::from(Map::new()),
        }
    }

    #[test]
    fn summary_uses_default_length() {
        let text = summary_request(&args(json!({ "text_to_summarize": "Long text." }))).unwrap();
        assert_eq!(
            text,
            "Please summarize the following text in under 100 words:\n\nLong text."
        );
    }

    #[test]
    fn summary_accepts_text_alias_and_length() {
        let text = summary_request(&args(json!({ "text": "abc", "max_length": "25" }))).unwrap();
        assert!(text.starts_with("Please summarize the following text in under 25 words:"));
        assert!(text.ends_with("\n\nabc"));
    }

    #[test]
    fn summary_rejects_bad_length() {
        for bad in ["0", "-5", "ten", ""] {
            let err = summary_request(&args(json!({ "text": "abc", "max_length": bad })));
            assert!(
                matches!(err, Err(DispatchError::Validation { .. })),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn summary_requires_text() {
        assert_eq!(
            summary_request(&args(json!({}))).unwrap_err(),
            DispatchError::validation("Missing required argument: text_to_summarize")
        );
    }

    #[test]
    fn item_question_text() {
        let text =
            item_question(&args(json!({ "collection": "parts", "item_name": "widget" }))).unwrap();
        assert_eq!(
            text,
            "Tell me about the item named 'widget' in the 'parts' MongoDB collection."
        );
    }

    #[test]
    fn registry_renders_single_user_message() {
        let mut registry = PromptRegistry::new();
        register(&mut registry).unwrap();

        let mut arguments = Map::new();
        arguments.insert("collection".to_string(), json!("parts"));
        arguments.insert("item_name".to_string(), json!("widget"));
        let result = registry
            .render("ask_about_mongo_item", Some(arguments))
            .unwrap();

        let messages = result["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[0]["content"]["type"], "text");
    }
}
