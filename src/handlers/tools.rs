//! Mutating tools.

use mongodb::bson::{doc, Document};
use serde_json::{json, Value};

use crate::db::id_to_string;
use crate::error::{DispatchError, RegistrationError};
use crate::mcp::context::RequestContext;
use crate::mcp::tools::{
    FailureKind, OperationResult, ToolArguments, ToolDescriptor, ToolDispatcher, ToolParams,
};

/// Registers the built-in tools.
///
/// # Errors
///
/// Returns an error if a tool name is already taken.
pub fn register(dispatcher: &mut ToolDispatcher) -> Result<(), RegistrationError> {
    dispatcher.register(ToolDescriptor::new(
        "add_mongo_item",
        "Insert a document into a MongoDB collection. \
         A missing _id is generated; the new id is returned as a string.",
        add_item,
    ))?;
    dispatcher.register(ToolDescriptor::new(
        "delete_mongo_item",
        "Delete the first document in a collection whose name field matches.",
        delete_item,
    ))?;
    Ok(())
}

fn require_collection(arguments: &ToolArguments) -> Result<String, DispatchError> {
    let name = arguments.require_str("collection_name")?;
    if name.is_empty() {
        return Err(DispatchError::validation("collection_name must not be empty"));
    }
    Ok(name.to_string())
}

/// Parameters of `add_mongo_item`.
#[derive(Debug, Clone, PartialEq)]
pub struct AddItemParams {
    /// Target collection.
    pub collection_name: String,
    /// The document to insert.
    pub item_data: Document,
}

impl ToolParams for AddItemParams {
    fn input_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "collection_name": {
                    "type": "string",
                    "description": "Collection to insert into"
                },
                "item_data": {
                    "type": "object",
                    "description": "Document to insert"
                }
            },
            "required": ["collection_name", "item_data"]
        })
    }

    fn from_arguments(arguments: &ToolArguments) -> Result<Self, DispatchError> {
        let collection_name = require_collection(arguments)?;
        let item_data = arguments.require_object("item_data")?;
        let item_data = mongodb::bson::to_document(item_data)
            .map_err(|e| DispatchError::validation(format!("Invalid item_data: {e}")))?;
        Ok(Self {
            collection_name,
            item_data,
        })
    }
}

/// Parameters of `delete_mongo_item`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteItemParams {
    /// Target collection.
    pub collection_name: String,
    /// Value of the `name` field to match.
    pub item_name_to_delete: String,
}

impl ToolParams for DeleteItemParams {
    fn input_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "collection_name": {
                    "type": "string",
                    "description": "Collection to delete from"
                },
                "item_name_to_delete": {
                    "type": "string",
                    "description": "Value of the name field of the document to delete"
                }
            },
            "required": ["collection_name", "item_name_to_delete"]
        })
    }

    fn from_arguments(arguments: &ToolArguments) -> Result<Self, DispatchError> {
        Ok(Self {
            collection_name: require_collection(arguments)?,
            item_name_to_delete: arguments.require_str("item_name_to_delete")?.to_string(),
        })
    }
}

/// `add_mongo_item`
pub async fn add_item(ctx: RequestContext, params: AddItemParams) -> OperationResult {
    let AddItemParams {
        collection_name,
        item_data,
    } = params;

    let target = collection_name.clone();
    match ctx
        .run_blocking(move |store| store.insert_one(&target, item_data))
        .await
    {
        Ok(id) => {
            let inserted_id = id_to_string(&id);
            tracing::info!(collection = %collection_name, id = %inserted_id, "Inserted document");
            OperationResult::success()
                .with("collection", collection_name)
                .with("inserted_id", inserted_id)
        }
        Err(e) => {
            tracing::warn!(collection = %collection_name, error = %e, "Insert failed");
            OperationResult::error(FailureKind::Datastore, e)
        }
    }
}

/// `delete_mongo_item`
pub async fn delete_item(ctx: RequestContext, params: DeleteItemParams) -> OperationResult {
    let DeleteItemParams {
        collection_name,
        item_name_to_delete,
    } = params;
    let query = json!({ "name": item_name_to_delete });

    match ctx
        .run_blocking(move |store| {
            store.delete_one(&collection_name, doc! { "name": item_name_to_delete })
        })
        .await
    {
        Ok(0) => OperationResult::failure(FailureKind::NotFound)
            .with("deleted_count", 0)
            .with("message", "No item found matching query")
            .with("query", query),
        Ok(deleted_count) => {
            tracing::info!(query = %query, deleted_count, "Deleted document");
            OperationResult::success()
                .with("deleted_count", deleted_count)
                .with("query", query)
        }
        Err(e) => {
            tracing::warn!(query = %query, error = %e, "Delete failed");
            OperationResult::error(FailureKind::Datastore, e)
        }
    }
}
