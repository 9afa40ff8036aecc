//! Read-only resources.

use mongodb::bson::doc;
use serde_json::{json, Value};

use crate::db::document_to_json;
use crate::error::RegistrationError;
use crate::handlers::LIST_ALL_LIMIT;
use crate::mcp::context::RequestContext;
use crate::mcp::protocol::SERVER_NAME;
use crate::mcp::router::{ResourceRouter, UriParams};

/// Registers the built-in resources.
///
/// # Errors
///
/// Returns an error if a template collides with one already registered.
pub fn register(router: &mut ResourceRouter) -> Result<(), RegistrationError> {
    router.register(
        "app://info",
        "app_info",
        "Server identity, target database and live connection status",
        app_info,
    )?;
    router.register(
        "mongo://{collection_name}/{item_id}",
        "mongo_item",
        "The first document in a collection whose name field equals item_id",
        get_item,
    )?;
    router.register(
        "mongo://{collection_name}/list_all",
        "mongo_collection_items",
        "Up to 20 documents from a collection in natural order",
        list_all,
    )?;
    router.register(
        "mongo://collections",
        "mongo_collections",
        "Sorted names of the collections in the database",
        list_collections,
    )?;
    Ok(())
}

fn param(params: &UriParams, name: &str) -> String {
    params.get(name).unwrap_or_default().to_string()
}

/// `app://info`
pub async fn app_info(ctx: RequestContext, _params: UriParams) -> Value {
    let db_status = match ctx.run_blocking(|store| store.ping()).await {
        Ok(()) => "Connected",
        Err(e) => {
            tracing::warn!(error = %e, "Ping failed");
            "Connection Error"
        }
    };

    let connection = ctx.connection();
    json!({
        "server_name": SERVER_NAME,
        "server_version": env!("CARGO_PKG_VERSION"),
        "mongodb_uri": connection.uri(),
        "database_name": connection.database(),
        "db_status": db_status,
    })
}

/// `mongo://{collection_name}/{item_id}`
pub async fn get_item(ctx: RequestContext, params: UriParams) -> Value {
    let collection = param(&params, "collection_name");
    let item_id = param(&params, "item_id");
    let query = json!({ "name": item_id });

    let target = collection.clone();
    let result = ctx
        .run_blocking(move |store| store.find_one(&target, doc! { "name": item_id }))
        .await;

    match result {
        Ok(Some(document)) => json!({
            "found": true,
            "collection": collection,
            "item": document_to_json(document),
        }),
        Ok(None) => json!({
            "found": false,
            "collection": collection,
            "query": query,
            "message": "Item not found",
        }),
        Err(e) => {
            tracing::warn!(collection = %collection, error = %e, "Item lookup failed");
            json!({
                "found": false,
                "collection": collection,
                "query": query,
                "error": e.to_string(),
            })
        }
    }
}

/// `mongo://{collection_name}/list_all`
pub async fn list_all(ctx: RequestContext, params: UriParams) -> Value {
    let collection = param(&params, "collection_name");

    let target = collection.clone();
    let result = ctx
        .run_blocking(move |store| store.find(&target, LIST_ALL_LIMIT))
        .await;

    match result {
        Ok(documents) => {
            let items: Vec<Value> = documents.into_iter().map(document_to_json).collect();
            json!({
                "collection": collection,
                "count": items.len(),
                "items": items,
            })
        }
        Err(e) => {
            tracing::warn!(collection = %collection, error = %e, "Listing failed");
            json!({
                "collection": collection,
                "count": 0,
                "items": [],
                "error": e.to_string(),
            })
        }
    }
}

/// `mongo://collections`
///
/// Returns a sorted array of names, or `{"error": ...}` if the listing fails.
pub async fn list_collections(ctx: RequestContext, _params: UriParams) -> Value {
    match ctx.run_blocking(|store| store.list_collection_names()).await {
        Ok(mut names) => {
            names.sort();
            json!(names)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Collection listing failed");
            json!({ "error": format!("Error listing collections: {e}") })
        }
    }
}
