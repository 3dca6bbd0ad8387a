//! Full-text search across entities.

use quickserve_core::{
    handler, Context, DatabaseRegistry, EntityRegistry, Handler, QuickError, QuickResult,
};
use quickserve_router::{ActionRouter, Router};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::state::Services;

/// HTTP path of the search route.
pub const SEARCH_PATH: &str = "/system/search";

/// Socket action of the search route.
pub const SEARCH_ACTION: &str = "system_search";

/// Registers the search route and action.
pub fn register(
    routes: &mut Router<Handler>,
    actions: &mut ActionRouter<Handler>,
    services: &Services,
) {
    let databases = services.databases.clone();
    let entities = Arc::clone(&services.entities);
    let search_handler: Handler = handler(move |ctx: Context| {
        let databases = databases.clone();
        let entities = Arc::clone(&entities);
        async move { search(&ctx, &databases, &entities).await }
    });
    routes.get(SEARCH_PATH, Arc::clone(&search_handler));
    actions.action(SEARCH_ACTION, search_handler);
}

/// Searches the request's database for the `query` parameter.
///
/// Only tables backing a configured entity are returned, each row secured by
/// that entity.
async fn search(
    ctx: &Context,
    databases: &DatabaseRegistry,
    entities: &EntityRegistry,
) -> QuickResult<()> {
    let term = ctx
        .param_str("query")
        .ok_or_else(|| QuickError::bad_request("Missing search query"))?;
    let db = databases.get(ctx.database())?;

    let mut results = Map::new();
    for (table, rows) in db.search(&term).await? {
        let Some(entity) = entities.get(&table) else {
            continue;
        };
        let rows = Value::Array(rows.into_iter().map(Value::Object).collect());
        results.insert(table, entity.secure(rows));
    }
    tracing::debug!(request_id = %ctx.id(), term = %term, tables = results.len(), "Search finished");

    let mut body = Map::new();
    body.insert("results".into(), Value::Object(results));
    ctx.send(Value::Object(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickserve_auth::AuthConfig;
    use quickserve_core::{
        ChannelResponder, Database, EntityConfig, FieldSpec, FieldType, InMemoryDatabase,
        RequestMeta,
    };
    use serde_json::json;

    #[tokio::test]
    async fn test_search_hides_unknown_tables_and_secure_fields() {
        let db = Arc::new(InMemoryDatabase::new());
        let mut databases = DatabaseRegistry::new();
        databases.register("main", db.clone());
        let users = EntityConfig {
            name: "users".into(),
            alias: None,
            fields: [
                ("name".to_string(), FieldSpec::new(FieldType::String)),
                ("password".to_string(), FieldSpec::new(FieldType::String).secure()),
            ]
            .into_iter()
            .collect(),
        };
        let services = Services::new(
            databases,
            EntityRegistry::from_configs([users]),
            AuthConfig::default(),
        )
        .unwrap();

        db.insert("users", json!({"name": "Ada", "password": "ada"}).as_object().cloned().unwrap())
            .await
            .unwrap();
        db.insert("auth", json!({"token": "ada-token"}).as_object().cloned().unwrap())
            .await
            .unwrap();

        let mut routes = Router::new();
        let mut actions = ActionRouter::new();
        register(&mut routes, &mut actions, &services);
        let handler = Arc::clone(actions.resolve(SEARCH_ACTION).unwrap());

        let (responder, mut rx) = ChannelResponder::channel();
        let mut params = quickserve_core::Params::new();
        params.insert("query".into(), "ada".into());
        let ctx = Context::builder(
            RequestMeta::socket(SEARCH_ACTION)
                .with_params(params)
                .with_server("api", "main"),
        )
        .build(responder);
        handler(ctx).await.unwrap();

        let body: Value = serde_json::from_slice(&rx.recv().await.unwrap().body).unwrap();
        assert_eq!(body["results"]["users"][0]["name"], "Ada");
        assert!(body["results"]["users"][0].get("password").is_none());
        assert!(body["results"].get("auth").is_none());
        assert!(routes.resolve(&http::Method::GET, SEARCH_PATH).is_some());
    }

    #[tokio::test]
    async fn test_search_requires_query() {
        let (responder, _rx) = ChannelResponder::channel();
        let ctx = Context::builder(RequestMeta::socket(SEARCH_ACTION).with_server("api", "main"))
            .build(responder);
        let err = search(&ctx, &DatabaseRegistry::new(), &EntityRegistry::new())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), http::StatusCode::BAD_REQUEST);
    }
}
