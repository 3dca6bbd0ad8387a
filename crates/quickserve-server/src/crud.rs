//! Generated CRUD routes.
//!
//! Every exposed entity gets a collection and a member route over HTTP and
//! one action per operation over sockets. Inserts are validated in full,
//! updates only on the fields they carry. Responses always pass through the
//! entity's relation resolution and secure-field stripping.

use std::sync::Arc;

use http::StatusCode;
use quickserve_core::{
    handler, id_query, Context, Database, DatabaseRegistry, Entity, EntityRegistry, Handler,
    QuickError, QuickResult, Record, SharedDatabase,
};
use quickserve_router::{ActionRouter, Router};
use serde_json::{json, Value};

use crate::state::Services;

/// Parameter holding the token on socket messages; never used as a filter.
const TOKEN_PARAM: &str = "token";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    List,
    Get,
    Create,
    Update,
    Delete,
    BulkInsert,
    BulkUpdate,
    BulkDelete,
}

impl Operation {
    const ALL: [Self; 8] = [
        Self::List,
        Self::Get,
        Self::Create,
        Self::Update,
        Self::Delete,
        Self::BulkInsert,
        Self::BulkUpdate,
        Self::BulkDelete,
    ];

    const fn action_prefix(self) -> &'static str {
        match self {
            Self::List => "list_",
            Self::Get => "get_",
            Self::Create => "create_",
            Self::Update => "update_",
            Self::Delete => "delete_",
            Self::BulkInsert => "bulk_insert_",
            Self::BulkUpdate => "bulk_update_",
            Self::BulkDelete => "bulk_delete_",
        }
    }
}

struct Crud {
    entity: Arc<Entity>,
    databases: DatabaseRegistry,
    entities: Arc<EntityRegistry>,
}

/// Registers the routes and actions of `entity`.
///
/// Bulk routes are registered before the member route so `bulk-insert` is
/// never taken for an id.
pub fn register(
    routes: &mut Router<Handler>,
    actions: &mut ActionRouter<Handler>,
    entity: &Arc<Entity>,
    services: &Services,
) {
    let crud = Arc::new(Crud {
        entity: Arc::clone(entity),
        databases: services.databases.clone(),
        entities: Arc::clone(&services.entities),
    });
    let name = entity.name();
    let collection = format!("/{name}");
    let member = format!("/{name}/:id");

    routes
        .post(&format!("{collection}/bulk-insert"), crud.handler(Operation::BulkInsert))
        .put(&format!("{collection}/bulk-update"), crud.handler(Operation::BulkUpdate))
        .delete(&format!("{collection}/bulk-delete"), crud.handler(Operation::BulkDelete))
        .get(&collection, crud.handler(Operation::List))
        .post(&collection, crud.handler(Operation::Create))
        .get(&member, crud.handler(Operation::Get))
        .put(&member, crud.handler(Operation::Update))
        .patch(&member, crud.handler(Operation::Update))
        .delete(&member, crud.handler(Operation::Delete));

    for op in Operation::ALL {
        actions.action(format!("{}{name}", op.action_prefix()), crud.handler(op));
    }
    tracing::debug!(entity = %name, "CRUD routes registered");
}

impl Crud {
    fn handler(self: &Arc<Self>, op: Operation) -> Handler {
        let crud = Arc::clone(self);
        handler(move |ctx: Context| {
            let crud = Arc::clone(&crud);
            async move { crud.run(op, &ctx).await }
        })
    }

    async fn run(&self, op: Operation, ctx: &Context) -> QuickResult<()> {
        let db = self.databases.get(ctx.database())?;
        match op {
            Operation::List => self.list(ctx, db).await,
            Operation::Get => self.get(ctx, db).await,
            Operation::Create => self.create(ctx, db).await,
            Operation::Update => self.update(ctx, db).await,
            Operation::Delete => self.delete(ctx, db).await,
            Operation::BulkInsert => self.bulk_insert(ctx, db).await,
            Operation::BulkUpdate => self.bulk_update(ctx, db).await,
            Operation::BulkDelete => self.bulk_delete(ctx, db).await,
        }
    }

    fn table(&self) -> &str {
        self.entity.name()
    }

    fn id(ctx: &Context) -> QuickResult<String> {
        ctx.param_str("id")
            .ok_or_else(|| QuickError::bad_request("Missing id"))
    }

    fn check(&self, data: &Value, force: bool) -> QuickResult<()> {
        let report = self.entity.validate(data, force);
        if report.valid {
            Ok(())
        } else {
            Err(QuickError::validation(
                format!("Invalid {}", self.table()),
                report.errors,
            ))
        }
    }

    fn records(&self, ctx: &Context, force: bool) -> QuickResult<Vec<Record>> {
        let Value::Array(items) = ctx.body() else {
            return Err(QuickError::bad_request("Body must be an array"));
        };
        let mut errors = Vec::new();
        for (index, item) in items.iter().enumerate() {
            let report = self.entity.validate(item, force);
            errors.extend(report.errors.into_iter().map(|e| format!("[{index}] {e}")));
        }
        if !errors.is_empty() {
            return Err(QuickError::validation(format!("Invalid {}", self.table()), errors));
        }
        Ok(items.iter().filter_map(|item| item.as_object().cloned()).collect())
    }

    async fn present(&self, data: Value, db: &dyn Database) -> QuickResult<Value> {
        let data = self
            .entity
            .resolve_relations(data, db, &self.entities)
            .await?;
        Ok(self.entity.secure(data))
    }

    async fn existing(&self, db: &dyn Database, id: &str) -> QuickResult<Record> {
        db.find_one(self.table(), &id_query(id))
            .await?
            .ok_or_else(|| QuickError::not_found_resource(self.table(), id))
    }

    async fn list(&self, ctx: &Context, db: SharedDatabase) -> QuickResult<()> {
        let query: Record = ctx
            .params()
            .iter()
            .filter(|(name, _)| name.as_str() != TOKEN_PARAM)
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        let rows = db.get(self.table(), &query).await?;
        let data = Value::Array(rows.into_iter().map(Value::Object).collect());
        ctx.send(self.present(data, db.as_ref()).await?)
    }

    async fn get(&self, ctx: &Context, db: SharedDatabase) -> QuickResult<()> {
        let id = Self::id(ctx)?;
        let row = self.existing(db.as_ref(), &id).await?;
        ctx.send(self.present(Value::Object(row), db.as_ref()).await?)
    }

    async fn create(&self, ctx: &Context, db: SharedDatabase) -> QuickResult<()> {
        self.check(ctx.body(), true)?;
        let Value::Object(mut record) = ctx.body().clone() else {
            return Err(QuickError::bad_request("Body must be an object"));
        };
        record.remove("id");
        let id = db.insert(self.table(), record).await?;
        let row = db
            .find_one(self.table(), &id_query(id))
            .await?
            .ok_or_else(|| QuickError::internal("Inserted record could not be read back"))?;
        ctx.status(StatusCode::CREATED);
        ctx.send(self.present(Value::Object(row), db.as_ref()).await?)
    }

    async fn update(&self, ctx: &Context, db: SharedDatabase) -> QuickResult<()> {
        let id = Self::id(ctx)?;
        self.check(ctx.body(), false)?;
        let Value::Object(mut patch) = ctx.body().clone() else {
            return Err(QuickError::bad_request("Body must be an object"));
        };
        patch.remove("id");
        self.existing(db.as_ref(), &id).await?;

        db.update(self.table(), &id_query(id.as_str()), patch).await?;
        let row = self.existing(db.as_ref(), &id).await?;
        ctx.send(self.present(Value::Object(row), db.as_ref()).await?)
    }

    async fn delete(&self, ctx: &Context, db: SharedDatabase) -> QuickResult<()> {
        let id = Self::id(ctx)?;
        self.existing(db.as_ref(), &id).await?;
        db.delete(self.table(), &id_query(id.as_str())).await?;
        ctx.send(json!({ "id": id, "deleted": true }))
    }

    async fn bulk_insert(&self, ctx: &Context, db: SharedDatabase) -> QuickResult<()> {
        let mut records = self.records(ctx, true)?;
        for record in &mut records {
            record.remove("id");
        }
        let count = records.len();
        db.bulk_insert(self.table(), records).await?;
        ctx.status(StatusCode::CREATED);
        ctx.send(json!({ "count": count }))
    }

    async fn bulk_update(&self, ctx: &Context, db: SharedDatabase) -> QuickResult<()> {
        let records = self.records(ctx, false)?;
        let count = records.len();
        db.bulk_update(self.table(), records).await?;
        ctx.send(json!({ "count": count }))
    }

    async fn bulk_delete(&self, ctx: &Context, db: SharedDatabase) -> QuickResult<()> {
        let Value::Array(items) = ctx.body() else {
            return Err(QuickError::bad_request("Body must be an array"));
        };
        let records = items
            .iter()
            .map(|item| match item {
                Value::Object(record) => Ok(record.clone()),
                Value::String(_) | Value::Number(_) => Ok(id_query(item.clone())),
                _ => Err(QuickError::bad_request("Expected records or ids")),
            })
            .collect::<QuickResult<Vec<_>>>()?;
        let count = records.len();
        db.bulk_delete(self.table(), records).await?;
        ctx.send(json!({ "count": count }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;
    use quickserve_auth::AuthConfig;
    use quickserve_core::{
        ChannelResponder, EntityConfig, FieldSpec, FieldType, InMemoryDatabase, Reply,
        RequestMeta,
    };
    use tokio::sync::mpsc::UnboundedReceiver;

    struct Fixture {
        routes: Router<Handler>,
        db: Arc<InMemoryDatabase>,
    }

    fn fixture() -> Fixture {
        let db = Arc::new(InMemoryDatabase::new());
        let mut databases = DatabaseRegistry::new();
        databases.register("main", db.clone());

        let users = EntityConfig {
            name: "users".into(),
            alias: Some("people".into()),
            fields: [
                ("email".to_string(), FieldSpec::new(FieldType::String).required()),
                ("password".to_string(), FieldSpec::new(FieldType::String).secure()),
                ("team".to_string(), FieldSpec::new(FieldType::String).references("teams")),
            ]
            .into_iter()
            .collect(),
        };
        let teams = EntityConfig {
            name: "teams".into(),
            alias: None,
            fields: [("name".to_string(), FieldSpec::new(FieldType::String))]
                .into_iter()
                .collect(),
        };
        let services = Services::new(
            databases,
            EntityRegistry::from_configs([users, teams]),
            AuthConfig::default(),
        )
        .unwrap();

        let mut routes = Router::new();
        let mut actions = ActionRouter::new();
        for entity in services.entities.iter() {
            register(&mut routes, &mut actions, entity, &services);
        }
        Fixture { routes, db }
    }

    async fn call(
        fixture: &Fixture,
        method: Method,
        path: &str,
        body: Value,
    ) -> (QuickResult<()>, UnboundedReceiver<Reply>) {
        let matched = fixture.routes.resolve(&method, path).unwrap();
        let handler = Arc::clone(matched.handler());
        let params = matched
            .into_params()
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect();
        let (responder, rx) = ChannelResponder::channel();
        let ctx = Context::builder(
            RequestMeta::http(method, path)
                .with_params(params)
                .with_body(body)
                .with_server("api", "main"),
        )
        .build(responder);
        (handler(ctx).await, rx)
    }

    fn body(reply: &Reply) -> Value {
        serde_json::from_slice(&reply.body).unwrap()
    }

    #[tokio::test]
    async fn test_create_strips_secure_fields_and_resolves_references() {
        let fx = fixture();
        fx.db
            .insert(
                "teams",
                json!({"id": "t1", "name": "core"}).as_object().cloned().unwrap(),
            )
            .await
            .unwrap();

        let (result, mut rx) = call(
            &fx,
            Method::POST,
            "/users",
            json!({"email": "a@b.c", "password": "hunter2", "team": "t1"}),
        )
        .await;
        result.unwrap();

        let reply = rx.recv().await.unwrap();
        assert_eq!(reply.status, StatusCode::CREATED);
        let created = body(&reply);
        assert_eq!(created["email"], "a@b.c");
        assert!(created.get("password").is_none());
        assert_eq!(created["team"]["name"], "core");
        assert_eq!(fx.db.count("users"), 1);
    }

    #[tokio::test]
    async fn test_create_ignores_client_supplied_id() {
        let fx = fixture();
        fx.db
            .insert(
                "users",
                json!({"id": "u1", "email": "victim@b.c"}).as_object().cloned().unwrap(),
            )
            .await
            .unwrap();

        let (result, mut rx) = call(
            &fx,
            Method::POST,
            "/users",
            json!({"id": "u1", "email": "attacker@b.c", "password": "pw"}),
        )
        .await;
        result.unwrap();

        let created = body(&rx.recv().await.unwrap());
        assert_eq!(created["email"], "attacker@b.c");
        assert_ne!(created["id"], "u1");

        let victims = fx.db.get("users", &id_query("u1")).await.unwrap();
        assert_eq!(victims.len(), 1);
        assert_eq!(victims[0]["email"], "victim@b.c");
        assert_eq!(fx.db.count("users"), 2);
    }

    #[tokio::test]
    async fn test_bulk_insert_ignores_client_supplied_ids() {
        let fx = fixture();
        fx.db
            .insert(
                "users",
                json!({"id": "u1", "email": "victim@b.c"}).as_object().cloned().unwrap(),
            )
            .await
            .unwrap();

        let (result, _rx) = call(
            &fx,
            Method::POST,
            "/users/bulk-insert",
            json!([{"id": "u1", "email": "attacker@b.c"}]),
        )
        .await;
        result.unwrap();
        assert_eq!(fx.db.get("users", &id_query("u1")).await.unwrap().len(), 1);
        assert_eq!(fx.db.count("users"), 2);
    }

    #[tokio::test]
    async fn test_create_requires_fields() {
        let fx = fixture();
        let (result, _rx) = call(&fx, Method::POST, "/users", json!({"team": "t1"})).await;
        match result.unwrap_err() {
            QuickError::Validation { errors, .. } => {
                assert_eq!(errors, vec!["email is required".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(fx.db.count("users"), 0);
    }

    #[tokio::test]
    async fn test_partial_update_and_missing_record() {
        let fx = fixture();
        fx.db
            .insert(
                "users",
                json!({"id": "u1", "email": "a@b.c"}).as_object().cloned().unwrap(),
            )
            .await
            .unwrap();

        let (result, mut rx) =
            call(&fx, Method::PATCH, "/users/u1", json!({"email": "new@b.c"})).await;
        result.unwrap();
        assert_eq!(body(&rx.recv().await.unwrap())["email"], "new@b.c");

        let (result, _rx) = call(&fx, Method::GET, "/users/nope", Value::Null).await;
        assert_eq!(result.unwrap_err().status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_list_returns_every_row() {
        let fx = fixture();
        fx.db
            .bulk_insert(
                "users",
                vec![
                    json!({"id": "1", "email": "a@b.c"}).as_object().cloned().unwrap(),
                    json!({"id": "2", "email": "x@y.z"}).as_object().cloned().unwrap(),
                ],
            )
            .await
            .unwrap();

        let (result, mut rx) = call(&fx, Method::GET, "/users", Value::Null).await;
        result.unwrap();
        assert_eq!(body(&rx.recv().await.unwrap()).as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_bulk_routes_win_over_member_route() {
        let fx = fixture();
        let (result, mut rx) = call(
            &fx,
            Method::POST,
            "/users/bulk-insert",
            json!([{"email": "a@b.c"}, {"email": "d@e.f"}]),
        )
        .await;
        result.unwrap();
        assert_eq!(body(&rx.recv().await.unwrap())["count"], 2);

        let rows = fx.db.get("users", &Record::new()).await.unwrap();
        let first = rows[0]["id"].clone();
        let second = json!({"id": rows[1]["id"].clone()});
        let (result, _rx) = call(
            &fx,
            Method::DELETE,
            "/users/bulk-delete",
            json!([first, second]),
        )
        .await;
        result.unwrap();
        assert_eq!(fx.db.count("users"), 0);
    }

    #[tokio::test]
    async fn test_bulk_insert_reports_indexed_errors() {
        let fx = fixture();
        let (result, _rx) = call(
            &fx,
            Method::POST,
            "/users/bulk-insert",
            json!([{"email": "a@b.c"}, {"email": 5}]),
        )
        .await;
        match result.unwrap_err() {
            QuickError::Validation { errors, .. } => {
                assert_eq!(errors, vec!["[1] email must be of type string".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_delete_removes_record() {
        let fx = fixture();
        fx.db
            .insert(
                "users",
                json!({"id": "u1", "email": "a@b.c"}).as_object().cloned().unwrap(),
            )
            .await
            .unwrap();
        let (result, mut rx) = call(&fx, Method::DELETE, "/users/u1", Value::Null).await;
        result.unwrap();
        assert_eq!(body(&rx.recv().await.unwrap())["deleted"], true);
        assert_eq!(fx.db.count("users"), 0);
    }
}
