//! Per-server request state.
//!
//! [`Services`] holds what every server of a process shares: databases,
//! entities and the auth engines. [`ServerState`] is one configured server:
//! its limits, its middleware pipeline and its two routers.

use std::sync::Arc;
use std::time::Duration;

use http::Method;
use quickserve_auth::{
    routes as auth_routes, AuthConfig, AuthenticationStage, Authenticator, AuthorizationStage,
    Authorizer, ServerPolicy,
};
use quickserve_config::{DatabaseKind, QuickServeConfig, ServerConfig, ServerKind};
use quickserve_core::{
    BuiltinSerializer, DatabaseRegistry, EntityRegistry, Handler, InMemoryDatabase,
    ResponseFormat, Serializer,
};
use quickserve_middleware::stages::{CorsConfig, CorsStage, LoggingStage};
use quickserve_middleware::{MiddlewareChain, Pipeline, Stage};
use quickserve_router::{ActionRouter, Router};

use crate::crud;
use crate::error::ServerResult;
use crate::search;

/// Collaborators shared by every server.
#[derive(Clone)]
pub struct Services {
    /// Databases by name.
    pub databases: DatabaseRegistry,
    /// Configured entities.
    pub entities: Arc<EntityRegistry>,
    /// Token engine, present when any strategy is configured.
    pub authenticator: Option<Arc<Authenticator>>,
    /// Permission engine.
    pub authorizer: Arc<Authorizer>,
    /// Body serializer.
    pub serializer: Arc<dyn Serializer>,
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("databases", &self.databases)
            .field("entities", &self.entities.len())
            .field("authenticator", &self.authenticator)
            .finish_non_exhaustive()
    }
}

impl Services {
    /// Builds databases, entities and auth engines from `config`.
    pub fn from_config(config: &QuickServeConfig) -> ServerResult<Self> {
        let mut databases = DatabaseRegistry::new();
        for db in &config.databases {
            match db.kind {
                DatabaseKind::InMemory => {
                    databases.register(db.name.clone(), Arc::new(InMemoryDatabase::new()));
                }
            }
            tracing::debug!(database = %db.name, kind = ?db.kind, "Database registered");
        }

        Self::new(databases, config.entity_registry(), config.auth.clone())
    }

    /// Builds services over already constructed databases.
    pub fn new(
        databases: DatabaseRegistry,
        entities: EntityRegistry,
        auth: AuthConfig,
    ) -> ServerResult<Self> {
        let entities = Arc::new(entities);
        let authorizer = Arc::new(Authorizer::new(auth.permissions.clone())?);
        let authenticator = auth.has_strategies().then(|| {
            Arc::new(Authenticator::new(
                Arc::new(auth),
                databases.clone(),
                Arc::clone(&entities),
            ))
        });

        Ok(Self {
            databases,
            entities,
            authenticator,
            authorizer,
            serializer: Arc::new(BuiltinSerializer),
        })
    }

    /// Replaces the authenticator, e.g. to plug in a provider client.
    #[must_use]
    pub fn with_authenticator(mut self, authenticator: Arc<Authenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }
}

/// One configured server.
pub struct ServerState {
    config: ServerConfig,
    base_path: String,
    database: String,
    timeout: Duration,
    body_limit: usize,
    serializer: Arc<dyn Serializer>,
    pipeline: Pipeline,
    routes: Router<Handler>,
    actions: ActionRouter<Handler>,
}

impl std::fmt::Debug for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerState")
            .field("name", &self.config.name)
            .field("kind", &self.config.kind)
            .field("base_path", &self.base_path)
            .field("stages", &self.pipeline.chain().stage_names())
            .field("routes", &self.routes.len())
            .field("actions", &self.actions.len())
            .finish_non_exhaustive()
    }
}

impl ServerState {
    /// Assembles the pipeline and routes for `config`.
    ///
    /// The chain runs CORS, logging, authentication (when configured) and
    /// authorization, in that order. File servers get no generated routes.
    pub fn new(config: ServerConfig, services: &Services) -> ServerResult<Self> {
        let timeout = config.request.timeout()?;
        let policy = ServerPolicy {
            file_server: config.kind == ServerKind::File,
            secure: config.secure,
        };

        let mut chain = MiddlewareChain::builder()
            .stage(CorsStage::new(CorsConfig::default().allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ])))
            .stage(LoggingStage);
        if let Some(auth) = &services.authenticator {
            chain = chain.stage(AuthenticationStage::new(Arc::clone(auth)));
        }
        let chain = chain
            .stage(AuthorizationStage::new(Arc::clone(&services.authorizer), policy))
            .build();

        let mut routes = Router::new();
        let mut actions = ActionRouter::new();
        if config.kind != ServerKind::File {
            if let Some(auth) = &services.authenticator {
                auth_routes::register_http(&mut routes, auth);
                auth_routes::register_socket(&mut actions, auth);
            }
            search::register(&mut routes, &mut actions, services);
            for entity in services.entities.iter() {
                if config.exposes(entity.name()) {
                    crud::register(&mut routes, &mut actions, entity, services);
                }
            }
        }

        let state = Self {
            base_path: config.base_path(),
            database: config.database.clone().unwrap_or_default(),
            timeout,
            body_limit: config.request.limit_bytes(),
            serializer: Arc::clone(&services.serializer),
            pipeline: Pipeline::new(chain),
            routes,
            actions,
            config,
        };
        tracing::debug!(state = ?state, "Server assembled");
        Ok(state)
    }

    /// Appends a stage after the built-in ones.
    pub fn add_stage(&mut self, stage: impl Stage) -> &mut Self {
        self.pipeline.add_stage(stage);
        self
    }

    /// Registers an HTTP route after the generated ones.
    pub fn route(&mut self, method: Method, pattern: &str, handler: Handler) -> &mut Self {
        self.routes.route(method, pattern, handler);
        self
    }

    /// Registers a socket action after the generated ones.
    pub fn action(&mut self, action: impl Into<String>, handler: Handler) -> &mut Self {
        self.actions.action(action, handler);
        self
    }

    /// Returns the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the server name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Returns the externally visible base path.
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Returns the bound database name.
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Returns the response format.
    pub fn format(&self) -> ResponseFormat {
        self.config.format
    }

    /// Returns the per-request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the maximum accepted body size in bytes.
    pub fn body_limit(&self) -> usize {
        self.body_limit
    }

    /// Returns the body serializer.
    pub fn serializer(&self) -> Arc<dyn Serializer> {
        Arc::clone(&self.serializer)
    }

    /// Returns the pipeline.
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Returns the HTTP router.
    pub fn routes(&self) -> &Router<Handler> {
        &self.routes
    }

    /// Returns the socket action router.
    pub fn actions(&self) -> &ActionRouter<Handler> {
        &self.actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickserve_core::{EntityConfig, FieldSpec, FieldType};

    fn config_with_entity() -> QuickServeConfig {
        let mut config = QuickServeConfig::default();
        config.entities.push(EntityConfig {
            name: "users".into(),
            alias: None,
            fields: [("email".to_string(), FieldSpec::new(FieldType::String).required())]
                .into_iter()
                .collect(),
        });
        config
    }

    #[test]
    fn test_rest_server_gets_generated_routes() {
        let config = config_with_entity();
        let services = Services::from_config(&config).unwrap();
        let state = ServerState::new(config.servers[0].clone(), &services).unwrap();

        assert!(state.routes().resolve(&Method::GET, "/users").is_some());
        assert!(state.routes().resolve(&Method::DELETE, "/users/7").is_some());
        assert!(state.routes().resolve(&Method::GET, "/system/search").is_some());
        assert!(state.actions().resolve("list_users").is_some());
        assert_eq!(
            state.pipeline().chain().stage_names(),
            vec!["cors", "logging", "authorization"]
        );
    }

    #[test]
    fn test_file_server_has_no_routes() {
        let config = config_with_entity();
        let services = Services::from_config(&config).unwrap();
        let mut server = config.servers[0].clone();
        server.kind = ServerKind::File;
        let state = ServerState::new(server, &services).unwrap();
        assert!(state.routes().is_empty());
        assert!(state.actions().is_empty());
    }

    #[test]
    fn test_unexposed_entity_is_not_routed() {
        let config = config_with_entity();
        let services = Services::from_config(&config).unwrap();
        let mut server = config.servers[0].clone();
        server.entities = Some(Vec::new());
        let state = ServerState::new(server, &services).unwrap();
        assert!(state.routes().resolve(&Method::GET, "/users").is_none());
    }
}
