//! Role-based authorization.
//!
//! Decisions are made once per request, after authentication, in this order:
//!
//! 1. Requests to a file server that is not secured are allowed.
//! 2. Whitelisted paths and system routes are allowed.
//! 3. The method (or, for sockets, the action prefix) selects the actions
//!    the request needs.
//! 4. The `default` rules grant those actions to everyone under `*`, or to
//!    the session's identity type under its name.
//! 5. The identity type's own rules grant them under `*`, or under any role
//!    key that occurs in the request path.
//! 6. Everything else is forbidden.

use crate::config::{Action, PermissionsConfig, ANY_ROLE};
use crate::error::{AuthError, AuthResult};
use http::Method;
use quickserve_core::{BoxFuture, Context, QuickError, QuickResult, Transport};
use quickserve_middleware::Stage;
use quickserve_telemetry::metrics::record_authz_decision;
use regex::Regex;
use std::sync::Arc;

/// Path prefix of HTTP system routes.
pub const SYSTEM_PATH_PREFIX: &str = "/system";

/// Prefix of socket system actions.
pub const SYSTEM_ACTION_PREFIX: &str = "system_";

/// Message of the response written on denial.
pub const FORBIDDEN_MESSAGE: &str = "Forbidden";

/// Why a request was allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grant {
    /// Unsecured file server.
    FileServer,
    /// Whitelisted path.
    Whitelisted,
    /// System route.
    SystemRoute,
    /// Granted by the default rules.
    Default,
    /// Granted by the identity type's rules.
    Role,
}

impl Grant {
    /// Returns a stable label for logs and metrics.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::FileServer => "file_server",
            Self::Whitelisted => "whitelisted",
            Self::SystemRoute => "system_route",
            Self::Default => "default",
            Self::Role => "role",
        }
    }
}

/// An authorization decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The request may proceed.
    Allow(Grant),
    /// The request is forbidden.
    Deny,
}

impl Decision {
    /// Returns `true` for [`Decision::Allow`].
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow(_))
    }
}

/// Properties of the server a request arrived on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerPolicy {
    /// The server serves static files.
    pub file_server: bool,
    /// The server requires authorization even for files.
    pub secure: bool,
}

/// What a request wants to do.
#[derive(Debug, Clone)]
pub struct AccessRequest<'a> {
    /// Originating transport.
    pub transport: Transport,
    /// HTTP path or socket action.
    pub path: &'a str,
    /// HTTP method, or the method implied by the socket action.
    pub method: Method,
    /// Authenticated identity type, if any.
    pub entity: Option<String>,
}

impl<'a> AccessRequest<'a> {
    /// Describes the request behind `ctx`.
    pub fn from_context(ctx: &'a Context) -> Self {
        let (path, method) = match ctx.transport() {
            Transport::Http => (
                ctx.url(),
                ctx.method().cloned().unwrap_or(Method::GET),
            ),
            Transport::Socket => {
                let action = ctx.action().unwrap_or_default();
                (action, method_for_action(action))
            }
        };
        Self {
            transport: ctx.transport(),
            path,
            method,
            entity: ctx.with_session(|session| session.entity.clone()),
        }
    }
}

/// Returns the HTTP method a socket action stands for.
///
/// Unknown prefixes read as `GET`.
pub fn method_for_action(action: &str) -> Method {
    const PREFIXES: [(&str, Method); 10] = [
        ("get_", Method::GET),
        ("list_", Method::GET),
        ("search_", Method::GET),
        ("create_", Method::POST),
        ("bulk_insert_", Method::POST),
        ("update_", Method::PUT),
        ("bulk_update_", Method::PUT),
        ("delete_", Method::DELETE),
        ("bulk_delete_", Method::DELETE),
        ("insert_", Method::POST),
    ];
    PREFIXES
        .iter()
        .find(|(prefix, _)| action.starts_with(prefix))
        .map_or(Method::GET, |(_, method)| method.clone())
}

fn whitelist_regex(pattern: &str) -> AuthResult<Regex> {
    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    Regex::new(&format!("^{body}$"))
        .map_err(|e| AuthError::InvalidConfig(format!("invalid whitelist pattern '{pattern}': {e}")))
}

/// Evaluates permission rules.
#[derive(Debug, Clone)]
pub struct Authorizer {
    whitelist: Vec<Regex>,
    permissions: PermissionsConfig,
}

impl Authorizer {
    /// Compiles the whitelist of `permissions`.
    pub fn new(permissions: PermissionsConfig) -> AuthResult<Self> {
        let whitelist = permissions
            .whitelist
            .iter()
            .map(|pattern| whitelist_regex(pattern))
            .collect::<AuthResult<Vec<_>>>()?;
        Ok(Self {
            whitelist,
            permissions,
        })
    }

    /// Decides whether `request` may proceed on a server with `policy`.
    pub fn decide(&self, policy: ServerPolicy, request: &AccessRequest<'_>) -> Decision {
        if policy.file_server && !policy.secure {
            return Decision::Allow(Grant::FileServer);
        }
        if self.whitelist.iter().any(|re| re.is_match(request.path)) {
            return Decision::Allow(Grant::Whitelisted);
        }
        if is_system(request.transport, request.path) {
            return Decision::Allow(Grant::SystemRoute);
        }

        let actions = Action::for_method(&request.method);
        let entity = request.entity.as_deref();

        let default_grants = [Some(ANY_ROLE), entity]
            .into_iter()
            .flatten()
            .filter_map(|role| self.permissions.default.get(role))
            .any(|set| set.allows_any(actions));
        if default_grants {
            return Decision::Allow(Grant::Default);
        }

        if let Some(roles) = entity.and_then(|e| self.permissions.entities.get(e)) {
            let granted = roles.iter().any(|(role, set)| {
                (role == ANY_ROLE || request.path.contains(role.as_str())) && set.allows_any(actions)
            });
            if granted {
                return Decision::Allow(Grant::Role);
            }
        }

        Decision::Deny
    }
}

/// `/system` and its subpaths over HTTP, `system_*` actions over sockets.
fn is_system(transport: Transport, path: &str) -> bool {
    match transport {
        Transport::Http => path
            .strip_prefix(SYSTEM_PATH_PREFIX)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/')),
        Transport::Socket => path.starts_with(SYSTEM_ACTION_PREFIX),
    }
}

/// Stage that rejects requests the [`Authorizer`] denies.
#[derive(Debug, Clone)]
pub struct AuthorizationStage {
    authorizer: Arc<Authorizer>,
    policy: ServerPolicy,
}

impl AuthorizationStage {
    /// Creates the stage for a server with `policy`.
    pub fn new(authorizer: Arc<Authorizer>, policy: ServerPolicy) -> Self {
        Self { authorizer, policy }
    }
}

impl Stage for AuthorizationStage {
    fn name(&self) -> &'static str {
        "authorization"
    }

    fn run<'a>(&'a self, ctx: &'a Context) -> BoxFuture<'a, QuickResult<()>> {
        Box::pin(async move {
            let request = AccessRequest::from_context(ctx);
            match self.authorizer.decide(self.policy, &request) {
                Decision::Allow(grant) => {
                    record_authz_decision(true, grant.as_str());
                    tracing::trace!(request_id = %ctx.id(), grant = grant.as_str(), "Authorized");
                    Ok(())
                }
                Decision::Deny => {
                    record_authz_decision(false, "no_permission");
                    tracing::debug!(
                        request_id = %ctx.id(),
                        path = request.path,
                        entity = request.entity.as_deref().unwrap_or("-"),
                        "Forbidden"
                    );
                    Err(QuickError::forbidden(FORBIDDEN_MESSAGE))
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ActionSet;
    use indexmap::IndexMap;

    fn permissions() -> PermissionsConfig {
        PermissionsConfig {
            whitelist: vec!["/public/*".into(), "/health".into()],
            default: IndexMap::from([(
                ANY_ROLE.to_string(),
                ActionSet {
                    list: true,
                    ..ActionSet::default()
                },
            )]),
            entities: IndexMap::from([(
                "users".to_string(),
                IndexMap::from([
                    (
                        "posts".to_string(),
                        ActionSet {
                            insert: true,
                            ..ActionSet::default()
                        },
                    ),
                    (
                        ANY_ROLE.to_string(),
                        ActionSet {
                            get: true,
                            ..ActionSet::default()
                        },
                    ),
                ]),
            )]),
        }
    }

    fn http<'a>(method: Method, path: &'a str, entity: Option<&str>) -> AccessRequest<'a> {
        AccessRequest {
            transport: Transport::Http,
            path,
            method,
            entity: entity.map(Into::into),
        }
    }

    fn restricted() -> PermissionsConfig {
        PermissionsConfig {
            default: IndexMap::new(),
            ..permissions()
        }
    }

    #[test]
    fn test_whitelist_and_system() {
        let authz = Authorizer::new(restricted()).unwrap();
        let policy = ServerPolicy::default();
        assert_eq!(
            authz.decide(policy, &http(Method::DELETE, "/public/a/b", None)),
            Decision::Allow(Grant::Whitelisted)
        );
        assert_eq!(
            authz.decide(policy, &http(Method::GET, "/health", None)),
            Decision::Allow(Grant::Whitelisted)
        );
        assert_eq!(
            authz.decide(policy, &http(Method::GET, "/healthz", None)),
            Decision::Deny
        );
        assert_eq!(
            authz.decide(policy, &http(Method::POST, "/system/auth", None)),
            Decision::Allow(Grant::SystemRoute)
        );
    }

    #[test]
    fn test_system_prefix_stops_at_segment_boundary() {
        let authz = Authorizer::new(restricted()).unwrap();
        let policy = ServerPolicy::default();
        assert_eq!(
            authz.decide(policy, &http(Method::GET, "/system", None)),
            Decision::Allow(Grant::SystemRoute)
        );
        assert_eq!(
            authz.decide(policy, &http(Method::GET, "/system/search", None)),
            Decision::Allow(Grant::SystemRoute)
        );
        for path in ["/systems", "/systems/1", "/systemstatus"] {
            assert_eq!(
                authz.decide(policy, &http(Method::DELETE, path, None)),
                Decision::Deny,
                "{path}"
            );
        }
    }

    #[test]
    fn test_whitelist_escapes_regex_metacharacters() {
        let authz = Authorizer::new(PermissionsConfig {
            whitelist: vec!["/v1.0/*".into()],
            ..restricted()
        })
        .unwrap();
        let policy = ServerPolicy::default();
        assert!(authz.decide(policy, &http(Method::GET, "/v1.0/x", None)).is_allowed());
        assert!(!authz.decide(policy, &http(Method::GET, "/v1x0/x", None)).is_allowed());
    }

    #[test]
    fn test_file_server_bypass() {
        let authz = Authorizer::new(restricted()).unwrap();
        let request = http(Method::GET, "/assets/app.js", None);
        let open = ServerPolicy {
            file_server: true,
            secure: false,
        };
        let secured = ServerPolicy {
            file_server: true,
            secure: true,
        };
        assert_eq!(authz.decide(open, &request), Decision::Allow(Grant::FileServer));
        assert_eq!(authz.decide(secured, &request), Decision::Deny);
    }

    #[test]
    fn test_default_rules() {
        let authz = Authorizer::new(permissions()).unwrap();
        let policy = ServerPolicy::default();
        assert_eq!(
            authz.decide(policy, &http(Method::GET, "/users", None)),
            Decision::Allow(Grant::Default)
        );
        assert_eq!(
            authz.decide(policy, &http(Method::DELETE, "/users/1", None)),
            Decision::Deny
        );
    }

    #[test]
    fn test_role_rules_match_path_substring() {
        let authz = Authorizer::new(restricted()).unwrap();
        let policy = ServerPolicy::default();
        assert_eq!(
            authz.decide(policy, &http(Method::POST, "/posts", Some("users"))),
            Decision::Allow(Grant::Role)
        );
        assert_eq!(
            authz.decide(policy, &http(Method::POST, "/comments", Some("users"))),
            Decision::Deny
        );
        assert_eq!(
            authz.decide(policy, &http(Method::GET, "/comments/1", Some("users"))),
            Decision::Allow(Grant::Role)
        );
        assert_eq!(
            authz.decide(policy, &http(Method::POST, "/posts", Some("admins"))),
            Decision::Deny
        );
    }

    #[test]
    fn test_socket_actions() {
        assert_eq!(method_for_action("list_users"), Method::GET);
        assert_eq!(method_for_action("bulk_insert_users"), Method::POST);
        assert_eq!(method_for_action("bulk_update_users"), Method::PUT);
        assert_eq!(method_for_action("delete_users"), Method::DELETE);
        assert_eq!(method_for_action("ping"), Method::GET);

        let authz = Authorizer::new(restricted()).unwrap();
        let request = AccessRequest {
            transport: Transport::Socket,
            path: "system_auth_jwt",
            method: Method::GET,
            entity: None,
        };
        assert_eq!(
            authz.decide(ServerPolicy::default(), &request),
            Decision::Allow(Grant::SystemRoute)
        );
    }
}
