//! Path and action routing.
//!
//! Both routers are **first-match**: routes are tried in registration order
//! and the first one that matches wins, even when a later route would match
//! more specifically. Register specific routes before general ones.
//!
//! # Example
//!
//! ```rust
//! use quickserve_router::Router;
//! use http::Method;
//!
//! let mut router = Router::new();
//! router.route(Method::GET, "/a/:id", "param");
//! router.route(Method::GET, "/a/b", "literal");
//!
//! let m = router.resolve(&Method::GET, "/a/b").unwrap();
//! assert_eq!(*m.handler(), "param");
//! assert_eq!(m.params().get("id"), Some("b"));
//! ```

use crate::params::Params;
use crate::pattern::{join, Pattern};
use http::Method;

/// A resolved route.
#[derive(Debug)]
pub struct RouteMatch<'a, H> {
    handler: &'a H,
    params: Params,
    pattern: &'a Pattern,
}

impl<'a, H> RouteMatch<'a, H> {
    /// Returns the matched handler.
    pub fn handler(&self) -> &'a H {
        self.handler
    }

    /// Returns the captured parameters.
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Takes ownership of the captured parameters.
    pub fn into_params(self) -> Params {
        self.params
    }

    /// Returns the pattern that matched.
    pub fn pattern(&self) -> &'a str {
        self.pattern.as_str()
    }
}

#[derive(Debug, Clone)]
struct Route<H> {
    method: Method,
    pattern: Pattern,
    handler: H,
}

/// HTTP router keyed by method and path pattern.
#[derive(Debug, Clone)]
pub struct Router<H> {
    routes: Vec<Route<H>>,
}

impl<H> Default for Router<H> {
    fn default() -> Self {
        Self { routes: Vec::new() }
    }
}

impl<H> Router<H> {
    /// Creates an empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a route.
    pub fn route(&mut self, method: Method, pattern: &str, handler: H) -> &mut Self {
        self.routes.push(Route {
            method,
            pattern: Pattern::parse(pattern),
            handler,
        });
        self
    }

    /// Registers a `GET` route.
    pub fn get(&mut self, pattern: &str, handler: H) -> &mut Self {
        self.route(Method::GET, pattern, handler)
    }

    /// Registers a `POST` route.
    pub fn post(&mut self, pattern: &str, handler: H) -> &mut Self {
        self.route(Method::POST, pattern, handler)
    }

    /// Registers a `PUT` route.
    pub fn put(&mut self, pattern: &str, handler: H) -> &mut Self {
        self.route(Method::PUT, pattern, handler)
    }

    /// Registers a `PATCH` route.
    pub fn patch(&mut self, pattern: &str, handler: H) -> &mut Self {
        self.route(Method::PATCH, pattern, handler)
    }

    /// Registers a `DELETE` route.
    pub fn delete(&mut self, pattern: &str, handler: H) -> &mut Self {
        self.route(Method::DELETE, pattern, handler)
    }

    /// Registers every route added inside `f` under `prefix`.
    pub fn group(&mut self, prefix: &str, f: impl FnOnce(&mut Group<'_, H>)) -> &mut Self {
        let mut group = Group {
            router: &mut *self,
            prefix: prefix.to_string(),
        };
        f(&mut group);
        self
    }

    /// Resolves `path` for `method` to the first matching route.
    pub fn resolve(&self, method: &Method, path: &str) -> Option<RouteMatch<'_, H>> {
        self.routes
            .iter()
            .filter(|route| route.method == *method)
            .find_map(|route| {
                route.pattern.matches(path).map(|params| RouteMatch {
                    handler: &route.handler,
                    params,
                    pattern: &route.pattern,
                })
            })
    }

    /// Returns the methods registered for patterns matching `path`.
    pub fn allowed_methods(&self, path: &str) -> Vec<Method> {
        let mut methods: Vec<Method> = Vec::new();
        for route in &self.routes {
            if !methods.contains(&route.method) && route.pattern.matches(path).is_some() {
                methods.push(route.method.clone());
            }
        }
        methods
    }

    /// Iterates `(method, pattern)` pairs in registration order.
    pub fn routes(&self) -> impl Iterator<Item = (&Method, &str)> {
        self.routes
            .iter()
            .map(|route| (&route.method, route.pattern.as_str()))
    }

    /// Returns the number of registered routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns `true` if no route is registered.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// A set of routes sharing a prefix.
pub struct Group<'r, H> {
    router: &'r mut Router<H>,
    prefix: String,
}

impl<H> Group<'_, H> {
    /// Registers a route under the group prefix.
    pub fn route(&mut self, method: Method, pattern: &str, handler: H) -> &mut Self {
        self.router
            .route(method, &join(&self.prefix, pattern), handler);
        self
    }

    /// Registers a `GET` route under the group prefix.
    pub fn get(&mut self, pattern: &str, handler: H) -> &mut Self {
        self.route(Method::GET, pattern, handler)
    }

    /// Registers a `POST` route under the group prefix.
    pub fn post(&mut self, pattern: &str, handler: H) -> &mut Self {
        self.route(Method::POST, pattern, handler)
    }

    /// Registers a `PUT` route under the group prefix.
    pub fn put(&mut self, pattern: &str, handler: H) -> &mut Self {
        self.route(Method::PUT, pattern, handler)
    }

    /// Registers a `DELETE` route under the group prefix.
    pub fn delete(&mut self, pattern: &str, handler: H) -> &mut Self {
        self.route(Method::DELETE, pattern, handler)
    }
}

/// Router for message transports, keyed by a flat action string.
#[derive(Debug, Clone)]
pub struct ActionRouter<H> {
    actions: Vec<(String, H)>,
}

impl<H> Default for ActionRouter<H> {
    fn default() -> Self {
        Self {
            actions: Vec::new(),
        }
    }
}

impl<H> ActionRouter<H> {
    /// Creates an empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for `action`.
    pub fn action(&mut self, action: impl Into<String>, handler: H) -> &mut Self {
        self.actions.push((action.into(), handler));
        self
    }

    /// Returns the first handler registered for `action`.
    pub fn resolve(&self, action: &str) -> Option<&H> {
        self.actions
            .iter()
            .find(|(name, _)| name == action)
            .map(|(_, handler)| handler)
    }

    /// Iterates registered action names in registration order.
    pub fn actions(&self) -> impl Iterator<Item = &str> {
        self.actions.iter().map(|(name, _)| name.as_str())
    }

    /// Returns the number of registered actions.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Returns `true` if no action is registered.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_must_match() {
        let mut router = Router::new();
        router.get("/users", 1).post("/users", 2);

        assert_eq!(*router.resolve(&Method::GET, "/users").unwrap().handler(), 1);
        assert_eq!(*router.resolve(&Method::POST, "/users").unwrap().handler(), 2);
        assert!(router.resolve(&Method::DELETE, "/users").is_none());
    }

    #[test]
    fn test_group_prefix() {
        let mut router = Router::new();
        router.group("/system/", |g| {
            g.post("/auth", "login").post("/auth/refresh", "refresh");
        });

        let routes: Vec<_> = router.routes().map(|(_, p)| p.to_string()).collect();
        assert_eq!(routes, vec!["/system/auth", "/system/auth/refresh"]);
        assert_eq!(
            *router
                .resolve(&Method::POST, "/system/auth/refresh")
                .unwrap()
                .handler(),
            "refresh"
        );
    }

    #[test]
    fn test_allowed_methods() {
        let mut router = Router::new();
        router.get("/users/:id", ()).put("/users/:id", ()).get("/users/:id", ());
        assert_eq!(router.allowed_methods("/users/1"), vec![Method::GET, Method::PUT]);
        assert!(router.allowed_methods("/teams").is_empty());
    }

    #[test]
    fn test_action_router_first_match() {
        let mut router = ActionRouter::new();
        router.action("list_users", 1).action("list_users", 2);
        assert_eq!(router.resolve("list_users"), Some(&1));
        assert_eq!(router.resolve("get_users"), None);
        assert_eq!(router.len(), 2);
    }
}
