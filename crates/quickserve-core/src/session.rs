//! Request-scoped session state.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Identity and claims attached to a request after authentication.
///
/// A session is empty until the authentication stage verifies a bearer
/// token. It lives only as long as the request's [`Context`](crate::Context).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Name of the authenticated identity type, e.g. `"users"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    /// The access token the identity was resolved from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Decoded token claims.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub claims: Map<String, Value>,
}

impl Session {
    /// Returns `true` once an identity type is attached.
    pub fn is_authenticated(&self) -> bool {
        self.entity.is_some()
    }

    /// Returns the identity record embedded in the claims under the entity name.
    pub fn identity(&self) -> Option<&Value> {
        self.entity
            .as_deref()
            .and_then(|entity| self.claims.get(entity))
    }

    /// Clears every field, demoting the request to anonymous.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_identity_lookup() {
        let mut session = Session::default();
        assert!(!session.is_authenticated());
        assert!(session.identity().is_none());

        session.entity = Some("users".into());
        session
            .claims
            .insert("users".into(), json!({"id": "1", "email": "a@b.c"}));
        assert!(session.is_authenticated());
        assert_eq!(session.identity().unwrap()["email"], "a@b.c");

        session.clear();
        assert_eq!(session, Session::default());
    }
}
