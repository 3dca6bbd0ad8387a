//! Persisted auth records.
//!
//! One [`AuthRecord`] is written to the `auth` table on every successful
//! login or code exchange and looked up by access token on every
//! authenticated request. Refreshes overwrite the record in place.

use crate::error::AuthResult;
use chrono::{DateTime, Utc};
use quickserve_core::{Database, QuickError, Record};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Table auth records live in.
pub const AUTH_TABLE: &str = "auth";

/// Which strategy issued a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// Shared-secret login.
    Jwt,
    /// Delegated provider exchange.
    Oauth,
}

/// A persisted login.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRecord {
    /// Id of the authenticated identity.
    pub user_id: Value,
    /// Issuing strategy.
    pub strategy: StrategyKind,
    /// Provider name for delegated logins.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
    /// Current access token.
    pub access_token: String,
    /// Refresh token: the provider's when it issued one, otherwise the local one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// When the record was written.
    pub created_at: DateTime<Utc>,
    /// When the access token expires.
    pub expires_at: DateTime<Utc>,
    /// When the refresh token expires, if there is one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_expires_at: Option<DateTime<Utc>>,
}

impl AuthRecord {
    /// Converts the record to a storage row.
    pub fn to_row(&self) -> AuthResult<Record> {
        match serde_json::to_value(self).map_err(QuickError::from)? {
            Value::Object(row) => Ok(row),
            _ => Err(QuickError::internal("Auth record did not serialize to an object").into()),
        }
    }

    /// Reads a record from a storage row. Extra columns such as `id` are ignored.
    pub fn from_row(row: Record) -> AuthResult<Self> {
        Ok(serde_json::from_value(Value::Object(row)).map_err(QuickError::from)?)
    }
}

fn query(field: &str, token: &str) -> Record {
    let mut query = Record::new();
    query.insert(field.into(), Value::String(token.to_string()));
    query
}

/// Inserts `record`.
pub async fn save(db: &dyn Database, record: &AuthRecord) -> AuthResult<()> {
    db.insert(AUTH_TABLE, record.to_row()?).await?;
    Ok(())
}

/// Finds the record holding `token` as access token.
pub async fn find_by_access_token(db: &dyn Database, token: &str) -> AuthResult<Option<AuthRecord>> {
    find(db, "accessToken", token).await
}

/// Finds the record holding `token` as refresh token.
pub async fn find_by_refresh_token(db: &dyn Database, token: &str) -> AuthResult<Option<AuthRecord>> {
    find(db, "refreshToken", token).await
}

async fn find(db: &dyn Database, field: &str, token: &str) -> AuthResult<Option<AuthRecord>> {
    db.find_one(AUTH_TABLE, &query(field, token))
        .await?
        .map(AuthRecord::from_row)
        .transpose()
}

/// Overwrites the record whose access token is `access_token`.
pub async fn replace_by_access_token(
    db: &dyn Database,
    access_token: &str,
    record: &AuthRecord,
) -> AuthResult<()> {
    db.update(AUTH_TABLE, &query("accessToken", access_token), record.to_row()?)
        .await?;
    Ok(())
}

/// Overwrites the record whose refresh token is `refresh_token`.
pub async fn replace_by_refresh_token(
    db: &dyn Database,
    refresh_token: &str,
    record: &AuthRecord,
) -> AuthResult<()> {
    db.update(AUTH_TABLE, &query("refreshToken", refresh_token), record.to_row()?)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickserve_core::InMemoryDatabase;
    use serde_json::json;

    fn record(access: &str, refresh: Option<&str>) -> AuthRecord {
        AuthRecord {
            user_id: json!("u1"),
            strategy: StrategyKind::Oauth,
            client: Some("google".into()),
            access_token: access.into(),
            refresh_token: refresh.map(Into::into),
            created_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            expires_at: DateTime::from_timestamp(1_700_043_200, 0).unwrap(),
            refresh_expires_at: None,
        }
    }

    #[test]
    fn test_row_uses_camel_case() {
        let row = record("a", Some("r")).to_row().unwrap();
        assert_eq!(row["accessToken"], "a");
        assert_eq!(row["refreshToken"], "r");
        assert_eq!(row["strategy"], "oauth");
        assert!(row.contains_key("expiresAt"));
        assert!(!row.contains_key("refreshExpiresAt"));
    }

    #[tokio::test]
    async fn test_save_find_replace() {
        let db = InMemoryDatabase::new();
        save(&db, &record("a", Some("r"))).await.unwrap();

        let found = find_by_access_token(&db, "a").await.unwrap().unwrap();
        assert_eq!(found, record("a", Some("r")));
        assert!(find_by_refresh_token(&db, "r").await.unwrap().is_some());

        replace_by_access_token(&db, "a", &record("b", Some("r2")))
            .await
            .unwrap();
        assert!(find_by_access_token(&db, "a").await.unwrap().is_none());
        assert!(find_by_access_token(&db, "b").await.unwrap().is_some());
        assert_eq!(db.count(AUTH_TABLE), 1);
    }
}
