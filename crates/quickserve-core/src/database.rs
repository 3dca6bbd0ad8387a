//! The database collaborator.
//!
//! QuickServe does not define storage semantics. Every storage engine is
//! reached through the uniform [`Database`] trait; [`InMemoryDatabase`] is
//! the reference implementation used by the `in-memory` database type and by
//! tests.

use crate::error::{QuickError, QuickResult};
use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// A stored row.
pub type Record = Map<String, Value>;

/// Uniform CRUD interface over a storage engine.
#[async_trait]
pub trait Database: Send + Sync + 'static {
    /// Inserts a record and returns its id. Fails if the id is already taken.
    async fn insert(&self, table: &str, record: Record) -> QuickResult<Value>;

    /// Returns every record whose fields equal all fields of `query`.
    async fn get(&self, table: &str, query: &Record) -> QuickResult<Vec<Record>>;

    /// Merges `patch` into every record matching `query`.
    async fn update(&self, table: &str, query: &Record, patch: Record) -> QuickResult<()>;

    /// Deletes every record matching `query`.
    async fn delete(&self, table: &str, query: &Record) -> QuickResult<()>;

    /// Inserts many records. Nothing is written if any id is already taken.
    async fn bulk_insert(&self, table: &str, records: Vec<Record>) -> QuickResult<()>;

    /// Updates many records, each matched by its `id` field.
    async fn bulk_update(&self, table: &str, records: Vec<Record>) -> QuickResult<()>;

    /// Deletes many records, each matched by its `id` field.
    async fn bulk_delete(&self, table: &str, records: Vec<Record>) -> QuickResult<()>;

    /// Full-text search across every table.
    async fn search(&self, term: &str) -> QuickResult<IndexMap<String, Vec<Record>>>;

    /// Convenience for `get` returning only the first match.
    async fn find_one(&self, table: &str, query: &Record) -> QuickResult<Option<Record>> {
        Ok(self.get(table, query).await?.into_iter().next())
    }
}

/// Shared handle to a database.
pub type SharedDatabase = Arc<dyn Database>;

/// Every configured database, addressable by name.
#[derive(Clone, Default)]
pub struct DatabaseRegistry {
    databases: IndexMap<String, SharedDatabase>,
}

impl std::fmt::Debug for DatabaseRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseRegistry")
            .field("databases", &self.databases.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl DatabaseRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `db` under `name`, replacing any previous database.
    pub fn register(&mut self, name: impl Into<String>, db: SharedDatabase) -> &mut Self {
        self.databases.insert(name.into(), db);
        self
    }

    /// Returns the database registered under `name`.
    pub fn get(&self, name: &str) -> QuickResult<SharedDatabase> {
        self.databases
            .get(name)
            .cloned()
            .ok_or_else(|| QuickError::internal(format!("Database '{name}' is not registered")))
    }

    /// Returns `true` if `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.databases.contains_key(name)
    }

    /// Returns the registered names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.databases.keys().map(String::as_str)
    }
}

/// Builds a query that matches a single `id`.
pub fn id_query(id: impl Into<Value>) -> Record {
    let mut query = Record::new();
    query.insert("id".into(), id.into());
    query
}

fn matches(record: &Record, query: &Record) -> bool {
    query
        .iter()
        .all(|(key, expected)| record.get(key).is_some_and(|actual| loosely_equal(actual, expected)))
}

/// Query values arrive as strings from URLs, so `"1"` must match `1`.
fn loosely_equal(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
            n.to_string() == *s
        }
        (Value::Bool(b), Value::String(s)) | (Value::String(s), Value::Bool(b)) => {
            b.to_string() == *s
        }
        _ => actual == expected,
    }
}

fn record_id(record: &Record) -> QuickResult<Value> {
    record
        .get("id")
        .filter(|id| !id.is_null())
        .cloned()
        .ok_or_else(|| QuickError::bad_request("Every record in a bulk operation needs an id"))
}

/// In-process database backed by a map of tables.
#[derive(Debug, Default)]
pub struct InMemoryDatabase {
    tables: RwLock<HashMap<String, Vec<Record>>>,
}

impl InMemoryDatabase {
    /// Creates an empty database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of rows in `table`.
    pub fn count(&self, table: &str) -> usize {
        self.tables.read().get(table).map_or(0, Vec::len)
    }

    fn insert_rows(&self, table: &str, records: Vec<Record>) -> QuickResult<Vec<Value>> {
        let mut tables = self.tables.write();
        let rows = tables.entry(table.to_string()).or_default();

        let mut prepared = Vec::with_capacity(records.len());
        for mut record in records {
            let id = match record.get("id") {
                Some(id) if !id.is_null() => id.clone(),
                _ => {
                    let id = Value::String(Uuid::now_v7().to_string());
                    record.insert("id".into(), id.clone());
                    id
                }
            };
            let taken = rows
                .iter()
                .chain(prepared.iter().map(|(_, row)| row))
                .any(|row| row.get("id").is_some_and(|existing| loosely_equal(existing, &id)));
            if taken {
                return Err(QuickError::bad_request(format!(
                    "A record with id {id} already exists in {table}"
                )));
            }
            prepared.push((id, record));
        }

        Ok(prepared
            .into_iter()
            .map(|(id, record)| {
                rows.push(record);
                id
            })
            .collect())
    }

    fn update_sync(&self, table: &str, query: &Record, patch: &Record) {
        if let Some(rows) = self.tables.write().get_mut(table) {
            for row in rows.iter_mut().filter(|row| matches(row, query)) {
                for (key, value) in patch {
                    row.insert(key.clone(), value.clone());
                }
            }
        }
    }

    fn delete_sync(&self, table: &str, query: &Record) {
        if let Some(rows) = self.tables.write().get_mut(table) {
            rows.retain(|row| !matches(row, query));
        }
    }
}

#[async_trait]
impl Database for InMemoryDatabase {
    async fn insert(&self, table: &str, record: Record) -> QuickResult<Value> {
        self.insert_rows(table, vec![record])?
            .pop()
            .ok_or_else(|| QuickError::internal("Insert produced no id"))
    }

    async fn get(&self, table: &str, query: &Record) -> QuickResult<Vec<Record>> {
        Ok(self
            .tables
            .read()
            .get(table)
            .map(|rows| rows.iter().filter(|row| matches(row, query)).cloned().collect())
            .unwrap_or_default())
    }

    async fn update(&self, table: &str, query: &Record, patch: Record) -> QuickResult<()> {
        self.update_sync(table, query, &patch);
        Ok(())
    }

    async fn delete(&self, table: &str, query: &Record) -> QuickResult<()> {
        self.delete_sync(table, query);
        Ok(())
    }

    async fn bulk_insert(&self, table: &str, records: Vec<Record>) -> QuickResult<()> {
        self.insert_rows(table, records)?;
        Ok(())
    }

    async fn bulk_update(&self, table: &str, records: Vec<Record>) -> QuickResult<()> {
        let ids = records.iter().map(record_id).collect::<QuickResult<Vec<_>>>()?;
        for (id, record) in ids.into_iter().zip(records) {
            self.update_sync(table, &id_query(id), &record);
        }
        Ok(())
    }

    async fn bulk_delete(&self, table: &str, records: Vec<Record>) -> QuickResult<()> {
        let ids = records.iter().map(record_id).collect::<QuickResult<Vec<_>>>()?;
        for id in ids {
            self.delete_sync(table, &id_query(id));
        }
        Ok(())
    }

    async fn search(&self, term: &str) -> QuickResult<IndexMap<String, Vec<Record>>> {
        let needle = term.to_lowercase();
        let tables = self.tables.read();
        let mut names: Vec<&String> = tables.keys().collect();
        names.sort();

        let mut results = IndexMap::new();
        for name in names {
            let hits: Vec<Record> = tables[name]
                .iter()
                .filter(|row| {
                    row.values().any(|value| {
                        value
                            .as_str()
                            .is_some_and(|s| s.to_lowercase().contains(&needle))
                    })
                })
                .cloned()
                .collect();
            if !hits.is_empty() {
                results.insert(name.clone(), hits);
            }
        }
        Ok(results)
    }
}
