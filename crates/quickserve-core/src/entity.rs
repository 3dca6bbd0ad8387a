//! The entity collaborator.
//!
//! An [`Entity`] describes the fields of one table: their types, which are
//! required, and which are secure (never returned to clients). Entities are
//! declared in configuration and collected into an [`EntityRegistry`] at
//! startup.

use crate::database::{id_query, Database};
use crate::error::QuickResult;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Type of an entity field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// UTF-8 string.
    String,
    /// Any JSON number.
    Number,
    /// `true` or `false`.
    Boolean,
    /// A file reference, stored as a string.
    File,
    /// A JSON object.
    Object,
    /// A JSON array.
    Array,
    /// The id of a record in another entity.
    Reference,
}

impl FieldType {
    /// Returns the lowercase type name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::File => "file",
            Self::Object => "object",
            Self::Array => "array",
            Self::Reference => "reference",
        }
    }

    fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String | Self::File => value.is_string(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
            Self::Reference => value.is_string() || value.is_number(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FieldSpecRepr {
    Short(FieldType),
    Full {
        #[serde(rename = "type")]
        kind: FieldType,
        #[serde(default)]
        required: bool,
        #[serde(default)]
        secure: bool,
        #[serde(default)]
        entity: Option<String>,
    },
}

/// Declaration of a single field.
///
/// Accepts either a bare type name (`"string"`) or a table with `type`,
/// `required`, `secure` and, for references, the target `entity`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "FieldSpecRepr")]
pub struct FieldSpec {
    /// Field type.
    #[serde(rename = "type")]
    pub kind: FieldType,
    /// Must be present on insert.
    pub required: bool,
    /// Stripped from every response.
    pub secure: bool,
    /// Target entity of a reference field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
}

impl FieldSpec {
    /// A plain optional field of `kind`.
    pub const fn new(kind: FieldType) -> Self {
        Self {
            kind,
            required: false,
            secure: false,
            entity: None,
        }
    }

    /// Marks the field required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Marks the field secure.
    pub fn secure(mut self) -> Self {
        self.secure = true;
        self
    }

    /// Makes the field reference `entity`.
    pub fn references(mut self, entity: impl Into<String>) -> Self {
        self.kind = FieldType::Reference;
        self.entity = Some(entity.into());
        self
    }
}

impl From<FieldSpecRepr> for FieldSpec {
    fn from(repr: FieldSpecRepr) -> Self {
        match repr {
            FieldSpecRepr::Short(kind) => Self::new(kind),
            FieldSpecRepr::Full {
                kind,
                required,
                secure,
                entity,
            } => Self {
                kind,
                required,
                secure,
                entity,
            },
        }
    }
}

/// Declaration of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntityConfig {
    /// Table name.
    pub name: String,
    /// Alternative name accepted by lookups.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Fields in declaration order.
    #[serde(default)]
    pub fields: IndexMap<String, FieldSpec>,
}

/// Outcome of [`Entity::validate`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    /// `true` when `errors` is empty.
    pub valid: bool,
    /// One message per failed rule.
    pub errors: Vec<String>,
}

/// A configured entity.
#[derive(Debug, Clone)]
pub struct Entity {
    config: EntityConfig,
}

impl Entity {
    /// Wraps a configuration.
    pub fn new(config: EntityConfig) -> Self {
        Self { config }
    }

    /// Returns the table name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Returns the alias, if any.
    pub fn alias(&self) -> Option<&str> {
        self.config.alias.as_deref()
    }

    /// Returns the field declarations.
    pub fn fields(&self) -> &IndexMap<String, FieldSpec> {
        &self.config.fields
    }

    /// Checks `data` against the field declarations.
    ///
    /// With `force` every required field must be present (inserts); without
    /// it only the fields present are checked (partial updates).
    pub fn validate(&self, data: &Value, force: bool) -> ValidationReport {
        let Some(object) = data.as_object() else {
            return ValidationReport {
                valid: false,
                errors: vec![format!("{} must be an object", self.name())],
            };
        };

        let mut errors = Vec::new();
        for (name, spec) in &self.config.fields {
            match object.get(name) {
                None | Some(Value::Null) => {
                    if force && spec.required {
                        errors.push(format!("{name} is required"));
                    }
                }
                Some(value) => {
                    if !spec.kind.accepts(value) {
                        errors.push(format!("{name} must be of type {}", spec.kind.as_str()));
                    } else if spec.secure && value.as_str().is_some_and(str::is_empty) {
                        errors.push(format!("{name} cannot be empty"));
                    }
                }
            }
        }

        for key in object.keys() {
            if key != "id" && !self.config.fields.contains_key(key) {
                errors.push(format!("{key} is not a valid field"));
            }
        }

        ValidationReport {
            valid: errors.is_empty(),
            errors,
        }
    }

    /// Removes secure fields from an object, or from every object in an array.
    pub fn secure(&self, data: Value) -> Value {
        match data {
            Value::Object(mut object) => {
                for (name, spec) in &self.config.fields {
                    if spec.secure {
                        object.remove(name);
                    }
                }
                Value::Object(object)
            }
            Value::Array(items) => Value::Array(items.into_iter().map(|item| self.secure(item)).collect()),
            other => other,
        }
    }

    /// Replaces reference ids with the referenced records.
    ///
    /// Referenced records are secured with their own entity. Ids that point
    /// nowhere are left untouched.
    pub async fn resolve_relations(
        &self,
        data: Value,
        db: &dyn Database,
        registry: &EntityRegistry,
    ) -> QuickResult<Value> {
        match data {
            Value::Array(items) => {
                let mut resolved = Vec::with_capacity(items.len());
                for item in items {
                    resolved.push(match item {
                        Value::Object(object) => self.resolve_object(object, db, registry).await?,
                        other => other,
                    });
                }
                Ok(Value::Array(resolved))
            }
            Value::Object(object) => self.resolve_object(object, db, registry).await,
            other => Ok(other),
        }
    }

    async fn resolve_object(
        &self,
        mut object: Map<String, Value>,
        db: &dyn Database,
        registry: &EntityRegistry,
    ) -> QuickResult<Value> {
        for (name, spec) in &self.config.fields {
            let Some(target) = spec.entity.as_deref() else {
                continue;
            };
            let Some(id) = object.get(name).filter(|v| v.is_string() || v.is_number()) else {
                continue;
            };
            if let Some(found) = db.find_one(target, &id_query(id.clone())).await? {
                let found = Value::Object(found);
                let found = match registry.get(target) {
                    Some(entity) => entity.secure(found),
                    None => found,
                };
                object.insert(name.clone(), found);
            }
        }
        Ok(Value::Object(object))
    }
}

/// All configured entities, addressable by name or alias.
#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    entities: IndexMap<String, Arc<Entity>>,
}

impl EntityRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from configuration.
    pub fn from_configs(configs: impl IntoIterator<Item = EntityConfig>) -> Self {
        let mut registry = Self::new();
        for config in configs {
            registry.register(Entity::new(config));
        }
        registry
    }

    /// Adds an entity. A later entity with the same name replaces the earlier one.
    pub fn register(&mut self, entity: Entity) {
        self.entities
            .insert(entity.name().to_string(), Arc::new(entity));
    }

    /// Looks an entity up by name, then by alias.
    pub fn get(&self, name: &str) -> Option<Arc<Entity>> {
        self.entities.get(name).cloned().or_else(|| {
            self.entities
                .values()
                .find(|entity| entity.alias() == Some(name))
                .cloned()
        })
    }

    /// Iterates entities in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Entity>> {
        self.entities.values()
    }

    /// Returns the number of entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` when no entity is registered.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
