// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Entity data structure.
//!
//! The [`Entity`] is the record that flows between the primary store, the
//! cache and every secondary store. Each entity has a globally unique id, a
//! type tag, creation/update timestamps and an open attribute bag.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field names that live outside the attribute bag.
const ID_FIELD: &str = "id";
const TYPE_FIELD: &str = "type";
const CREATED_AT_FIELD: &str = "createdAt";
const UPDATED_AT_FIELD: &str = "updatedAt";

/// Current wall clock time in epoch millis.
#[must_use]
pub fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// A record held by a store.
///
/// Serialized camelCase with attributes flattened next to the fixed fields:
///
/// ```
/// use sync_orchestrator::Entity;
/// use serde_json::json;
///
/// let entity = Entity::new("issue")
///     .with_id("e1")
///     .with_attr("name", json!("Bug"));
///
/// let value = serde_json::to_value(&entity).unwrap();
/// assert_eq!(value["id"], "e1");
/// assert_eq!(value["type"], "issue");
/// assert_eq!(value["name"], "Bug");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    /// Globally unique id (empty until assigned)
    #[serde(default)]
    pub id: String,
    /// Type tag
    #[serde(rename = "type", default)]
    pub entity_type: String,
    /// Creation timestamp (epoch millis, 0 = unset)
    #[serde(default)]
    pub created_at: i64,
    /// Last update timestamp (epoch millis, 0 = unset)
    #[serde(default)]
    pub updated_at: i64,
    /// Open attribute bag
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl Entity {
    /// Create an entity with only a type tag. Id and timestamps are assigned on insert.
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            entity_type: entity_type.into(),
            created_at: 0,
            updated_at: 0,
            attributes: Map::new(),
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    #[must_use]
    pub fn with_attr(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Get an attribute by top-level key.
    pub fn attr(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Resolve a field for query evaluation.
    ///
    /// Fixed fields (`id`, `type`, `createdAt`, `updatedAt`) resolve first;
    /// anything else is looked up in the attribute bag, with `.` descending
    /// into nested objects.
    pub fn field(&self, path: &str) -> Option<Value> {
        match path {
            ID_FIELD => Some(Value::String(self.id.clone())),
            TYPE_FIELD => Some(Value::String(self.entity_type.clone())),
            CREATED_AT_FIELD => Some(Value::from(self.created_at)),
            UPDATED_AT_FIELD => Some(Value::from(self.updated_at)),
            _ => {
                let mut parts = path.split('.');
                let first = parts.next()?;
                let mut current = self.attributes.get(first)?;
                for part in parts {
                    current = current.as_object()?.get(part)?;
                }
                Some(current.clone())
            }
        }
    }

    /// Stamp id and timestamps where they are missing.
    pub fn ensure_identity(&mut self) {
        if self.id.is_empty() {
            self.id = uuid::Uuid::new_v4().to_string();
        }
        let now = now_millis();
        if self.created_at == 0 {
            self.created_at = now;
        }
        if self.updated_at == 0 {
            self.updated_at = self.created_at;
        }
    }

    /// Merge a patch into this entity.
    ///
    /// `id` is never overwritten. `type`, `createdAt` and `updatedAt` are
    /// applied when they carry a value of the right shape; every other key
    /// replaces the attribute of the same name.
    pub fn apply_patch(&mut self, patch: &Map<String, Value>) {
        for (key, value) in patch {
            match key.as_str() {
                ID_FIELD => {}
                TYPE_FIELD => {
                    if let Some(t) = value.as_str() {
                        self.entity_type = t.to_string();
                    }
                }
                CREATED_AT_FIELD => {
                    if let Some(ts) = value.as_i64() {
                        self.created_at = ts;
                    }
                }
                UPDATED_AT_FIELD => {
                    if let Some(ts) = value.as_i64() {
                        self.updated_at = ts;
                    }
                }
                _ => {
                    self.attributes.insert(key.clone(), value.clone());
                }
            }
        }
    }

    /// Render the whole entity as a patch map (fixed fields included).
    #[must_use]
    pub fn to_patch(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert(ID_FIELD.to_string(), Value::String(self.id.clone()));
        map.insert(TYPE_FIELD.to_string(), Value::String(self.entity_type.clone()));
        map.insert(CREATED_AT_FIELD.to_string(), Value::from(self.created_at));
        map.insert(UPDATED_AT_FIELD.to_string(), Value::from(self.updated_at));
        for (key, value) in &self.attributes {
            map.insert(key.clone(), value.clone());
        }
        map
    }
}
