//! Stored documents and typed model access

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use indexmap::IndexMap;

use crate::core::meta::{FieldKind, Meta};

/// Key under which the document id is addressed in filters and sort keys
pub const ID_KEY: &str = "_id";

/// A stored document: an id plus values keyed by store key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: Uuid,
    #[serde(default)]
    pub fields: IndexMap<String, Value>,
}

impl Record {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            fields: IndexMap::new(),
        }
    }

    /// Zero value record for `meta` with a fresh id
    ///
    /// Every stored field is present: attributes carry their default or
    /// `null`, to-one keys are `null` and to-many keys are empty lists.
    pub fn zero(meta: &Meta) -> Self {
        let mut record = Self::new(Uuid::new_v4());
        for field in &meta.fields {
            let value = match &field.kind {
                FieldKind::Attribute(_) => field.default.clone().unwrap_or(Value::Null),
                FieldKind::ToOne { .. } => Value::Null,
                FieldKind::ToMany { .. } => Value::Array(Vec::new()),
                FieldKind::HasOne { .. } | FieldKind::HasMany { .. } => continue,
            };
            record.fields.insert(field.store_key.clone(), value);
        }
        record
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Value under a store key, `_id` yields the id as a string
    pub fn value(&self, key: &str) -> Option<Value> {
        if key == ID_KEY {
            return Some(Value::String(self.id.to_string()));
        }
        self.fields.get(key).cloned()
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.fields.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.shift_remove(key)
    }

    /// Ids referenced under `key`, whether stored as a single id or a list
    pub fn ids(&self, key: &str) -> Vec<Uuid> {
        match self.fields.get(key) {
            Some(Value::String(s)) => Uuid::parse_str(s).into_iter().collect(),
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str())
                .filter_map(|s| Uuid::parse_str(s).ok())
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Single referenced id under `key`
    pub fn reference(&self, key: &str) -> Option<Uuid> {
        self.fields
            .get(key)
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
    }

    /// Keep only the given keys
    pub fn project(&self, keys: &[String]) -> Self {
        Self {
            id: self.id,
            fields: self
                .fields
                .iter()
                .filter(|(k, _)| keys.contains(k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    /// Decode into a typed model
    ///
    /// The model sees the document as a flat object whose `id` key holds the
    /// record id.
    pub fn decode<M: DeserializeOwned>(&self) -> Result<M, serde_json::Error> {
        let mut object = Map::with_capacity(self.fields.len() + 1);
        object.insert("id".to_string(), Value::String(self.id.to_string()));
        for (key, value) in &self.fields {
            object.insert(key.clone(), value.clone());
        }
        serde_json::from_value(Value::Object(object))
    }

    /// Encode a typed model, which must serialize to an object with an `id`
    pub fn encode<M: Serialize>(model: &M) -> Result<Self, serde_json::Error> {
        use serde::de::Error as _;

        let Value::Object(mut object) = serde_json::to_value(model)? else {
            return Err(serde_json::Error::custom("model must serialize to an object"));
        };
        let id = object
            .remove("id")
            .ok_or_else(|| serde_json::Error::custom("model has no id"))?;
        let id: Uuid = serde_json::from_value(id)?;
        Ok(Self {
            id,
            fields: object.into_iter().collect(),
        })
    }
}

/// A typed model bound to resource metadata
///
/// Field names of the serialized struct are store keys.
///
/// ```rust,ignore
/// #[derive(Serialize, Deserialize)]
/// struct Post {
///     id: Uuid,
///     title: String,
///     author_id: Option<Uuid>,
/// }
///
/// impl Model for Post {
///     fn meta() -> Meta {
///         Meta::new("posts")
///             .field(Field::attribute("title", AttrType::String))
///             .field(Field::optional_to_one("author", "users").store_key("author_id"))
///     }
/// }
/// ```
pub trait Model: Serialize + DeserializeOwned + Send + Sync + 'static {
    fn meta() -> Meta;
}
