//! Resource metadata: the declared fields of a resource and how they map to
//! the wire and to the store

use chrono::DateTime;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;

use crate::core::error::ConfigError;

/// Type of an attribute value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttrType {
    String,
    Integer,
    Float,
    Boolean,
    /// RFC 3339 timestamp stored as a string
    Timestamp,
    /// Any JSON value
    Any,
}

impl AttrType {
    /// Check a wire value against this type
    ///
    /// `null` is accepted by every type.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) | (AttrType::Any, _) => true,
            (AttrType::String, Value::String(_)) => true,
            (AttrType::Integer, Value::Number(n)) => n.is_i64() || n.is_u64(),
            (AttrType::Float, Value::Number(_)) => true,
            (AttrType::Boolean, Value::Bool(_)) => true,
            (AttrType::Timestamp, Value::String(s)) => DateTime::parse_from_rfc3339(s).is_ok(),
            _ => false,
        }
    }

    /// Parse a single filter token into a value of this type
    pub fn parse_token(&self, token: &str) -> Option<Value> {
        match self {
            AttrType::String | AttrType::Any => Some(Value::String(token.to_string())),
            AttrType::Integer => token.parse::<i64>().ok().map(Value::from),
            AttrType::Float => token.parse::<f64>().ok().map(Value::from),
            AttrType::Boolean => match token {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            AttrType::Timestamp => DateTime::parse_from_rfc3339(token)
                .ok()
                .map(|_| Value::String(token.to_string())),
        }
    }
}

impl fmt::Display for AttrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttrType::String => "string",
            AttrType::Integer => "integer",
            AttrType::Float => "number",
            AttrType::Boolean => "boolean",
            AttrType::Timestamp => "timestamp",
            AttrType::Any => "any",
        };
        f.write_str(name)
    }
}

/// What a field is: an attribute or a relationship with a cardinality
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Attribute(AttrType),
    /// Stored foreign key
    ToOne { target: String, optional: bool },
    /// Stored list of foreign keys
    ToMany { target: String },
    /// Derived from the inverse to-one/to-many of the target, at most one hit
    HasOne { target: String, inverse: String },
    /// Derived from the inverse to-one/to-many of the target
    HasMany { target: String, inverse: String },
}

/// Field descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Name used in whitelists
    pub name: String,
    /// Name on the wire
    pub json_key: String,
    /// Key in the stored document
    pub store_key: String,
    pub kind: FieldKind,
    pub filterable: bool,
    pub sortable: bool,
    /// Value applied to new records
    pub default: Option<Value>,
}

impl Field {
    fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        let name = name.into();
        Self {
            json_key: name.clone(),
            store_key: name.clone(),
            name,
            kind,
            filterable: false,
            sortable: false,
            default: None,
        }
    }

    pub fn attribute(name: impl Into<String>, ty: AttrType) -> Self {
        Self::new(name, FieldKind::Attribute(ty))
    }

    /// Required to-one relationship
    pub fn to_one(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(
            name,
            FieldKind::ToOne {
                target: target.into(),
                optional: false,
            },
        )
    }

    pub fn optional_to_one(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(
            name,
            FieldKind::ToOne {
                target: target.into(),
                optional: true,
            },
        )
    }

    pub fn to_many(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(
            name,
            FieldKind::ToMany {
                target: target.into(),
            },
        )
    }

    /// `inverse` names the to-one or to-many field of `target` pointing back
    pub fn has_one(
        name: impl Into<String>,
        target: impl Into<String>,
        inverse: impl Into<String>,
    ) -> Self {
        Self::new(
            name,
            FieldKind::HasOne {
                target: target.into(),
                inverse: inverse.into(),
            },
        )
    }

    /// `inverse` names the to-one or to-many field of `target` pointing back
    pub fn has_many(
        name: impl Into<String>,
        target: impl Into<String>,
        inverse: impl Into<String>,
    ) -> Self {
        Self::new(
            name,
            FieldKind::HasMany {
                target: target.into(),
                inverse: inverse.into(),
            },
        )
    }

    pub fn json_key(mut self, key: impl Into<String>) -> Self {
        self.json_key = key.into();
        self
    }

    pub fn store_key(mut self, key: impl Into<String>) -> Self {
        self.store_key = key.into();
        self
    }

    pub fn filterable(mut self) -> Self {
        self.filterable = true;
        self
    }

    pub fn sortable(mut self) -> Self {
        self.sortable = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn is_attribute(&self) -> bool {
        matches!(self.kind, FieldKind::Attribute(_))
    }

    pub fn is_relationship(&self) -> bool {
        !self.is_attribute()
    }

    /// Has-one and has-many are computed from the other side and never stored
    pub fn is_derived(&self) -> bool {
        matches!(
            self.kind,
            FieldKind::HasOne { .. } | FieldKind::HasMany { .. }
        )
    }

    /// Whether the relationship resolves to a single resource
    pub fn is_to_one_like(&self) -> bool {
        matches!(
            self.kind,
            FieldKind::ToOne { .. } | FieldKind::HasOne { .. }
        )
    }

    pub fn attr_type(&self) -> Option<AttrType> {
        match self.kind {
            FieldKind::Attribute(ty) => Some(ty),
            _ => None,
        }
    }

    /// Target resource type of a relationship
    pub fn target(&self) -> Option<&str> {
        match &self.kind {
            FieldKind::Attribute(_) => None,
            FieldKind::ToOne { target, .. }
            | FieldKind::ToMany { target }
            | FieldKind::HasOne { target, .. }
            | FieldKind::HasMany { target, .. } => Some(target),
        }
    }

    /// Name of the inverse field for has-one and has-many
    pub fn inverse(&self) -> Option<&str> {
        match &self.kind {
            FieldKind::HasOne { inverse, .. } | FieldKind::HasMany { inverse, .. } => {
                Some(inverse)
            }
            _ => None,
        }
    }
}

/// Model metadata
///
/// # Example
///
/// ```rust,ignore
/// let meta = Meta::new("posts")
///     .field(Field::attribute("title", AttrType::String).filterable().sortable())
///     .field(Field::to_one("author", "users").store_key("author_id"))
///     .field(Field::has_many("comments", "comments", "post"))
///     .field(Field::attribute("deleted_at", AttrType::Timestamp))
///     .soft_delete("deleted_at");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Meta {
    /// Plural resource name, also the JSON:API type
    pub name: String,
    /// Store collection name
    pub collection: String,
    pub fields: Vec<Field>,
    /// Name of the soft delete timestamp field
    pub soft_delete: Option<String>,
}

impl Meta {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            collection: name.clone(),
            name,
            fields: Vec::new(),
            soft_delete: None,
        }
    }

    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Mark a timestamp attribute as the soft delete field
    pub fn soft_delete(mut self, field: impl Into<String>) -> Self {
        self.soft_delete = Some(field.into());
        self
    }

    /// Find a field by whitelist name
    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Find a field by wire name
    pub fn by_json_key(&self, key: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.json_key == key)
    }

    pub fn attributes(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| f.is_attribute())
    }

    pub fn relationships(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| f.is_relationship())
    }

    pub fn soft_delete_field(&self) -> Option<&Field> {
        self.soft_delete.as_deref().and_then(|name| self.get(name))
    }

    /// Default readable whitelist: every declared field
    pub fn readable_fields(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    /// Default writable whitelist: every stored field except the soft delete marker
    pub fn writable_fields(&self) -> Vec<String> {
        self.fields
            .iter()
            .filter(|f| !f.is_derived() && self.soft_delete.as_deref() != Some(f.name.as_str()))
            .map(|f| f.name.clone())
            .collect()
    }

    /// Check the declaration on its own, without looking at other resources
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut names = HashSet::new();
        let mut keys = HashSet::new();
        for field in &self.fields {
            if field.name == "id"
                || field.json_key == "id"
                || !names.insert(field.name.as_str())
                || !keys.insert(field.json_key.as_str())
            {
                return Err(ConfigError::DuplicateField {
                    resource: self.name.clone(),
                    field: field.name.clone(),
                });
            }
        }

        if let Some(name) = &self.soft_delete {
            let field = self
                .get(name)
                .ok_or_else(|| ConfigError::MissingSoftDeleteField {
                    resource: self.name.clone(),
                    field: name.clone(),
                })?;
            if field.attr_type() != Some(AttrType::Timestamp) {
                return Err(ConfigError::InvalidSoftDeleteField {
                    resource: self.name.clone(),
                    field: name.clone(),
                });
            }
        }

        Ok(())
    }
}
