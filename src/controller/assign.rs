//! Assign request documents onto stored records under the writable whitelist

use serde_json::Value;
use uuid::Uuid;

use crate::core::error::{RequestError, Result};
use crate::core::meta::{Field, FieldKind, Meta};
use crate::core::record::Record;
use crate::jsonapi::{Identifier, Linkage, Resource};

/// Write the attributes and relationships of `resource` into `record`
///
/// Unknown names are always rejected. Known but non-writable fields are
/// rejected, or skipped when `soft_protection` is on.
pub(crate) fn assign(
    meta: &Meta,
    writable: &[String],
    soft_protection: bool,
    record: &mut Record,
    resource: &Resource,
) -> Result<()> {
    for (key, value) in &resource.attributes {
        let field = meta
            .by_json_key(key)
            .filter(|f| f.is_attribute())
            .ok_or_else(|| RequestError::UnknownAttribute { name: key.clone() })?;

        if !writable.contains(&field.name) {
            if soft_protection {
                tracing::debug!(resource = %meta.name, field = %field.name, "dropping protected attribute");
                continue;
            }
            return Err(RequestError::NotWritable { name: key.clone() }.into());
        }

        if let Some(ty) = field.attr_type()
            && !ty.accepts(value)
        {
            return Err(RequestError::InvalidAttributeValue {
                name: key.clone(),
                message: format!("expected {}", ty),
            }
            .into());
        }

        record.set(field.store_key.clone(), value.clone());
    }

    for (key, relationship) in &resource.relationships {
        let field = meta
            .by_json_key(key)
            .filter(|f| f.is_relationship())
            .ok_or_else(|| RequestError::UnknownRelationship { name: key.clone() })?;

        if field.is_derived() || !writable.contains(&field.name) {
            if soft_protection {
                tracing::debug!(resource = %meta.name, field = %field.name, "dropping protected relationship");
                continue;
            }
            return Err(RequestError::NotWritable { name: key.clone() }.into());
        }

        let linkage = relationship
            .data
            .as_ref()
            .ok_or_else(|| invalid(field, "missing relationship data"))?;
        set_linkage(field, record, linkage)?;
    }

    Ok(())
}

/// Replace a stored relationship wholesale
pub(crate) fn set_linkage(field: &Field, record: &mut Record, linkage: &Linkage) -> Result<()> {
    match (&field.kind, linkage) {
        (FieldKind::ToOne { optional, .. }, Linkage::One(None)) => {
            if !optional {
                return Err(invalid(field, "relationship is not optional").into());
            }
            record.set(field.store_key.clone(), Value::Null);
        }
        (FieldKind::ToOne { .. }, Linkage::One(Some(identifier))) => {
            let id = identifier_id(field, identifier)?;
            record.set(field.store_key.clone(), Value::String(id.to_string()));
        }
        (FieldKind::ToMany { .. }, Linkage::Many(identifiers)) => {
            let mut ids: Vec<Uuid> = Vec::with_capacity(identifiers.len());
            for identifier in identifiers {
                let id = identifier_id(field, identifier)?;
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
            record.set(field.store_key.clone(), id_list(&ids));
        }
        (FieldKind::ToOne { .. }, Linkage::Many(_)) => {
            return Err(invalid(field, "expected a single resource identifier").into());
        }
        (FieldKind::ToMany { .. }, Linkage::One(_)) => {
            return Err(invalid(field, "expected a list of resource identifiers").into());
        }
        _ => {
            return Err(RequestError::NotWritable {
                name: field.json_key.clone(),
            }
            .into());
        }
    }
    Ok(())
}

/// Add ids to a to-many relationship, ids already present are kept once
pub(crate) fn append_linkage(field: &Field, record: &mut Record, linkage: &Linkage) -> Result<()> {
    let additions = to_many_ids(field, linkage)?;
    let mut ids = record.ids(&field.store_key);
    for id in additions {
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    record.set(field.store_key.clone(), id_list(&ids));
    Ok(())
}

/// Remove ids from a to-many relationship, missing ids are ignored
pub(crate) fn remove_linkage(field: &Field, record: &mut Record, linkage: &Linkage) -> Result<()> {
    let removals = to_many_ids(field, linkage)?;
    let ids: Vec<Uuid> = record
        .ids(&field.store_key)
        .into_iter()
        .filter(|id| !removals.contains(id))
        .collect();
    record.set(field.store_key.clone(), id_list(&ids));
    Ok(())
}

fn to_many_ids(field: &Field, linkage: &Linkage) -> Result<Vec<Uuid>> {
    if !matches!(field.kind, FieldKind::ToMany { .. }) {
        return Err(invalid(field, "only to-many relationships can be appended to or removed from").into());
    }
    match linkage {
        Linkage::Many(identifiers) => identifiers
            .iter()
            .map(|identifier| identifier_id(field, identifier))
            .collect(),
        Linkage::One(_) => Err(invalid(field, "expected a list of resource identifiers").into()),
    }
}

fn identifier_id(field: &Field, identifier: &Identifier) -> Result<Uuid> {
    if Some(identifier.resource_type.as_str()) != field.target() {
        return Err(RequestError::ResourceTypeMismatch {
            expected: field.target().unwrap_or_default().to_string(),
            found: identifier.resource_type.clone(),
        }
        .into());
    }
    Uuid::parse_str(&identifier.id).map_err(|_| {
        RequestError::InvalidId {
            value: identifier.id.clone(),
        }
        .into()
    })
}

fn id_list(ids: &[Uuid]) -> Value {
    Value::Array(ids.iter().map(|id| Value::String(id.to_string())).collect())
}

fn invalid(field: &Field, message: &str) -> RequestError {
    RequestError::InvalidRelationship {
        name: field.json_key.clone(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::meta::AttrType;
    use crate::jsonapi::Relationship;
    use serde_json::json;

    fn meta() -> Meta {
        Meta::new("posts")
            .field(Field::attribute("title", AttrType::String))
            .field(Field::attribute("views", AttrType::Integer))
            .field(Field::optional_to_one("author", "users").store_key("author_id"))
            .field(Field::to_many("tags", "tags").store_key("tag_ids"))
            .field(Field::has_many("comments", "comments", "post"))
    }

    fn writable(meta: &Meta) -> Vec<String> {
        meta.writable_fields()
    }

    fn resource(body: Value) -> Resource {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn test_assign_attributes_and_relationships() {
        let meta = meta();
        let author = Uuid::new_v4();
        let tag = Uuid::new_v4();
        let mut record = Record::zero(&meta);

        let res = resource(json!({
            "type": "posts",
            "attributes": {"title": "Hi", "views": 3},
            "relationships": {
                "author": {"data": {"type": "users", "id": author.to_string()}},
                "tags": {"data": [{"type": "tags", "id": tag.to_string()}, {"type": "tags", "id": tag.to_string()}]}
            }
        }));
        assign(&meta, &writable(&meta), false, &mut record, &res).unwrap();

        assert_eq!(record.get("title"), Some(&json!("Hi")));
        assert_eq!(record.reference("author_id"), Some(author));
        assert_eq!(record.ids("tag_ids"), vec![tag]);
    }

    #[test]
    fn test_unknown_names_always_rejected() {
        let meta = meta();
        let mut record = Record::zero(&meta);
        let res = resource(json!({"type": "posts", "attributes": {"color": "red"}}));
        let err = assign(&meta, &writable(&meta), true, &mut record, &res).unwrap_err();
        assert_eq!(err.error_code(), "UNKNOWN_ATTRIBUTE");

        let res = resource(json!({"type": "posts", "relationships": {"editor": {"data": null}}}));
        let err = assign(&meta, &writable(&meta), true, &mut record, &res).unwrap_err();
        assert_eq!(err.error_code(), "UNKNOWN_RELATIONSHIP");
    }

    #[test]
    fn test_protected_fields() {
        let meta = meta();
        let only_title = vec!["title".to_string()];
        let res = resource(json!({"type": "posts", "attributes": {"title": "a", "views": 9}}));

        let mut record = Record::zero(&meta);
        let err = assign(&meta, &only_title, false, &mut record, &res).unwrap_err();
        assert_eq!(err.error_code(), "FIELD_NOT_WRITABLE");

        let mut record = Record::zero(&meta);
        assign(&meta, &only_title, true, &mut record, &res).unwrap();
        assert_eq!(record.get("title"), Some(&json!("a")));
        assert_eq!(record.get("views"), Some(&Value::Null));
    }

    #[test]
    fn test_derived_relationship_not_writable() {
        let meta = meta();
        let mut record = Record::zero(&meta);
        let res = resource(json!({"type": "posts", "relationships": {"comments": {"data": []}}}));
        let err = assign(&meta, &writable(&meta), false, &mut record, &res).unwrap_err();
        assert_eq!(err.error_code(), "FIELD_NOT_WRITABLE");
    }

    #[test]
    fn test_attribute_type_checked() {
        let meta = meta();
        let mut record = Record::zero(&meta);
        let res = resource(json!({"type": "posts", "attributes": {"views": "many"}}));
        let err = assign(&meta, &writable(&meta), false, &mut record, &res).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_ATTRIBUTE_VALUE");
    }

    #[test]
    fn test_relationship_ids_validated() {
        let meta = meta();
        let field = meta.get("author").unwrap();
        let mut record = Record::zero(&meta);

        let bad_id = Linkage::One(Some(Identifier::new("users", "nope")));
        assert_eq!(
            set_linkage(field, &mut record, &bad_id).unwrap_err().error_code(),
            "INVALID_RESOURCE_ID"
        );

        let bad_type = Linkage::One(Some(Identifier::new("tags", Uuid::new_v4())));
        assert_eq!(
            set_linkage(field, &mut record, &bad_type).unwrap_err().error_code(),
            "RESOURCE_TYPE_MISMATCH"
        );

        set_linkage(field, &mut record, &Linkage::One(None)).unwrap();
        assert_eq!(record.get("author_id"), Some(&Value::Null));
    }

    #[test]
    fn test_required_to_one_rejects_null() {
        let field = Field::to_one("author", "users");
        let mut record = Record::new(Uuid::new_v4());
        let err = set_linkage(&field, &mut record, &Linkage::One(None)).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_RELATIONSHIP");
    }

    #[test]
    fn test_append_and_remove_are_idempotent() {
        let meta = meta();
        let field = meta.get("tags").unwrap();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let mut record = Record::zero(&meta);

        let both = Linkage::Many(vec![Identifier::new("tags", a), Identifier::new("tags", b)]);
        append_linkage(field, &mut record, &both).unwrap();
        append_linkage(field, &mut record, &both).unwrap();
        assert_eq!(record.ids("tag_ids"), vec![a, b]);

        let just_a = Linkage::Many(vec![Identifier::new("tags", a)]);
        remove_linkage(field, &mut record, &just_a).unwrap();
        remove_linkage(field, &mut record, &just_a).unwrap();
        assert_eq!(record.ids("tag_ids"), vec![b]);

        let author = meta.get("author").unwrap();
        assert!(append_linkage(author, &mut record, &both).is_err());
    }

    #[test]
    fn test_missing_relationship_data() {
        let meta = meta();
        let mut record = Record::zero(&meta);
        let mut res = Resource::new("posts", None);
        res.relationships
            .insert("author".to_string(), Relationship::default());
        let err = assign(&meta, &writable(&meta), false, &mut record, &res).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_RELATIONSHIP");
    }
}
