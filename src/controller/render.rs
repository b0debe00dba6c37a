//! Render records as JSON:API resources

use serde_json::Value;

use crate::controller::preload::Related;
use crate::core::meta::{Field, FieldKind, Meta};
use crate::core::query::Pagination;
use crate::core::record::Record;
use crate::jsonapi::{Identifier, Linkage, Links, Params, Relationship, Resource};

/// Fields to render: the readable whitelist, narrowed by `fields[type]`
pub(crate) fn visible_fields<'m>(
    meta: &'m Meta,
    readable: &[String],
    params: &Params,
) -> Vec<&'m Field> {
    let sparse = params.fields_for(&meta.name);
    meta.fields
        .iter()
        .filter(|f| readable.contains(&f.name))
        .filter(|f| sparse.is_none_or(|keys| keys.contains(&f.json_key)))
        .collect()
}

pub(crate) fn resource_link(prefix: &str, resource_type: &str, id: &str) -> String {
    format!("{}/{}/{}", prefix, resource_type, id)
}

pub(crate) fn relationship_links(prefix: &str, resource_type: &str, id: &str, key: &str) -> Links {
    let base = resource_link(prefix, resource_type, id);
    Links {
        self_link: Some(format!("{}/relationships/{}", base, key)),
        related: Some(format!("{}/{}", base, key)),
        ..Default::default()
    }
}

/// Links of a collection, with pagination links when a page was requested
pub(crate) fn collection_links(path: &str, params: &Params, page: Option<Pagination>) -> Links {
    let link = |page: Option<(u64, u64)>| {
        let query = params.query_string(page);
        if query.is_empty() {
            path.to_string()
        } else {
            format!("{}?{}", path, query)
        }
    };

    match page {
        None => Links::to_self(link(None)),
        Some(page) => Links {
            self_link: Some(link(Some((page.number, page.size)))),
            first: Some(link(Some((1, page.size)))),
            last: Some(link(Some((page.last, page.size)))),
            prev: page
                .has_prev()
                .then(|| link(Some((page.number - 1, page.size)))),
            next: page
                .has_next()
                .then(|| link(Some((page.number + 1, page.size)))),
            ..Default::default()
        },
    }
}

pub(crate) struct Renderer<'a> {
    prefix: &'a str,
    meta: &'a Meta,
    fields: &'a [&'a Field],
    related: &'a Related,
}

impl<'a> Renderer<'a> {
    pub(crate) fn new(
        prefix: &'a str,
        meta: &'a Meta,
        fields: &'a [&'a Field],
        related: &'a Related,
    ) -> Self {
        Self {
            prefix,
            meta,
            fields,
            related,
        }
    }

    pub(crate) fn resource(&self, record: &Record) -> Resource {
        let id = record.id.to_string();
        let mut resource = Resource::new(self.meta.name.clone(), Some(id.clone()));

        for field in self.fields {
            if field.is_attribute() {
                let value = record.get(&field.store_key).cloned().unwrap_or(Value::Null);
                resource.attributes.insert(field.json_key.clone(), value);
            } else {
                resource.relationships.insert(
                    field.json_key.clone(),
                    Relationship {
                        data: self.linkage(field, record),
                        links: Some(relationship_links(
                            self.prefix,
                            &self.meta.name,
                            &id,
                            &field.json_key,
                        )),
                    },
                );
            }
        }

        resource.links = Some(Links::to_self(resource_link(
            self.prefix,
            &self.meta.name,
            &id,
        )));
        resource
    }

    pub(crate) fn resources(&self, records: &[Record]) -> Vec<Resource> {
        records.iter().map(|r| self.resource(r)).collect()
    }

    /// Linkage of a relationship, `None` for derived ones that were not preloaded
    pub(crate) fn linkage(&self, field: &Field, record: &Record) -> Option<Linkage> {
        let target = field.target().unwrap_or_default();
        let identifiers = |ids: &[uuid::Uuid]| {
            ids.iter()
                .map(|id| Identifier::new(target, id))
                .collect::<Vec<_>>()
        };

        match &field.kind {
            FieldKind::Attribute(_) => None,
            FieldKind::ToOne { .. } => Some(Linkage::One(
                record
                    .reference(&field.store_key)
                    .map(|id| Identifier::new(target, id)),
            )),
            FieldKind::ToMany { .. } => Some(Linkage::Many(identifiers(&record.ids(&field.store_key)))),
            FieldKind::HasOne { .. } | FieldKind::HasMany { .. } => {
                let ids = self
                    .related
                    .get(&field.name)?
                    .get(&record.id)
                    .cloned()
                    .unwrap_or_default();
                if field.is_to_one_like() {
                    Some(Linkage::One(ids.first().map(|id| Identifier::new(target, id))))
                } else {
                    Some(Linkage::Many(identifiers(&ids)))
                }
            }
        }
    }
}
