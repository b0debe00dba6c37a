//! Batched loading of has-one and has-many relationships
//!
//! Derived relationships are not stored on the subject. For each one, a single
//! query against the related collection fetches every document whose inverse
//! key points at one of the subjects, projected to that key.

use serde_json::Value;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::core::error::{Error, Result};
use crate::core::meta::{Field, FieldKind};
use crate::core::query::{Filter, Query};
use crate::core::record::Record;
use crate::group::Group;

/// Related ids per derived field name, per subject id
pub(crate) type Related = HashMap<String, HashMap<Uuid, Vec<Uuid>>>;

pub(crate) async fn preload(
    group: &Group,
    resource: &str,
    fields: &[&Field],
    records: &[Record],
) -> Result<Related> {
    let mut related = Related::new();
    if records.is_empty() {
        return Ok(related);
    }

    let subjects: HashSet<Uuid> = records.iter().map(|r| r.id).collect();
    let ids: Vec<Value> = records
        .iter()
        .map(|r| Value::String(r.id.to_string()))
        .collect();

    for field in fields.iter().filter(|f| f.is_derived()) {
        let (target, inverse_key) = resolve(group, resource, field)?;

        let mut conditions = vec![Filter::any_of(inverse_key, ids.clone())];
        if let Some(soft) = target.meta().soft_delete_field() {
            conditions.push(Filter::is_null(soft.store_key.clone()));
        }
        let query = Query::new(Filter::And(conditions)).project(vec![inverse_key.to_string()]);
        let documents = target.collection().find(&query).await?;

        let mut by_subject: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for document in &documents {
            for owner in document.ids(inverse_key) {
                if subjects.contains(&owner) {
                    by_subject.entry(owner).or_default().push(document.id);
                }
            }
        }

        if matches!(field.kind, FieldKind::HasOne { .. })
            && let Some((subject, hits)) = by_subject.iter().find(|(_, hits)| hits.len() > 1)
        {
            return Err(has_one_violation(resource, field, *subject, hits.len()));
        }

        tracing::trace!(
            resource = %resource,
            field = %field.name,
            documents = documents.len(),
            "preloaded relationship"
        );
        related.insert(field.name.clone(), by_subject);
    }

    Ok(related)
}

fn resolve<'g>(
    group: &'g Group,
    resource: &str,
    field: &Field,
) -> Result<(&'g crate::controller::Controller, &'g str)> {
    let target_name = field.target().unwrap_or_default();
    let target = group.controller(target_name).ok_or_else(|| {
        Error::Internal(format!(
            "'{}.{}' targets unregistered '{}'",
            resource, field.name, target_name
        ))
    })?;
    let inverse = field.inverse().unwrap_or_default();
    let inverse_key = target
        .meta()
        .get(inverse)
        .map(|f| f.store_key.as_str())
        .ok_or_else(|| {
            Error::Internal(format!(
                "'{}.{}' has unresolved inverse '{}'",
                resource, field.name, inverse
            ))
        })?;
    Ok((target, inverse_key))
}

pub(crate) fn has_one_violation(resource: &str, field: &Field, subject: Uuid, hits: usize) -> Error {
    Error::Consistency(format!(
        "has-one '{}.{}' of {} resolves to {} documents",
        resource, field.name, subject, hits
    ))
}
