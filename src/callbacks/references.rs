//! Referential checks across collections
//!
//! The store has no foreign keys, so these validators keep stored
//! relationships pointing at live documents.

use async_trait::async_trait;
use serde_json::Value;

use crate::core::callback::{Callback, Handler};
use crate::core::context::Context;
use crate::core::error::CallbackError;
use crate::core::meta::FieldKind;
use crate::core::operation::Operation;
use crate::core::query::Filter;
use crate::core::record::ID_KEY;

/// Check that the ids stored in the listed relationships exist
///
/// Each entry pairs a to-one or to-many field name with the collection its
/// targets live in.
///
/// ```rust,ignore
/// .validator(verify_references_validator(&[("author", "users"), ("tags", "tags")]))
/// ```
pub fn verify_references_validator(references: &[(&str, &str)]) -> Callback {
    let references = references
        .iter()
        .map(|(field, collection)| (field.to_string(), collection.to_string()))
        .collect();
    Callback::new("verify_references", VerifyReferences { references })
        .only(&[Operation::Create, Operation::Update])
}

struct VerifyReferences {
    references: Vec<(String, String)>,
}

#[async_trait]
impl Handler for VerifyReferences {
    async fn handle(&self, ctx: &mut Context) -> Result<(), CallbackError> {
        let Some(record) = ctx.model.as_ref() else {
            return Ok(());
        };

        for (name, collection) in &self.references {
            let field = ctx
                .meta()
                .get(name)
                .ok_or_else(|| anyhow::anyhow!("unknown relationship '{}' on '{}'", name, ctx.meta().name))?;
            let ids = match field.kind {
                FieldKind::ToOne { .. } => record.reference(&field.store_key).into_iter().collect(),
                FieldKind::ToMany { .. } => record.ids(&field.store_key),
                _ => {
                    return Err(anyhow::anyhow!("'{}' is not a stored relationship", name).into());
                }
            };
            if ids.is_empty() {
                continue;
            }

            let values = ids.iter().map(|id| Value::String(id.to_string())).collect();
            let found = ctx
                .store()
                .collection(collection)
                .count(&Filter::any_of(ID_KEY, values))
                .await?;
            if found < ids.len() as u64 {
                return Err(CallbackError::safe(format!(
                    "'{}' references missing resources",
                    field.json_key
                )));
            }
        }
        Ok(())
    }
}

/// Refuse to delete a record still referenced from other collections
///
/// Each entry pairs a collection with the store key holding the references,
/// either a single id or a list of ids.
///
/// ```rust,ignore
/// .validator(dependent_resources_validator(&[("posts", "author_id")]))
/// ```
pub fn dependent_resources_validator(dependents: &[(&str, &str)]) -> Callback {
    let dependents = dependents
        .iter()
        .map(|(collection, key)| (collection.to_string(), key.to_string()))
        .collect();
    Callback::new("dependent_resources", DependentResources { dependents })
        .only(&[Operation::Delete])
}

struct DependentResources {
    dependents: Vec<(String, String)>,
}

#[async_trait]
impl Handler for DependentResources {
    async fn handle(&self, ctx: &mut Context) -> Result<(), CallbackError> {
        let Some(id) = ctx.model.as_ref().map(|m| m.id) else {
            return Ok(());
        };

        for (collection, key) in &self.dependents {
            let count = ctx
                .store()
                .collection(collection)
                .count(&Filter::eq(key.clone(), id.to_string()))
                .await?;
            if count > 0 {
                tracing::debug!(resource = %ctx.meta().name, %id, collection = %collection, count, "delete blocked by dependents");
                return Err(CallbackError::safe(format!(
                    "still referenced by {} {}",
                    count, collection
                )));
            }
        }
        Ok(())
    }
}
