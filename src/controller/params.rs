//! Translate JSON:API list parameters into filters, sort keys and pages

use serde_json::Value;
use uuid::Uuid;

use crate::core::error::{RequestError, Result};
use crate::core::meta::{AttrType, FieldKind, Meta};
use crate::core::query::{Condition, Filter, SortKey};
use crate::jsonapi::Params;

/// Filters for every `filter[name]` parameter
pub(crate) fn filters(meta: &Meta, params: &Params) -> Result<Vec<Filter>> {
    let mut filters = Vec::with_capacity(params.filters.len());

    for (name, tokens) in &params.filters {
        let field = meta
            .by_json_key(name)
            .filter(|f| f.filterable)
            .ok_or_else(|| RequestError::UnsupportedFilter { name: name.clone() })?;

        let invalid = |token: &str| RequestError::InvalidFilterValue {
            name: name.clone(),
            value: token.to_string(),
        };

        let values: Vec<Value> = match &field.kind {
            FieldKind::Attribute(AttrType::Boolean) => {
                let [token] = tokens.as_slice() else {
                    return Err(invalid(&tokens.join(",")).into());
                };
                vec![AttrType::Boolean.parse_token(token).ok_or_else(|| invalid(token))?]
            }
            FieldKind::Attribute(ty) => tokens
                .iter()
                .map(|t| ty.parse_token(t).ok_or_else(|| invalid(t)))
                .collect::<Result<_, _>>()?,
            FieldKind::ToOne { .. } | FieldKind::ToMany { .. } => tokens
                .iter()
                .map(|t| {
                    Uuid::parse_str(t)
                        .map(|id| Value::String(id.to_string()))
                        .map_err(|_| invalid(t))
                })
                .collect::<Result<_, _>>()?,
            FieldKind::HasOne { .. } | FieldKind::HasMany { .. } => {
                return Err(RequestError::UnsupportedFilter { name: name.clone() }.into());
            }
        };

        let condition = match <[Value; 1]>::try_from(values) {
            Ok([value]) => Condition::Eq(value),
            Err(values) if values.is_empty() => return Err(invalid("").into()),
            Err(values) => Condition::In(values),
        };
        filters.push(Filter::Field(field.store_key.clone(), condition));
    }

    Ok(filters)
}

/// Sort keys for the `sort` parameter
pub(crate) fn sorting(meta: &Meta, params: &Params) -> Result<Vec<SortKey>> {
    params
        .sorting
        .iter()
        .map(|key| {
            let (name, descending) = match key.strip_prefix('-') {
                Some(name) => (name, true),
                None => (key.as_str(), false),
            };
            let field = meta
                .by_json_key(name)
                .filter(|f| f.sortable && f.is_attribute())
                .ok_or_else(|| RequestError::UnsupportedSort { name: key.clone() })?;
            Ok(SortKey {
                key: field.store_key.clone(),
                descending,
            })
        })
        .collect()
}

/// Page to load, if any
///
/// With a list limit the page size is forced to the limit whenever it is
/// omitted or larger. Without one, `page[number]` requires `page[size]`.
pub(crate) fn page(params: &Params, list_limit: Option<u64>) -> Result<Option<(u64, u64)>> {
    let mut number = params.page_number;
    let mut size = params.page_size;

    if let Some(limit) = list_limit {
        if size.is_none_or(|s| s > limit) {
            size = Some(limit);
        }
        number.get_or_insert(1);
    }

    match (number, size) {
        (None, None) => Ok(None),
        (number, Some(size)) => Ok(Some((number.unwrap_or(1), size))),
        (Some(_), None) => Err(RequestError::InvalidParameter {
            parameter: "page[size]".to_string(),
            message: "a page size is required with a page number".to_string(),
        }
        .into()),
    }
}
