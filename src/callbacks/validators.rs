//! Reusable validators
//!
//! Validators run after assignment, on the record about to be persisted.
//! Attribute rules are plain closures over `(field, value)` so they can be
//! combined freely in [`attribute_validator`].

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use serde_json::Value;
use std::sync::{Arc, OnceLock};
use uuid::Uuid;

use crate::core::callback::{Callback, Handler};
use crate::core::context::Context;
use crate::core::error::CallbackError;
use crate::core::operation::Operation;
use crate::core::query::{Filter, Query};
use crate::core::record::ID_KEY;

/// Check of a single attribute value, `Err` carries the client message
pub type Rule = Arc<dyn Fn(&str, &Value) -> Result<(), String> + Send + Sync>;

/// Rule: value is not null
pub fn required() -> Rule {
    Arc::new(|field: &str, value: &Value| {
        if value.is_null() {
            Err(format!("'{}' is required", field))
        } else {
            Ok(())
        }
    })
}

/// Rule: number must be positive
pub fn positive() -> Rule {
    Arc::new(|field: &str, value: &Value| match value.as_f64() {
        Some(num) if num <= 0.0 => Err(format!("'{}' must be positive (got {})", field, num)),
        _ => Ok(()),
    })
}

/// Rule: string length, in characters, within `min..=max`
pub fn string_length(min: usize, max: usize) -> Rule {
    Arc::new(move |field: &str, value: &Value| {
        let Some(s) = value.as_str() else {
            return Ok(());
        };
        let len = s.chars().count();
        if len < min {
            Err(format!(
                "'{}' must be at least {} characters (got {})",
                field, min, len
            ))
        } else if len > max {
            Err(format!(
                "'{}' must be at most {} characters (got {})",
                field, max, len
            ))
        } else {
            Ok(())
        }
    })
}

/// Rule: number must not exceed `max`
pub fn max_value(max: f64) -> Rule {
    Arc::new(move |field: &str, value: &Value| match value.as_f64() {
        Some(num) if num > max => Err(format!(
            "'{}' must not exceed {} (got {})",
            field, max, num
        )),
        _ => Ok(()),
    })
}

/// Rule: string must be one of `allowed`
pub fn in_list(allowed: &[&str]) -> Rule {
    let allowed: Vec<String> = allowed.iter().map(|s| s.to_string()).collect();
    Arc::new(move |field: &str, value: &Value| match value.as_str() {
        Some(s) if !allowed.iter().any(|a| a == s) => Err(format!(
            "'{}' must be one of {:?} (got {})",
            field, allowed, s
        )),
        _ => Ok(()),
    })
}

/// Rule: string must match `format`
pub fn format(format: FieldFormat) -> Rule {
    Arc::new(move |field: &str, value: &Value| match value.as_str() {
        Some(s) if !format.is_match(s) => Err(format!(
            "'{}' is not a valid {}",
            field,
            format.name()
        )),
        _ => Ok(()),
    })
}

/// Well-known string formats
#[derive(Debug, Clone)]
pub enum FieldFormat {
    Email,
    Uuid,
    Url,
    Phone,
    Custom(Regex),
}

impl FieldFormat {
    pub fn is_match(&self, value: &str) -> bool {
        static EMAIL: OnceLock<Option<Regex>> = OnceLock::new();
        static URL: OnceLock<Option<Regex>> = OnceLock::new();
        // At least 8 digits, max 15 (E.164)
        static PHONE: OnceLock<Option<Regex>> = OnceLock::new();

        match self {
            FieldFormat::Email => {
                cached(&EMAIL, r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$", value)
            }
            FieldFormat::Uuid => Uuid::parse_str(value).is_ok(),
            FieldFormat::Url => cached(&URL, r"^https?://[^\s/$.?#].[^\s]*$", value),
            FieldFormat::Phone => cached(&PHONE, r"^\+?[1-9]\d{7,14}$", value),
            FieldFormat::Custom(regex) => regex.is_match(value),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            FieldFormat::Email => "email address",
            FieldFormat::Uuid => "uuid",
            FieldFormat::Url => "url",
            FieldFormat::Phone => "phone number",
            FieldFormat::Custom(_) => "value",
        }
    }
}

fn cached(cell: &OnceLock<Option<Regex>>, pattern: &str, value: &str) -> bool {
    cell.get_or_init(|| Regex::new(pattern).ok())
        .as_ref()
        .is_some_and(|regex| regex.is_match(value))
}

/// Apply `rules` to one attribute of the subject on create and update
///
/// ```rust,ignore
/// .validator(attribute_validator("email", vec![required(), format(FieldFormat::Email)]))
/// ```
pub fn attribute_validator(field: impl Into<String>, rules: Vec<Rule>) -> Callback {
    let field = field.into();
    Callback::from_fn(format!("validate:{}", field), move |ctx| {
        let value = ctx.attribute(&field).cloned().unwrap_or(Value::Null);
        let key = ctx
            .meta()
            .get(&field)
            .map(|f| f.json_key.clone())
            .unwrap_or_else(|| field.clone());
        for rule in &rules {
            rule(&key, &value).map_err(CallbackError::Safe)?;
        }
        Ok(())
    })
    .only(&[Operation::Create, Operation::Update])
}

/// Set `created` on create and `updated` on create and update, as RFC 3339
pub fn timestamp_validator(created: impl Into<String>, updated: impl Into<String>) -> Callback {
    let created = created.into();
    let updated = updated.into();
    Callback::from_fn("timestamps", move |ctx| {
        let now = Value::String(Utc::now().to_rfc3339());
        if ctx.operation == Operation::Create {
            ctx.set_attribute(&created, now.clone())?;
        }
        ctx.set_attribute(&updated, now)
    })
    .only(&[Operation::Create, Operation::Update])
}

/// Reject values already used by another live record of the collection
pub fn unique_attribute_validator(field: impl Into<String>) -> Callback {
    let field = field.into();
    Callback::new(format!("unique:{}", field), Unique { field })
        .only(&[Operation::Create, Operation::Update])
}

struct Unique {
    field: String,
}

#[async_trait]
impl Handler for Unique {
    async fn handle(&self, ctx: &mut Context) -> Result<(), CallbackError> {
        let Some(value) = ctx.attribute(&self.field).filter(|v| !v.is_null()).cloned() else {
            return Ok(());
        };
        let Some(subject) = ctx.model.as_ref().map(|m| m.id) else {
            return Ok(());
        };
        let meta = ctx.meta();
        let Some(field) = meta.get(&self.field) else {
            return Ok(());
        };

        let mut conditions = vec![Filter::eq(field.store_key.clone(), value)];
        if let Some(soft) = meta.soft_delete_field() {
            conditions.push(Filter::is_null(soft.store_key.clone()));
        }
        let query = Query::new(Filter::And(conditions))
            .limit(2)
            .project(vec![ID_KEY.to_string()]);
        let taken = ctx
            .collection()
            .find(&query)
            .await?
            .iter()
            .any(|record| record.id != subject);

        if taken {
            Err(CallbackError::safe(format!(
                "'{}' is already taken",
                field.json_key
            )))
        } else {
            Ok(())
        }
    }
}
