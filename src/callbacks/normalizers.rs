//! Reusable value normalizers
//!
//! Normalizers rewrite attribute values before they are validated, e.g. to trim
//! user input. Register them as validators ahead of the validators that check
//! the same attributes.

use serde_json::{Value, json};
use std::sync::Arc;

use crate::core::callback::Callback;
use crate::core::operation::Operation;

/// Transformation of a single attribute value
pub type Normalizer = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Trim whitespace from strings
pub fn trim() -> Normalizer {
    Arc::new(|value: Value| match value.as_str() {
        Some(s) => Value::String(s.trim().to_string()),
        None => value,
    })
}

pub fn uppercase() -> Normalizer {
    Arc::new(|value: Value| match value.as_str() {
        Some(s) => Value::String(s.to_uppercase()),
        None => value,
    })
}

pub fn lowercase() -> Normalizer {
    Arc::new(|value: Value| match value.as_str() {
        Some(s) => Value::String(s.to_lowercase()),
        None => value,
    })
}

/// Round numbers to `decimals` places
pub fn round_decimals(decimals: u32) -> Normalizer {
    Arc::new(move |value: Value| match value.as_f64() {
        Some(num) if !value.is_i64() && !value.is_u64() => {
            let factor = 10_f64.powi(decimals as i32);
            json!((num * factor).round() / factor)
        }
        _ => value,
    })
}

/// Apply `normalizers` in order to one attribute on create and update
pub fn attribute_normalizer(field: impl Into<String>, normalizers: Vec<Normalizer>) -> Callback {
    let field = field.into();
    Callback::from_fn(format!("normalize:{}", field), move |ctx| {
        let Some(value) = ctx.attribute(&field).cloned() else {
            return Ok(());
        };
        let value = normalizers.iter().fold(value, |value, normalize| normalize(value));
        ctx.set_attribute(&field, value)
    })
    .only(&[Operation::Create, Operation::Update])
}
