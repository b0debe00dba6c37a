//! Store queries and pagination utilities

use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;

use crate::core::record::{ID_KEY, Record};

/// Condition on a single store key
///
/// Matching follows document store conventions: equality against a stored
/// list matches when the list contains the value, and `In` matches when any
/// stored list element is in the set.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(Value),
    In(Vec<Value>),
    /// The key is absent or `null`
    Null,
    NotNull,
}

impl Condition {
    pub fn matches(&self, value: Option<&Value>) -> bool {
        let value = value.unwrap_or(&Value::Null);
        match self {
            Condition::Null => value.is_null(),
            Condition::NotNull => !value.is_null(),
            Condition::Eq(expected) => match value {
                Value::Array(items) if !expected.is_array() => items.contains(expected),
                other => other == expected,
            },
            Condition::In(set) => match value {
                Value::Array(items) => items.iter().any(|item| set.contains(item)),
                other => set.contains(other),
            },
        }
    }
}

/// Boolean filter tree
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Field(String, Condition),
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    /// Matches every document
    pub fn all() -> Self {
        Filter::And(Vec::new())
    }

    pub fn eq(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Field(key.into(), Condition::Eq(value.into()))
    }

    pub fn any_of(key: impl Into<String>, values: Vec<Value>) -> Self {
        Filter::Field(key.into(), Condition::In(values))
    }

    pub fn is_null(key: impl Into<String>) -> Self {
        Filter::Field(key.into(), Condition::Null)
    }

    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Filter::Field(key, condition) => {
                if key == ID_KEY {
                    condition.matches(record.value(ID_KEY).as_ref())
                } else {
                    condition.matches(record.get(key))
                }
            }
            Filter::And(filters) => filters.iter().all(|f| f.matches(record)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(record)),
        }
    }
}

/// Sort key on a store key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub key: String,
    pub descending: bool,
}

impl SortKey {
    pub fn asc(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            descending: false,
        }
    }

    pub fn desc(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            descending: true,
        }
    }
}

/// A find query against a collection
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub filter: Filter,
    pub sort: Vec<SortKey>,
    pub skip: u64,
    pub limit: Option<u64>,
    /// Store keys to keep in the returned records, all when `None`
    pub projection: Option<Vec<String>>,
}

impl Query {
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            sort: Vec::new(),
            skip: 0,
            limit: None,
            projection: None,
        }
    }

    pub fn sort(mut self, sort: Vec<SortKey>) -> Self {
        self.sort = sort;
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn project(mut self, keys: Vec<String>) -> Self {
        self.projection = Some(keys);
        self
    }
}

/// Total order over JSON values used for sorting
///
/// Values of different kinds order as null, booleans, numbers, strings,
/// arrays, objects.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (l, r) in x.iter().zip(y.iter()) {
                match compare_values(l, r) {
                    Ordering::Equal => continue,
                    other => return other,
                }
            }
            x.len().cmp(&y.len())
        }
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Compare two records by a list of sort keys
pub fn compare_records(a: &Record, b: &Record, sort: &[SortKey]) -> Ordering {
    for key in sort {
        let left = a.value(&key.key).unwrap_or(Value::Null);
        let right = b.value(&key.key).unwrap_or(Value::Null);
        let ordering = compare_values(&left, &right);
        let ordering = if key.descending {
            ordering.reverse()
        } else {
            ordering
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Pagination state of a list response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    /// Current page number (starts at 1)
    pub number: u64,

    /// Number of items per page
    pub size: u64,

    /// Total number of items (after filters)
    pub total: u64,

    /// Last page number, at least 1
    pub last: u64,
}

impl Pagination {
    pub fn new(number: u64, size: u64, total: u64) -> Self {
        let size = size.max(1);
        Self {
            number,
            size,
            total,
            last: total.div_ceil(size).max(1),
        }
    }

    /// Number of items skipped before the page
    pub fn offset(&self) -> u64 {
        (self.number.saturating_sub(1)).saturating_mul(self.size)
    }

    pub fn has_prev(&self) -> bool {
        self.number > 1
    }

    pub fn has_next(&self) -> bool {
        self.number < self.last
    }
}
