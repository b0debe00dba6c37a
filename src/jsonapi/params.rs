//! JSON:API query parameters
//!
//! ```text
//! GET /posts?filter[published]=true&filter[tags]=a,b&sort=-created_at,title
//!     &page[number]=2&page[size]=10&fields[posts]=title,author
//! ```

use axum::extract::Query;
use axum::http::Uri;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::fmt::Write;

use crate::core::error::RequestError;

/// Parsed query parameters of a request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    /// `filter[name]` values, split on commas
    pub filters: IndexMap<String, Vec<String>>,

    /// `sort` keys, a leading `-` means descending
    pub sorting: Vec<String>,

    pub page_number: Option<u64>,

    pub page_size: Option<u64>,

    /// `fields[type]` sparse field sets
    pub fields: HashMap<String, Vec<String>>,

    /// Every raw pair except pagination, in request order
    pairs: Vec<(String, String)>,
}

impl Params {
    /// Parse the query string of a URI
    pub fn from_uri(uri: &Uri) -> Result<Self, RequestError> {
        let Query(pairs) = Query::<Vec<(String, String)>>::try_from_uri(uri).map_err(|e| {
            RequestError::InvalidParameter {
                parameter: "query".to_string(),
                message: e.body_text(),
            }
        })?;
        Self::parse(pairs)
    }

    pub fn parse(pairs: Vec<(String, String)>) -> Result<Self, RequestError> {
        let mut params = Params::default();

        for (key, value) in pairs {
            if let Some(name) = bracketed(&key, "filter") {
                params
                    .filters
                    .entry(name.to_string())
                    .or_default()
                    .extend(split_list(&value));
            } else if let Some(name) = bracketed(&key, "fields") {
                params
                    .fields
                    .entry(name.to_string())
                    .or_default()
                    .extend(split_list(&value));
            } else if key == "sort" {
                params.sorting.extend(split_list(&value));
            } else if key == "page[number]" {
                params.page_number = Some(page_value(&key, &value)?);
                continue;
            } else if key == "page[size]" {
                params.page_size = Some(page_value(&key, &value)?);
                continue;
            } else if key == "include" {
                return Err(RequestError::InvalidParameter {
                    parameter: key,
                    message: "inclusion of related resources is not supported".to_string(),
                });
            } else if bracketed(&key, "page").is_some() {
                return Err(RequestError::InvalidParameter {
                    parameter: key,
                    message: "only page[number] and page[size] are supported".to_string(),
                });
            }
            params.pairs.push((key, value));
        }

        Ok(params)
    }

    /// Rebuild the query string, optionally with a page
    pub fn query_string(&self, page: Option<(u64, u64)>) -> String {
        let mut query = String::new();
        for (key, value) in &self.pairs {
            push_pair(&mut query, key, value);
        }
        if let Some((number, size)) = page {
            push_pair(&mut query, "page[number]", &number.to_string());
            push_pair(&mut query, "page[size]", &size.to_string());
        }
        query
    }

    /// Sparse field set requested for a resource type
    pub fn fields_for(&self, resource_type: &str) -> Option<&[String]> {
        self.fields.get(resource_type).map(Vec::as_slice)
    }
}

/// `prefix[name]` -> `name`
fn bracketed<'a>(key: &'a str, prefix: &str) -> Option<&'a str> {
    key.strip_prefix(prefix)?
        .strip_prefix('[')?
        .strip_suffix(']')
        .filter(|name| !name.is_empty())
}

fn split_list(value: &str) -> impl Iterator<Item = String> + '_ {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn page_value(key: &str, value: &str) -> Result<u64, RequestError> {
    match value.trim().parse::<u64>() {
        Ok(n) if n >= 1 => Ok(n),
        _ => Err(RequestError::InvalidParameter {
            parameter: key.to_string(),
            message: format!("expected a positive integer, got '{}'", value),
        }),
    }
}

fn push_pair(query: &mut String, key: &str, value: &str) {
    if !query.is_empty() {
        query.push('&');
    }
    encode_into(query, key);
    query.push('=');
    encode_into(query, value);
}

fn encode_into(out: &mut String, text: &str) {
    for byte in text.bytes() {
        match byte {
            b'A'..=b'Z'
            | b'a'..=b'z'
            | b'0'..=b'9'
            | b'-'
            | b'_'
            | b'.'
            | b'~'
            | b'['
            | b']'
            | b',' => out.push(byte as char),
            _ => {
                let _ = write!(out, "%{:02X}", byte);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(query: &str) -> Result<Params, RequestError> {
        let uri: Uri = format!("/posts?{}", query).parse().unwrap();
        Params::from_uri(&uri)
    }

    #[test]
    fn test_parse_all_parameters() {
        let params = parse(
            "filter[tags]=a,b&filter[tags]=c&sort=-created,title&page[number]=2&page[size]=10&fields[posts]=title",
        )
        .unwrap();
        assert_eq!(params.filters["tags"], vec!["a", "b", "c"]);
        assert_eq!(params.sorting, vec!["-created", "title"]);
        assert_eq!(params.page_number, Some(2));
        assert_eq!(params.page_size, Some(10));
        assert_eq!(params.fields_for("posts"), Some(&["title".to_string()][..]));
    }

    #[test]
    fn test_encoded_brackets() {
        let params = parse("filter%5Btitle%5D=Hello%20World").unwrap();
        assert_eq!(params.filters["title"], vec!["Hello World"]);
    }

    #[test]
    fn test_invalid_page_values() {
        assert!(parse("page[number]=0").is_err());
        assert!(parse("page[size]=abc").is_err());
        assert!(parse("page[offset]=3").is_err());
    }

    #[test]
    fn test_include_is_rejected() {
        let err = parse("include=author").unwrap_err();
        assert_eq!(err.error_code(), "INVALID_PARAMETER");
    }

    #[test]
    fn test_query_string_replaces_page() {
        let params = parse("filter[title]=a%20b&page[number]=3&page[size]=5").unwrap();
        assert_eq!(
            params.query_string(Some((1, 5))),
            "filter[title]=a%20b&page[number]=1&page[size]=5"
        );
        assert_eq!(params.query_string(None), "filter[title]=a%20b");
        assert_eq!(Params::default().query_string(None), "");
    }
}
