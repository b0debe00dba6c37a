//! Typed error handling for the engine
//!
//! Every failure that can happen while a request travels through a controller
//! is an [`Error`]. Errors are split into two classes:
//!
//! - **safe** errors carry a message meant for the client (protocol violations,
//!   unknown fields, safe callback failures) and are rendered verbatim
//! - **internal** errors (storage failures, internal callback failures,
//!   consistency violations, panics) are logged and reported, and the client
//!   only receives a generic internal error
//!
//! Configuration problems are a separate [`ConfigError`] type returned while the
//! group is built; they never appear while serving requests.
//!
//! # Example
//!
//! ```rust,ignore
//! use this_jsonapi::prelude::*;
//!
//! let err = Error::from(RequestError::UnnecessaryId);
//! assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
//! assert!(err.is_safe());
//! ```

use axum::http::{HeaderValue, StatusCode, header::CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use std::fmt;

use crate::core::operation::Stage;
use crate::jsonapi::{Document, ErrorObject, ErrorSource, MEDIA_TYPE};

/// Message sent to clients in place of internal error details
pub const INTERNAL_ERROR_DETAIL: &str = "an internal error occurred";

/// The main error type of the request pipeline
#[derive(Debug)]
pub enum Error {
    /// The request violates the protocol or references unknown things
    Request(RequestError),

    /// A callback failed during one of the pipeline stages
    Callback {
        stage: Stage,
        callback: String,
        error: CallbackError,
    },

    /// The store failed
    Storage(StorageError),

    /// Stored data contradicts the declared relationships
    Consistency(String),

    /// Anything else that should never happen (including caught panics)
    Internal(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Request(e) => write!(f, "{}", e),
            Error::Callback {
                stage,
                callback,
                error,
            } => write!(f, "{} '{}' failed: {}", stage, callback, error),
            Error::Storage(e) => write!(f, "{}", e),
            Error::Consistency(msg) => write!(f, "Consistency error: {}", msg),
            Error::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Request(e) => Some(e),
            Error::Callback { error, .. } => Some(error),
            Error::Storage(e) => Some(e),
            Error::Consistency(_) | Error::Internal(_) => None,
        }
    }
}

impl Error {
    /// Whether the error message may be shown to the client
    pub fn is_safe(&self) -> bool {
        match self {
            Error::Request(_) => true,
            Error::Callback { error, .. } => error.is_safe(),
            Error::Storage(_) | Error::Consistency(_) | Error::Internal(_) => false,
        }
    }

    /// Get the HTTP status code for this error
    ///
    /// Safe callback errors are mapped by the stage that raised them.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Request(e) => e.status_code(),
            Error::Callback { stage, error, .. } if error.is_safe() => stage.status_code(),
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Request(e) => e.error_code(),
            Error::Callback { stage, error, .. } if error.is_safe() => match stage {
                Stage::Authorizer => "ACCESS_DENIED",
                Stage::Validator | Stage::Action => "INVALID_RESOURCE",
                Stage::Decorator | Stage::Notifier => "CALLBACK_FAILED",
            },
            _ => "INTERNAL_ERROR",
        }
    }

    /// The message shown to clients
    pub fn detail(&self) -> String {
        match self {
            Error::Callback { error, .. } if error.is_safe() => error.to_string(),
            e if e.is_safe() => e.to_string(),
            _ => INTERNAL_ERROR_DETAIL.to_string(),
        }
    }

    /// Convert to a JSON:API error object
    pub fn to_error_object(&self) -> ErrorObject {
        let status = self.status_code();
        ErrorObject {
            status: status.as_u16().to_string(),
            code: Some(self.error_code().to_string()),
            title: status.canonical_reason().map(str::to_string),
            detail: Some(self.detail()),
            source: match self {
                Error::Request(e) => e.source_hint(),
                _ => None,
            },
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let document = Document::errors(vec![self.to_error_object()]);
        let body = serde_json::to_vec(&document).unwrap_or_default();
        let mut response = (status, body).into_response();
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(MEDIA_TYPE));
        response
    }
}

// =============================================================================
// Request Errors
// =============================================================================

/// Errors caused by the client's request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// The body is not a valid JSON:API document
    InvalidBody { message: String },

    /// The body is longer than the group's limit
    PayloadTooLarge { limit: usize },

    /// The resource type in the body does not match the endpoint
    ResourceTypeMismatch { expected: String, found: String },

    /// The resource id in the body does not match the path id
    ResourceIdMismatch { expected: String, found: String },

    /// A resource id was supplied on create
    UnnecessaryId,

    /// A resource id is required but missing
    MissingId,

    /// A value is not a valid resource id
    InvalidId { value: String },

    /// Attribute not declared on the resource
    UnknownAttribute { name: String },

    /// Relationship not declared on the resource
    UnknownRelationship { name: String },

    /// Field is not in the writable whitelist
    NotWritable { name: String },

    /// Attribute value has the wrong type
    InvalidAttributeValue { name: String, message: String },

    /// Relationship linkage is malformed
    InvalidRelationship { name: String, message: String },

    /// Filter name is not declared filterable
    UnsupportedFilter { name: String },

    /// Filter value cannot be parsed
    InvalidFilterValue { name: String, value: String },

    /// Sort key is not declared sortable
    UnsupportedSort { name: String },

    /// Any other malformed query parameter
    InvalidParameter { parameter: String, message: String },

    /// Unknown path
    NotFound { path: String },

    /// Unknown resource id
    ResourceNotFound { resource_type: String, id: String },

    /// Method not supported on the path
    MethodNotAllowed { method: String, path: String },

    /// Listing is disabled for the resource
    ListingDisabled { resource_type: String },
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestError::InvalidBody { message } => write!(f, "Invalid request body: {}", message),
            RequestError::PayloadTooLarge { limit } => {
                write!(f, "Request body exceeds the limit of {} bytes", limit)
            }
            RequestError::ResourceTypeMismatch { expected, found } => write!(
                f,
                "Resource type mismatch: expected '{}', found '{}'",
                expected, found
            ),
            RequestError::ResourceIdMismatch { expected, found } => write!(
                f,
                "Resource id mismatch: expected '{}', found '{}'",
                expected, found
            ),
            RequestError::UnnecessaryId => write!(f, "Unnecessary resource id"),
            RequestError::MissingId => write!(f, "Missing resource id"),
            RequestError::InvalidId { value } => write!(f, "Invalid resource id: '{}'", value),
            RequestError::UnknownAttribute { name } => write!(f, "Unknown attribute '{}'", name),
            RequestError::UnknownRelationship { name } => {
                write!(f, "Unknown relationship '{}'", name)
            }
            RequestError::NotWritable { name } => write!(f, "Field '{}' is not writable", name),
            RequestError::InvalidAttributeValue { name, message } => {
                write!(f, "Invalid value for attribute '{}': {}", name, message)
            }
            RequestError::InvalidRelationship { name, message } => {
                write!(f, "Invalid relationship '{}': {}", name, message)
            }
            RequestError::UnsupportedFilter { name } => write!(f, "Unsupported filter '{}'", name),
            RequestError::InvalidFilterValue { name, value } => {
                write!(f, "Invalid value '{}' for filter '{}'", value, name)
            }
            RequestError::UnsupportedSort { name } => write!(f, "Unsupported sort key '{}'", name),
            RequestError::InvalidParameter { parameter, message } => {
                write!(f, "Invalid parameter '{}': {}", parameter, message)
            }
            RequestError::NotFound { path } => write!(f, "Path '{}' not found", path),
            RequestError::ResourceNotFound { resource_type, id } => {
                write!(f, "{} with id '{}' not found", resource_type, id)
            }
            RequestError::MethodNotAllowed { method, path } => {
                write!(f, "Method {} not allowed on {}", method, path)
            }
            RequestError::ListingDisabled { resource_type } => {
                write!(f, "Listing is disabled for '{}'", resource_type)
            }
        }
    }
}

impl std::error::Error for RequestError {}

impl RequestError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RequestError::NotFound { .. } | RequestError::ResourceNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            RequestError::MethodNotAllowed { .. } | RequestError::ListingDisabled { .. } => {
                StatusCode::METHOD_NOT_ALLOWED
            }
            RequestError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            RequestError::InvalidBody { .. } => "INVALID_BODY",
            RequestError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            RequestError::ResourceTypeMismatch { .. } => "RESOURCE_TYPE_MISMATCH",
            RequestError::ResourceIdMismatch { .. } => "RESOURCE_ID_MISMATCH",
            RequestError::UnnecessaryId => "UNNECESSARY_RESOURCE_ID",
            RequestError::MissingId => "MISSING_RESOURCE_ID",
            RequestError::InvalidId { .. } => "INVALID_RESOURCE_ID",
            RequestError::UnknownAttribute { .. } => "UNKNOWN_ATTRIBUTE",
            RequestError::UnknownRelationship { .. } => "UNKNOWN_RELATIONSHIP",
            RequestError::NotWritable { .. } => "FIELD_NOT_WRITABLE",
            RequestError::InvalidAttributeValue { .. } => "INVALID_ATTRIBUTE_VALUE",
            RequestError::InvalidRelationship { .. } => "INVALID_RELATIONSHIP",
            RequestError::UnsupportedFilter { .. } => "UNSUPPORTED_FILTER",
            RequestError::InvalidFilterValue { .. } => "INVALID_FILTER_VALUE",
            RequestError::UnsupportedSort { .. } => "UNSUPPORTED_SORT",
            RequestError::InvalidParameter { .. } => "INVALID_PARAMETER",
            RequestError::NotFound { .. } => "NOT_FOUND",
            RequestError::ResourceNotFound { .. } => "RESOURCE_NOT_FOUND",
            RequestError::MethodNotAllowed { .. } => "METHOD_NOT_ALLOWED",
            RequestError::ListingDisabled { .. } => "LISTING_DISABLED",
        }
    }

    /// Point the client at the offending part of the request
    fn source_hint(&self) -> Option<ErrorSource> {
        let pointer = |p: String| {
            Some(ErrorSource {
                pointer: Some(p),
                parameter: None,
            })
        };
        let parameter = |p: String| {
            Some(ErrorSource {
                pointer: None,
                parameter: Some(p),
            })
        };

        match self {
            RequestError::ResourceTypeMismatch { .. } => pointer("/data/type".to_string()),
            RequestError::ResourceIdMismatch { .. }
            | RequestError::UnnecessaryId
            | RequestError::MissingId => pointer("/data/id".to_string()),
            RequestError::UnknownAttribute { name }
            | RequestError::InvalidAttributeValue { name, .. } => {
                pointer(format!("/data/attributes/{}", name))
            }
            RequestError::UnknownRelationship { name }
            | RequestError::InvalidRelationship { name, .. } => {
                pointer(format!("/data/relationships/{}", name))
            }
            RequestError::UnsupportedFilter { name }
            | RequestError::InvalidFilterValue { name, .. } => parameter(format!("filter[{}]", name)),
            RequestError::UnsupportedSort { .. } => parameter("sort".to_string()),
            RequestError::InvalidParameter { parameter: p, .. } => parameter(p.clone()),
            _ => None,
        }
    }
}

impl From<RequestError> for Error {
    fn from(err: RequestError) -> Self {
        Error::Request(err)
    }
}

// =============================================================================
// Callback Errors
// =============================================================================

/// Errors returned by callbacks and action handlers
#[derive(Debug, thiserror::Error)]
pub enum CallbackError {
    /// A user facing failure, its message is sent to the client
    #[error("{0}")]
    Safe(String),

    /// Any other failure, never shown to the client
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl CallbackError {
    /// Create a safe error with a client facing message
    pub fn safe(message: impl Into<String>) -> Self {
        CallbackError::Safe(message.into())
    }

    pub fn is_safe(&self) -> bool {
        matches!(self, CallbackError::Safe(_))
    }
}

impl From<StorageError> for CallbackError {
    fn from(err: StorageError) -> Self {
        CallbackError::Internal(anyhow::Error::new(err))
    }
}

impl From<Error> for CallbackError {
    fn from(err: Error) -> Self {
        CallbackError::Internal(anyhow::Error::new(err))
    }
}

// =============================================================================
// Storage Errors
// =============================================================================

/// Errors raised by store implementations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A lock guarding in-process data was poisoned
    #[error("Failed to acquire {kind} lock: {message}")]
    Lock { kind: &'static str, message: String },

    /// Query execution error
    #[error("{backend} query error: {message}")]
    Query { backend: String, message: String },

    /// Transaction error
    #[error("Transaction error: {message}")]
    Transaction { message: String },

    /// Document could not be (de)serialized
    #[error("Invalid document: {message}")]
    InvalidDocument { message: String },
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        Error::Storage(err)
    }
}

// =============================================================================
// Config Errors
// =============================================================================

/// Errors detected while registering controllers and actions
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Controller '{name}' is already registered")]
    DuplicateController { name: String },

    #[error("Action '{name}' is already registered on '{scope}'")]
    DuplicateAction { scope: String, name: String },

    #[error("Field '{field}' is declared twice on '{resource}'")]
    DuplicateField { resource: String, field: String },

    #[error("Relationship '{resource}.{field}' targets unknown resource '{target}'")]
    UnknownTarget {
        resource: String,
        field: String,
        target: String,
    },

    #[error(
        "Relationship '{resource}.{field}' has no inverse '{inverse}' on '{target}' pointing back"
    )]
    MissingInverse {
        resource: String,
        field: String,
        target: String,
        inverse: String,
    },

    #[error("Soft delete field '{field}' is not declared on '{resource}'")]
    MissingSoftDeleteField { resource: String, field: String },

    #[error("Soft delete field '{field}' on '{resource}' must be a timestamp attribute")]
    InvalidSoftDeleteField { resource: String, field: String },

    #[error("Action '{action}' on '{resource}' collides with a relationship name")]
    ActionCollision { resource: String, action: String },

    #[error("Unknown authorization policy '{policy}'")]
    InvalidPolicy { policy: String },

    #[error("Configuration references unknown resource '{name}'")]
    UnknownResource { name: String },

    #[error("Failed to parse config{}: {message}", file.as_ref().map(|f| format!(" file '{}'", f)).unwrap_or_default())]
    Parse {
        file: Option<String>,
        message: String,
    },

    #[error("IO error: {message}")]
    Io { message: String },
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::Parse {
            file: None,
            message: err.to_string(),
        }
    }
}

// =============================================================================
// Result type alias
// =============================================================================

/// A specialized Result type for pipeline operations
pub type Result<T, E = Error> = std::result::Result<T, E>;
