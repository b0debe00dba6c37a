//! # This JSON:API
//!
//! A declarative JSON:API resource engine for axum.
//!
//! ## Features
//!
//! - **Declarative resources**: describe fields and relationships once with [`Meta`](core::Meta)
//! - **Full JSON:API surface**: CRUD, relationship endpoints, related resources, sparse fieldsets, filters, sorting, pagination
//! - **Callback pipeline**: authorizers, validators, decorators and notifiers around every request
//! - **Whitelists**: per request readable and writable fields, narrowed by authorizers
//! - **Derived relationships**: has-one and has-many resolved from the inverse side with batched preloading
//! - **Soft delete**: optional timestamp field hiding deleted resources
//! - **Custom actions**: collection, resource and group level endpoints
//! - **Pluggable storage**: any document store implementing [`Store`](core::Store)
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use this_jsonapi::prelude::*;
//!
//! let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
//!
//! let users = Meta::new("users")
//!     .field(Field::attribute("name", AttrType::String).filterable().sortable())
//!     .field(Field::has_many("posts", "posts", "author"));
//!
//! let posts = Meta::new("posts")
//!     .field(Field::attribute("title", AttrType::String).sortable())
//!     .field(Field::to_one("author", "users").store_key("author_id"))
//!     .field(Field::attribute("deleted_at", AttrType::Timestamp))
//!     .soft_delete("deleted_at");
//!
//! let group = GroupBuilder::new()
//!     .prefix("/api")
//!     .controller(Controller::new(users, store.clone()))?
//!     .controller(
//!         Controller::new(posts, store.clone())
//!             .validator(attribute_validator("title", vec![required(), string_length(1, 200)]))
//!             .list_limit(50),
//!     )?
//!     .build()?;
//!
//! group.serve("127.0.0.1:3000").await?;
//! ```

pub mod callbacks;
pub mod config;
pub mod controller;
pub mod core;
pub mod group;
pub mod jsonapi;
pub mod storage;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Core ===
    pub use crate::core::{
        Action, ActionHandler, AttrType, AuthContext, AuthPolicy, Callback, CallbackError,
        Collection, Condition, ConfigError, Context, Error, Field, FieldKind, Filter, Handler,
        Intent, Meta, Model, Operation, Pagination, Query, Record, Request, RequestError,
        SortKey, Stage, StorageError, Store, Transaction,
    };

    // === Engine ===
    pub use crate::controller::Controller;
    pub use crate::group::{Group, GroupBuilder};

    // === Built-in callbacks ===
    pub use crate::callbacks::normalizers::{lowercase, round_decimals, trim, uppercase};
    pub use crate::callbacks::validators::{
        format, in_list, max_value, positive, required, string_length,
    };
    pub use crate::callbacks::{
        FieldFormat, attribute_normalizer, attribute_validator, dependent_resources_validator,
        hidden_fields_authorizer, owner_authorizer, policy_authorizer,
        protected_fields_authorizer, timestamp_validator, unique_attribute_validator,
        verify_references_validator,
    };

    // === Wire format ===
    pub use crate::jsonapi::{Document, MEDIA_TYPE, Params, Resource};

    // === Storage ===
    pub use crate::storage::InMemoryStore;

    // === Config ===
    pub use crate::config::{ApiConfig, ResourceConfig};

    // === External dependencies ===
    pub use async_trait::async_trait;
    pub use axum::http::Method;
    pub use serde::{Deserialize, Serialize};
    pub use serde_json::{Value, json};
    pub use std::sync::Arc;
    pub use uuid::Uuid;
}
