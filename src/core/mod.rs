//! Core module containing the fundamental types of the engine

pub mod auth;
pub mod callback;
pub mod context;
pub mod error;
pub mod meta;
pub mod operation;
pub mod query;
pub mod record;
pub mod store;

pub use auth::{AuthContext, AuthPolicy};
pub use callback::{Action, ActionHandler, Callback, Handler};
pub use context::{Context, Request};
pub use error::{CallbackError, ConfigError, Error, RequestError, StorageError};
pub use meta::{AttrType, Field, FieldKind, Meta};
pub use operation::{Intent, Operation, Stage};
pub use query::{Condition, Filter, Pagination, Query, SortKey};
pub use record::{ID_KEY, Model, Record};
pub use store::{Collection, Store, Transaction};
