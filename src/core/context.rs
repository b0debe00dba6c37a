//! Per-request state shared by the pipeline stages

use axum::body::Bytes;
use axum::http::{Extensions, HeaderMap, Method, StatusCode, Uri};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use crate::core::auth::AuthContext;
use crate::core::error::{CallbackError, Error, Result};
use crate::core::meta::Meta;
use crate::core::operation::{Intent, Operation, Stage};
use crate::core::query::{Condition, Filter, SortKey};
use crate::core::record::{ID_KEY, Record};
use crate::core::store::{Collection, Store, Transaction};
use crate::jsonapi::{Document, Params};

/// The incoming request with its body already read
#[derive(Debug)]
pub struct Request {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub extensions: Extensions,
    pub body: Bytes,
}

/// State of one request as it moves through a controller
///
/// Callbacks receive the context mutably: authorizers typically narrow the
/// whitelists or push extra filters, validators inspect and adjust `model`,
/// decorators and notifiers observe the loaded data and the response.
pub struct Context {
    pub operation: Operation,
    pub intent: Intent,

    /// Base conditions by store key, always holds `_id` for single resources
    pub selector: IndexMap<String, Condition>,

    /// Extra filters, ANDed with the selector
    pub filters: Vec<Filter>,

    pub sorting: Vec<SortKey>,

    /// Field names the client may read
    pub readable_fields: Vec<String>,

    /// Field names the client may write
    pub writable_fields: Vec<String>,

    /// Subject of single resource operations
    pub model: Option<Record>,

    /// Loaded page of a list
    pub models: Vec<Record>,

    pub response: Option<Document>,
    pub response_code: StatusCode,
    pub response_headers: HeaderMap,

    pub request: Arc<Request>,
    pub params: Params,

    /// Path id of single resource operations
    pub resource_id: Option<Uuid>,

    /// Stage currently running callbacks
    pub stage: Option<Stage>,

    meta: Arc<Meta>,
    store: Arc<dyn Store>,
    original: Option<Option<Record>>,
}

impl Context {
    pub(crate) fn new(
        meta: Arc<Meta>,
        store: Arc<dyn Store>,
        request: Arc<Request>,
        params: Params,
        intent: Intent,
    ) -> Self {
        let mut selector = IndexMap::new();
        if let Some(field) = meta.soft_delete_field() {
            selector.insert(field.store_key.clone(), Condition::Null);
        }

        Self {
            operation: intent.operation(),
            intent,
            selector,
            filters: Vec::new(),
            sorting: Vec::new(),
            readable_fields: meta.readable_fields(),
            writable_fields: meta.writable_fields(),
            model: None,
            models: Vec::new(),
            response: None,
            response_code: StatusCode::OK,
            response_headers: HeaderMap::new(),
            request,
            params,
            resource_id: None,
            stage: None,
            meta,
            store,
            original: None,
        }
    }

    /// Context of the target controller during a relationship traversal
    pub(crate) fn derive(
        &self,
        meta: Arc<Meta>,
        store: Arc<dyn Store>,
        operation: Operation,
    ) -> Self {
        let mut child = Self::new(
            meta,
            store,
            self.request.clone(),
            self.params.clone(),
            Intent::GetRelatedResources,
        );
        child.operation = operation;
        child
    }

    /// Route storage access through an open transaction
    pub(crate) fn enter(&mut self, transaction: &dyn Transaction) {
        self.store = transaction.store();
    }

    /// Target a single resource
    pub(crate) fn select(&mut self, id: Uuid) {
        self.resource_id = Some(id);
        self.selector
            .insert(ID_KEY.to_string(), Condition::Eq(Value::String(id.to_string())));
    }

    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    pub(crate) fn meta_arc(&self) -> &Arc<Meta> {
        &self.meta
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Collection of the controller's resource
    pub fn collection(&self) -> Arc<dyn Collection> {
        self.store.collection(&self.meta.collection)
    }

    /// Selector and extra filters as one filter
    pub fn query(&self) -> Filter {
        let mut filters: Vec<Filter> = self
            .selector
            .iter()
            .map(|(key, condition)| Filter::Field(key.clone(), condition.clone()))
            .collect();
        filters.extend(self.filters.iter().cloned());
        Filter::And(filters)
    }

    /// Caller identity set by an upstream layer
    pub fn auth(&self) -> AuthContext {
        AuthContext::from_extensions(&self.request.extensions)
    }

    pub fn extension<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.request.extensions.get::<T>()
    }

    /// Attribute or relationship value of the subject by field name
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        let field = self.meta.get(name)?;
        self.model.as_ref()?.get(&field.store_key)
    }

    /// Set a value on the subject by field name
    pub fn set_attribute(&mut self, name: &str, value: Value) -> Result<(), CallbackError> {
        let field = self
            .meta
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("unknown field '{}' on '{}'", name, self.meta.name))?;
        let key = field.store_key.clone();
        let model = self
            .model
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("no subject loaded for {}", self.operation))?;
        model.set(key, value);
        Ok(())
    }

    /// Decode the subject into a typed model
    pub fn model_as<M: DeserializeOwned>(&self) -> Result<Option<M>, CallbackError> {
        self.model
            .as_ref()
            .map(|record| record.decode::<M>())
            .transpose()
            .map_err(|e| CallbackError::Internal(e.into()))
    }

    /// Stored version of the subject before the update, fetched on first use
    pub async fn original(&mut self) -> Result<Option<&Record>> {
        if self.operation != Operation::Update {
            return Err(Error::Internal(format!(
                "original is only available during update, not {}",
                self.operation
            )));
        }
        if self.original.is_none() {
            let id = self
                .resource_id
                .ok_or_else(|| Error::Internal("update without resource id".to_string()))?;
            let found = self
                .collection()
                .find_one(&Filter::eq(ID_KEY, id.to_string()))
                .await?;
            self.original = Some(found);
        }
        Ok(self.original.as_ref().and_then(Option::as_ref))
    }

    /// Keep only the listed readable fields
    pub fn narrow_readable(&mut self, names: &[&str]) {
        self.readable_fields.retain(|f| names.contains(&f.as_str()));
    }

    /// Keep only the listed writable fields
    pub fn narrow_writable(&mut self, names: &[&str]) {
        self.writable_fields.retain(|f| names.contains(&f.as_str()));
    }

    pub fn is_readable(&self, name: &str) -> bool {
        self.readable_fields.iter().any(|f| f == name)
    }

    pub fn is_writable(&self, name: &str) -> bool {
        self.writable_fields.iter().any(|f| f == name)
    }
}
