//! Resource controller: the request state machine of one resource
//!
//! A controller maps every wire intent onto store operations and runs the four
//! callback stages around them:
//!
//! ```text
//! Authorize -> Load / Assign -> Validate -> Persist -> Decorate -> Notify -> Encode
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! let posts = Controller::new(posts_meta(), store.clone())
//!     .authorizer(policy_authorizer("authenticated", AuthPolicy::Authenticated))
//!     .validator(attribute_validator("title", vec![required(), string_length(1, 200)]))
//!     .list_limit(50)
//!     .soft_protection(true);
//! ```

mod assign;
mod params;
mod preload;
mod render;

use axum::http::header::{CONTENT_TYPE, LOCATION};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use indexmap::IndexMap;
use serde_json::Value;
use std::slice;
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::ResourceConfig;
use crate::core::callback::{Action, Callback};
use crate::core::context::{Context, Request};
use crate::core::error::{ConfigError, Error, RequestError, Result};
use crate::core::meta::{Field, FieldKind, Meta};
use crate::core::operation::{Intent, Operation, Stage};
use crate::core::query::{Condition, Pagination, Query};
use crate::core::record::{ID_KEY, Model, Record};
use crate::core::store::{Collection, Store, Transaction};
use crate::group::Group;
use crate::jsonapi::{Document, LinkageDocument, Links, MEDIA_TYPE, Params, Resource, ResourceDocument};

use render::Renderer;

/// Path segment reserved for relationship endpoints
const RELATIONSHIPS: &str = "relationships";

/// Controller of one resource type
pub struct Controller {
    meta: Arc<Meta>,
    store: Arc<dyn Store>,
    authorizers: Vec<Callback>,
    validators: Vec<Callback>,
    decorators: Vec<Callback>,
    notifiers: Vec<Callback>,
    collection_actions: IndexMap<String, Action>,
    resource_actions: IndexMap<String, Action>,
    soft_protection: bool,
    list_limit: Option<u64>,
    disable_listing: bool,
    use_transactions: bool,
    errors: Vec<ConfigError>,
}

impl Controller {
    pub fn new(meta: Meta, store: Arc<dyn Store>) -> Self {
        Self {
            meta: Arc::new(meta),
            store,
            authorizers: Vec::new(),
            validators: Vec::new(),
            decorators: Vec::new(),
            notifiers: Vec::new(),
            collection_actions: IndexMap::new(),
            resource_actions: IndexMap::new(),
            soft_protection: false,
            list_limit: None,
            disable_listing: false,
            use_transactions: false,
            errors: Vec::new(),
        }
    }

    /// Controller for a typed model
    pub fn for_model<M: Model>(store: Arc<dyn Store>) -> Self {
        Self::new(M::meta(), store)
    }

    pub fn authorizer(mut self, callback: Callback) -> Self {
        self.authorizers.push(callback);
        self
    }

    pub fn validator(mut self, callback: Callback) -> Self {
        self.validators.push(callback);
        self
    }

    pub fn decorator(mut self, callback: Callback) -> Self {
        self.decorators.push(callback);
        self
    }

    pub fn notifier(mut self, callback: Callback) -> Self {
        self.notifiers.push(callback);
        self
    }

    /// Action on the collection, served at `/{type}/{name}`
    pub fn collection_action(mut self, name: impl Into<String>, action: Action) -> Self {
        let name = name.into();
        if self.collection_actions.contains_key(&name) {
            self.errors.push(ConfigError::DuplicateAction {
                scope: self.meta.name.clone(),
                name,
            });
        } else {
            self.collection_actions.insert(name, action);
        }
        self
    }

    /// Action on a resource, served at `/{type}/{id}/{name}`
    pub fn resource_action(mut self, name: impl Into<String>, action: Action) -> Self {
        let name = name.into();
        if self.resource_actions.contains_key(&name) {
            self.errors.push(ConfigError::DuplicateAction {
                scope: self.meta.name.clone(),
                name,
            });
        } else {
            self.resource_actions.insert(name, action);
        }
        self
    }

    /// Silently drop non-writable fields on create and update
    pub fn soft_protection(mut self, enabled: bool) -> Self {
        self.soft_protection = enabled;
        self
    }

    /// Force pagination with at most `limit` items per page
    pub fn list_limit(mut self, limit: u64) -> Self {
        self.list_limit = Some(limit.max(1));
        self
    }

    pub fn disable_listing(mut self, disabled: bool) -> Self {
        self.disable_listing = disabled;
        self
    }

    /// Run mutations inside a store transaction when the store has them
    pub fn use_transactions(mut self, enabled: bool) -> Self {
        self.use_transactions = enabled;
        self
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    pub fn collection(&self) -> Arc<dyn Collection> {
        self.store.collection(&self.meta.collection)
    }

    pub(crate) fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub(crate) fn configure(&mut self, config: &ResourceConfig) {
        if let Some(limit) = config.list_limit {
            self.list_limit = Some(limit.max(1));
        }
        if let Some(enabled) = config.soft_protection {
            self.soft_protection = enabled;
        }
        if let Some(disabled) = config.disable_listing {
            self.disable_listing = disabled;
        }
        if let Some(enabled) = config.use_transactions {
            self.use_transactions = enabled;
        }
    }

    pub(crate) fn apply_default_list_limit(&mut self, limit: u64) {
        self.list_limit.get_or_insert(limit.max(1));
    }

    /// Check what can be checked without the other controllers
    pub(crate) fn check(&self) -> Result<(), ConfigError> {
        if let Some(error) = self.errors.first() {
            return Err(error.clone());
        }
        self.meta.validate()?;

        for name in self.resource_actions.keys() {
            if name == RELATIONSHIPS || self.meta.by_json_key(name).is_some_and(Field::is_relationship) {
                return Err(ConfigError::ActionCollision {
                    resource: self.meta.name.clone(),
                    action: name.clone(),
                });
            }
        }
        Ok(())
    }

    fn context(&self, request: Arc<Request>, params: Params, intent: Intent) -> Context {
        Context::new(self.meta.clone(), self.store.clone(), request, params, intent)
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Serve a request whose path was split after the resource name
    pub(crate) async fn handle(
        &self,
        group: &Group,
        request: Arc<Request>,
        segments: &[&str],
    ) -> Result<Response> {
        let params = Params::from_uri(&request.uri)?;
        let method = request.method.clone();

        let not_allowed = || {
            Error::from(RequestError::MethodNotAllowed {
                method: method.to_string(),
                path: request.uri.path().to_string(),
            })
        };
        let not_found = || {
            Error::from(RequestError::NotFound {
                path: request.uri.path().to_string(),
            })
        };

        let (intent, id, relationship) = match segments {
            [] => match method {
                Method::GET if self.disable_listing => {
                    return Err(RequestError::ListingDisabled {
                        resource_type: self.meta.name.clone(),
                    }
                    .into());
                }
                Method::GET => (Intent::ListResources, None, None),
                Method::POST => (Intent::CreateResource, None, None),
                _ => return Err(not_allowed()),
            },
            [name] if self.collection_actions.contains_key(*name) => {
                return self.dispatch_collection_action(request.clone(), params, name).await;
            }
            [id] => {
                let id = parse_path_id(id)?;
                match method {
                    Method::GET => (Intent::FindResource, Some(id), None),
                    Method::PATCH => (Intent::UpdateResource, Some(id), None),
                    Method::DELETE => (Intent::DeleteResource, Some(id), None),
                    _ => return Err(not_allowed()),
                }
            }
            [id, name] if self.resource_actions.contains_key(*name) => {
                let id = parse_path_id(id)?;
                return self.dispatch_resource_action(request.clone(), params, id, name).await;
            }
            [id, key] => {
                let id = parse_path_id(id)?;
                let field = self.relationship(key).ok_or_else(not_found)?;
                match method {
                    Method::GET => (Intent::GetRelatedResources, Some(id), Some(field)),
                    _ => return Err(not_allowed()),
                }
            }
            [id, RELATIONSHIPS, key] => {
                let id = parse_path_id(id)?;
                let field = self.relationship(key).ok_or_else(not_found)?;
                let intent = match method {
                    Method::GET => Intent::GetRelationship,
                    Method::PATCH => Intent::SetRelationship,
                    Method::POST => Intent::AppendToRelationship,
                    Method::DELETE => Intent::RemoveFromRelationship,
                    _ => return Err(not_allowed()),
                };
                (intent, Some(id), Some(field))
            }
            _ => return Err(not_found()),
        };

        let mut ctx = self.context(request.clone(), params, intent);
        if let Some(id) = id {
            ctx.select(id);
        }

        let span = tracing::debug_span!("intent", resource = %self.meta.name, %intent);
        async {
            let transaction = self.begin(intent).await?;
            if let Some(transaction) = &transaction {
                ctx.enter(transaction.as_ref());
            }
            let result = self.run(group, &mut ctx, relationship).await;
            finish(transaction, result).await?;
            respond(ctx)
        }
        .instrument(span)
        .await
    }

    fn relationship(&self, key: &str) -> Option<&Field> {
        self.meta.by_json_key(key).filter(|f| f.is_relationship())
    }

    async fn begin(&self, intent: Intent) -> Result<Option<Box<dyn Transaction>>> {
        if intent.is_mutation() && self.use_transactions {
            Ok(self.store.begin().await?)
        } else {
            Ok(None)
        }
    }

    async fn run(&self, group: &Group, ctx: &mut Context, relationship: Option<&Field>) -> Result<()> {
        match (ctx.intent, relationship) {
            (Intent::ListResources, _) => self.list(group, ctx).await,
            (Intent::FindResource, _) => self.find(group, ctx).await,
            (Intent::CreateResource, _) => self.create(group, ctx).await,
            (Intent::UpdateResource, _) => self.update(group, ctx).await,
            (Intent::DeleteResource, _) => self.delete(ctx).await,
            (Intent::GetRelatedResources, Some(field)) => self.get_related(group, ctx, field).await,
            (Intent::GetRelationship, Some(field)) => self.get_relationship(group, ctx, field).await,
            (
                Intent::SetRelationship
                | Intent::AppendToRelationship
                | Intent::RemoveFromRelationship,
                Some(field),
            ) => self.update_relationship(group, ctx, field).await,
            (intent, _) => Err(Error::Internal(format!(
                "intent {} cannot run on '{}'",
                intent, self.meta.name
            ))),
        }
    }

    // =========================================================================
    // Stages
    // =========================================================================

    async fn run_stage(&self, stage: Stage, ctx: &mut Context) -> Result<()> {
        let callbacks = match stage {
            Stage::Authorizer => &self.authorizers,
            Stage::Validator => &self.validators,
            Stage::Decorator => &self.decorators,
            Stage::Notifier => &self.notifiers,
            Stage::Action => return Ok(()),
        };

        ctx.stage = Some(stage);
        let span = tracing::debug_span!("stage", %stage, operation = %ctx.operation);
        let result = async {
            for callback in callbacks {
                if !callback.matches(ctx) {
                    continue;
                }
                tracing::trace!(callback = callback.name(), "running callback");
                callback.run(ctx).await.map_err(|error| Error::Callback {
                    stage,
                    callback: callback.name().to_string(),
                    error,
                })?;
            }
            Ok(())
        }
        .instrument(span)
        .await;
        ctx.stage = None;
        result
    }

    /// Run the authorizers, then clamp the whitelists to the declared fields
    async fn authorize(&self, ctx: &mut Context) -> Result<()> {
        self.run_stage(Stage::Authorizer, ctx).await?;

        let readable = self.meta.readable_fields();
        let writable = self.meta.writable_fields();
        ctx.readable_fields.retain(|f| readable.contains(f));
        ctx.writable_fields.retain(|f| writable.contains(f));
        Ok(())
    }

    /// Fetch the subject selected by the context
    async fn load(&self, ctx: &mut Context) -> Result<()> {
        let record = ctx
            .collection()
            .find_one(&ctx.query())
            .await?
            .ok_or_else(|| RequestError::ResourceNotFound {
                resource_type: self.meta.name.clone(),
                id: ctx.resource_id.map(|id| id.to_string()).unwrap_or_default(),
            })?;
        ctx.model = Some(record);
        Ok(())
    }

    fn parse_resource(&self, ctx: &Context) -> Result<Resource> {
        let document: ResourceDocument =
            serde_json::from_slice(&ctx.request.body).map_err(|e| RequestError::InvalidBody {
                message: e.to_string(),
            })?;
        if document.data.resource_type != self.meta.name {
            return Err(RequestError::ResourceTypeMismatch {
                expected: self.meta.name.clone(),
                found: document.data.resource_type,
            }
            .into());
        }
        Ok(document.data)
    }

    /// Render the subject as the response document
    async fn render_model(&self, group: &Group, ctx: &mut Context) -> Result<()> {
        let record = subject(ctx)?;
        let fields = render::visible_fields(&self.meta, &ctx.readable_fields, &ctx.params);
        let related = preload::preload(group, &self.meta.name, &fields, slice::from_ref(record)).await?;
        let resource = Renderer::new(group.prefix(), &self.meta, &fields, &related).resource(record);

        let mut document = Document::single(resource);
        document.links = document
            .resource()
            .and_then(|r| r.links.as_ref())
            .and_then(|l| l.self_link.clone())
            .map(Links::to_self);
        ctx.response = Some(document);
        Ok(())
    }

    /// Render one relationship of the subject as a linkage document
    async fn render_linkage(&self, group: &Group, ctx: &mut Context, field: &Field) -> Result<()> {
        let record = subject(ctx)?;
        let fields = [field];
        let related = preload::preload(group, &self.meta.name, &fields, slice::from_ref(record)).await?;
        let linkage = Renderer::new(group.prefix(), &self.meta, &fields, &related)
            .linkage(field, record)
            .ok_or_else(|| Error::Internal(format!("no linkage for '{}'", field.name)))?;
        let links = render::relationship_links(
            group.prefix(),
            &self.meta.name,
            &record.id.to_string(),
            &field.json_key,
        );
        ctx.response = Some(Document::linkage(linkage, links));
        Ok(())
    }

    async fn persist(&self, ctx: &mut Context) -> Result<()> {
        let record = subject(ctx)?;
        if !ctx.collection().replace(record).await? {
            return Err(RequestError::ResourceNotFound {
                resource_type: self.meta.name.clone(),
                id: record.id.to_string(),
            }
            .into());
        }
        Ok(())
    }

    // =========================================================================
    // Intents
    // =========================================================================

    async fn list(&self, group: &Group, ctx: &mut Context) -> Result<()> {
        let filters = params::filters(&self.meta, &ctx.params)?;
        ctx.filters.extend(filters);
        ctx.sorting = params::sorting(&self.meta, &ctx.params)?;
        let page = params::page(&ctx.params, self.list_limit)?;

        self.authorize(ctx).await?;

        let collection = ctx.collection();
        let filter = ctx.query();
        let pagination = match page {
            Some((number, size)) => Some(Pagination::new(number, size, collection.count(&filter).await?)),
            None => None,
        };
        let mut query = Query::new(filter).sort(ctx.sorting.clone());
        if let Some(page) = pagination {
            query = query.skip(page.offset()).limit(page.size);
        }
        ctx.models = collection.find(&query).await?;

        self.run_stage(Stage::Decorator, ctx).await?;

        let fields = render::visible_fields(&self.meta, &ctx.readable_fields, &ctx.params);
        let related = preload::preload(group, &self.meta.name, &fields, &ctx.models).await?;
        let resources = Renderer::new(group.prefix(), &self.meta, &fields, &related).resources(&ctx.models);
        let links = render::collection_links(ctx.request.uri.path(), &ctx.params, pagination);
        ctx.response = Some(Document::collection(resources, links));

        self.run_stage(Stage::Notifier, ctx).await
    }

    async fn find(&self, group: &Group, ctx: &mut Context) -> Result<()> {
        self.authorize(ctx).await?;
        self.load(ctx).await?;
        self.run_stage(Stage::Decorator, ctx).await?;
        self.render_model(group, ctx).await?;
        self.run_stage(Stage::Notifier, ctx).await
    }

    async fn create(&self, group: &Group, ctx: &mut Context) -> Result<()> {
        let resource = self.parse_resource(ctx)?;
        if resource.id.is_some() {
            return Err(RequestError::UnnecessaryId.into());
        }

        self.authorize(ctx).await?;

        let mut record = Record::zero(&self.meta);
        assign::assign(
            &self.meta,
            &ctx.writable_fields,
            self.soft_protection,
            &mut record,
            &resource,
        )?;
        ctx.model = Some(record);

        self.run_stage(Stage::Validator, ctx).await?;

        let record = subject(ctx)?;
        ctx.collection().insert(record).await?;
        let id = record.id;
        ctx.resource_id = Some(id);
        tracing::debug!(resource = %self.meta.name, %id, "resource created");

        self.run_stage(Stage::Decorator, ctx).await?;
        self.render_model(group, ctx).await?;

        let location = render::resource_link(group.prefix(), &self.meta.name, &id.to_string());
        let location = HeaderValue::from_str(&location)
            .map_err(|e| Error::Internal(format!("invalid location header: {}", e)))?;
        ctx.response_headers.insert(LOCATION, location);
        ctx.response_code = StatusCode::CREATED;

        self.run_stage(Stage::Notifier, ctx).await
    }

    async fn update(&self, group: &Group, ctx: &mut Context) -> Result<()> {
        let resource = self.parse_resource(ctx)?;
        let expected = ctx
            .resource_id
            .ok_or_else(|| Error::Internal("update without resource id".to_string()))?;
        match &resource.id {
            None => return Err(RequestError::MissingId.into()),
            Some(found) if Uuid::parse_str(found).ok() != Some(expected) => {
                return Err(RequestError::ResourceIdMismatch {
                    expected: expected.to_string(),
                    found: found.clone(),
                }
                .into());
            }
            Some(_) => {}
        }

        self.authorize(ctx).await?;
        self.load(ctx).await?;

        let mut record = ctx.model.take().ok_or_else(missing_subject)?;
        assign::assign(
            &self.meta,
            &ctx.writable_fields,
            self.soft_protection,
            &mut record,
            &resource,
        )?;
        ctx.model = Some(record);

        self.run_stage(Stage::Validator, ctx).await?;
        self.persist(ctx).await?;
        self.run_stage(Stage::Decorator, ctx).await?;
        self.render_model(group, ctx).await?;
        self.run_stage(Stage::Notifier, ctx).await
    }

    async fn delete(&self, ctx: &mut Context) -> Result<()> {
        self.authorize(ctx).await?;
        self.load(ctx).await?;
        self.run_stage(Stage::Validator, ctx).await?;

        match self.meta.soft_delete_field() {
            Some(field) => {
                let mut record = ctx.model.take().ok_or_else(missing_subject)?;
                record.set(field.store_key.clone(), Value::String(Utc::now().to_rfc3339()));
                ctx.model = Some(record);
                self.persist(ctx).await?;
            }
            None => {
                let id = subject(ctx)?.id;
                ctx.collection().remove(id).await?;
            }
        }
        tracing::debug!(resource = %self.meta.name, id = ?ctx.resource_id, "resource deleted");

        ctx.response = None;
        ctx.response_code = StatusCode::NO_CONTENT;
        self.run_stage(Stage::Notifier, ctx).await
    }

    async fn get_relationship(&self, group: &Group, ctx: &mut Context, field: &Field) -> Result<()> {
        self.authorize(ctx).await?;
        self.ensure_readable(ctx, field)?;
        self.load(ctx).await?;
        self.run_stage(Stage::Decorator, ctx).await?;
        self.render_linkage(group, ctx, field).await?;
        self.run_stage(Stage::Notifier, ctx).await
    }

    async fn update_relationship(&self, group: &Group, ctx: &mut Context, field: &Field) -> Result<()> {
        let document: LinkageDocument =
            serde_json::from_slice(&ctx.request.body).map_err(|e| RequestError::InvalidBody {
                message: e.to_string(),
            })?;

        self.authorize(ctx).await?;
        if field.is_derived() || !ctx.is_writable(&field.name) {
            return Err(RequestError::NotWritable {
                name: field.json_key.clone(),
            }
            .into());
        }
        self.load(ctx).await?;

        let mut record = ctx.model.take().ok_or_else(missing_subject)?;
        match ctx.intent {
            Intent::SetRelationship => assign::set_linkage(field, &mut record, &document.data)?,
            Intent::AppendToRelationship => assign::append_linkage(field, &mut record, &document.data)?,
            _ => assign::remove_linkage(field, &mut record, &document.data)?,
        }
        ctx.model = Some(record);

        self.run_stage(Stage::Validator, ctx).await?;
        self.persist(ctx).await?;
        self.run_stage(Stage::Decorator, ctx).await?;
        self.render_linkage(group, ctx, field).await?;
        self.run_stage(Stage::Notifier, ctx).await
    }

    /// Load the subject, then replay the target controller with a derived
    /// selector
    async fn get_related(&self, group: &Group, ctx: &mut Context, field: &Field) -> Result<()> {
        self.authorize(ctx).await?;
        self.ensure_readable(ctx, field)?;
        self.load(ctx).await?;

        let target_name = field.target().unwrap_or_default();
        let target = group.controller(target_name).ok_or_else(|| {
            Error::Internal(format!("'{}' targets unregistered '{}'", field.name, target_name))
        })?;
        let record = subject(ctx)?;
        let path = ctx.request.uri.path().to_string();

        let mut child = match &field.kind {
            FieldKind::ToOne { .. } => {
                let Some(id) = record.reference(&field.store_key) else {
                    ctx.response = Some(Document::null(Links::to_self(path)));
                    return Ok(());
                };
                let mut child = ctx.derive(target.meta.clone(), target.store.clone(), Operation::Find);
                child.select(id);
                child
            }
            FieldKind::ToMany { .. } => {
                let ids = record
                    .ids(&field.store_key)
                    .into_iter()
                    .map(|id| Value::String(id.to_string()))
                    .collect();
                let mut child = ctx.derive(target.meta.clone(), target.store.clone(), Operation::List);
                child.selector.insert(ID_KEY.to_string(), Condition::In(ids));
                child
            }
            FieldKind::HasOne { inverse, .. } | FieldKind::HasMany { inverse, .. } => {
                let inverse_key = target
                    .meta
                    .get(inverse)
                    .map(|f| f.store_key.clone())
                    .ok_or_else(|| Error::Internal(format!("unresolved inverse '{}'", inverse)))?;
                let operation = if field.is_to_one_like() {
                    Operation::Find
                } else {
                    Operation::List
                };
                let mut child = ctx.derive(target.meta.clone(), target.store.clone(), operation);
                child
                    .selector
                    .insert(inverse_key, Condition::Eq(Value::String(record.id.to_string())));
                child
            }
            FieldKind::Attribute(_) => {
                return Err(RequestError::NotFound { path }.into());
            }
        };

        match child.operation {
            Operation::List => target.list(group, &mut child).await?,
            _ => target.find_related(group, &mut child, field).await?,
        }

        ctx.response = child.response.take();
        ctx.response_code = child.response_code;
        ctx.response_headers = std::mem::take(&mut child.response_headers);
        Ok(())
    }

    /// Find path of a to-one or has-one target, an empty result renders `null`
    async fn find_related(&self, group: &Group, ctx: &mut Context, field: &Field) -> Result<()> {
        self.authorize(ctx).await?;

        let found = ctx
            .collection()
            .find(&Query::new(ctx.query()).limit(2))
            .await?;
        if found.len() > 1 {
            let subject = ctx.request.uri.path().to_string();
            return Err(Error::Consistency(format!(
                "{} resolves to more than one '{}' for '{}'",
                subject, self.meta.name, field.name
            )));
        }

        match found.into_iter().next() {
            Some(record) => {
                ctx.resource_id = Some(record.id);
                ctx.model = Some(record);
                self.run_stage(Stage::Decorator, ctx).await?;
                self.render_model(group, ctx).await?;
            }
            None => {
                let path = ctx.request.uri.path().to_string();
                ctx.response = Some(Document::null(Links::to_self(path)));
            }
        }

        self.run_stage(Stage::Notifier, ctx).await
    }

    fn ensure_readable(&self, ctx: &Context, field: &Field) -> Result<()> {
        if ctx.is_readable(&field.name) {
            Ok(())
        } else {
            Err(RequestError::NotFound {
                path: ctx.request.uri.path().to_string(),
            }
            .into())
        }
    }

    // =========================================================================
    // Actions
    // =========================================================================

    async fn dispatch_collection_action(
        &self,
        request: Arc<Request>,
        params: Params,
        name: &str,
    ) -> Result<Response> {
        let mut ctx = self.context(request, params, Intent::CollectionAction);
        self.run_action(&mut ctx, name).await
    }

    async fn dispatch_resource_action(
        &self,
        request: Arc<Request>,
        params: Params,
        id: Uuid,
        name: &str,
    ) -> Result<Response> {
        let mut ctx = self.context(request, params, Intent::ResourceAction);
        ctx.select(id);
        self.run_action(&mut ctx, name).await
    }

    async fn run_action(&self, ctx: &mut Context, name: &str) -> Result<Response> {
        let actions = match ctx.operation {
            Operation::ResourceAction => &self.resource_actions,
            _ => &self.collection_actions,
        };
        let action = actions
            .get(name)
            .ok_or_else(|| Error::Internal(format!("unknown action '{}'", name)))?;

        let span = tracing::debug_span!("action", resource = %self.meta.name, action = name);
        async {
            check_action_request(action, &ctx.request)?;
            self.authorize(ctx).await?;
            if ctx.operation == Operation::ResourceAction {
                self.load(ctx).await?;
            }

            ctx.stage = Some(Stage::Action);
            action.call(ctx).await.map_err(|error| Error::Callback {
                stage: Stage::Action,
                callback: name.to_string(),
                error,
            })
        }
        .instrument(span)
        .await
    }
}

/// Method and body size checks shared by controller and group actions
pub(crate) fn check_action_request(action: &Action, request: &Request) -> Result<()> {
    if !action.allows(&request.method) {
        return Err(RequestError::MethodNotAllowed {
            method: request.method.to_string(),
            path: request.uri.path().to_string(),
        }
        .into());
    }
    if request.body.len() > action.limit() {
        return Err(RequestError::InvalidBody {
            message: format!("body exceeds {} bytes", action.limit()),
        }
        .into());
    }
    Ok(())
}

fn parse_path_id(segment: &str) -> Result<Uuid> {
    Uuid::parse_str(segment).map_err(|_| {
        RequestError::InvalidId {
            value: segment.to_string(),
        }
        .into()
    })
}

fn subject(ctx: &Context) -> Result<&Record> {
    ctx.model.as_ref().ok_or_else(missing_subject)
}

fn missing_subject() -> Error {
    Error::Internal("no subject loaded".to_string())
}

/// Commit on success, abort on failure
async fn finish<T>(transaction: Option<Box<dyn Transaction>>, result: Result<T>) -> Result<T> {
    let Some(transaction) = transaction else {
        return result;
    };
    match result {
        Ok(value) => {
            transaction.commit().await?;
            Ok(value)
        }
        Err(error) => {
            if let Err(abort) = transaction.abort().await {
                tracing::error!(error = %abort, "failed to abort transaction");
            }
            Err(error)
        }
    }
}

/// Encode the response document of a finished context
fn respond(ctx: Context) -> Result<Response> {
    let Context {
        response,
        response_code,
        response_headers,
        ..
    } = ctx;

    let mut http = match response {
        Some(document) => {
            let body = serde_json::to_vec(&document)
                .map_err(|e| Error::Internal(format!("failed to encode response: {}", e)))?;
            let mut http = (response_code, body).into_response();
            http.headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static(MEDIA_TYPE));
            http
        }
        None => response_code.into_response(),
    };
    http.headers_mut().extend(response_headers);
    Ok(http)
}
