//! Shared blog fixture for the integration tests
//!
//! Builds a group of four resources over one in-memory store and serves it
//! through `axum_test::TestServer`. Callers are identified by headers turned
//! into an [`AuthContext`] by a small middleware:
//!
//! - `x-user-id: <uuid>` for a user with the `writer` role
//! - `x-admin: 1` for an admin

#![allow(dead_code)]

use axum::extract::Request;
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum_test::TestServer;
use this_jsonapi::prelude::*;

pub const PREFIX: &str = "/api";

// =============================================================================
// Resources
// =============================================================================

pub fn users() -> Meta {
    Meta::new("users")
        .field(Field::attribute("name", AttrType::String).filterable().sortable())
        .field(Field::attribute("email", AttrType::String))
        .field(Field::has_many("posts", "posts", "author"))
        .field(Field::has_one("profile", "profiles", "user"))
}

pub fn profiles() -> Meta {
    Meta::new("profiles")
        .field(Field::attribute("bio", AttrType::String))
        .field(Field::optional_to_one("user", "users").store_key("user_id"))
}

pub fn posts() -> Meta {
    Meta::new("posts")
        .field(Field::attribute("title", AttrType::String).filterable().sortable())
        .field(
            Field::attribute("status", AttrType::String)
                .filterable()
                .default_value("draft"),
        )
        .field(Field::attribute("rank", AttrType::Integer).sortable())
        .field(
            Field::optional_to_one("author", "users")
                .store_key("author_id")
                .filterable(),
        )
        .field(Field::to_many("tags", "tags").store_key("tag_ids"))
        .field(Field::has_many("comments", "comments", "post"))
        .field(Field::attribute("deleted_at", AttrType::Timestamp).json_key("deleted-at"))
        .soft_delete("deleted_at")
}

pub fn comments() -> Meta {
    Meta::new("comments")
        .field(Field::attribute("body", AttrType::String))
        .field(Field::attribute("flagged", AttrType::Boolean).default_value(false))
        .field(Field::optional_to_one("post", "posts").store_key("post_id"))
}

pub fn tags() -> Meta {
    Meta::new("tags")
        .field(Field::attribute("label", AttrType::String).sortable())
        .field(Field::has_many("posts", "posts", "tags"))
}

// =============================================================================
// Controllers
// =============================================================================

struct CountPosts;

#[async_trait]
impl ActionHandler for CountPosts {
    async fn call(&self, ctx: &mut Context) -> Result<Response, CallbackError> {
        let total = ctx.collection().count(&ctx.query()).await?;
        Ok(axum::Json(json!({ "total": total })).into_response())
    }
}

/// Writers may change posts, only admins may set `status`
///
/// Without soft protection a non-admin sending `status` gets a 400.
pub fn posts_controller(store: Arc<dyn Store>) -> Controller {
    Controller::new(posts(), store)
        .authorizer(
            policy_authorizer(
                "writers",
                "admin_or_role:writer".parse().expect("valid policy"),
            )
                .except(&[Operation::List, Operation::Find]),
        )
        .authorizer(protected_fields_authorizer(&["status"], AuthPolicy::AdminOnly))
        .validator(attribute_normalizer("title", vec![trim()]))
        .validator(attribute_validator(
            "title",
            vec![required(), string_length(1, 100)],
        ))
        .collection_action("count", Action::new(&[Method::GET], CountPosts))
        .resource_action(
            "publish",
            Action::from_fn(&[Method::POST], |ctx| {
                let title = ctx.attribute("title").cloned().unwrap_or(Value::Null);
                Ok(axum::Json(json!({ "published": title })).into_response())
            }),
        )
}

/// Only admins may flag comments, other callers have the flag dropped
pub fn comments_controller(store: Arc<dyn Store>) -> Controller {
    Controller::new(comments(), store)
        .authorizer(protected_fields_authorizer(&["flagged"], AuthPolicy::AdminOnly))
        .soft_protection(true)
}

pub fn users_controller(store: Arc<dyn Store>) -> Controller {
    Controller::new(users(), store)
        .authorizer(hidden_fields_authorizer(&["email"], AuthPolicy::AdminOnly))
}

pub fn builder(store: Arc<dyn Store>) -> GroupBuilder {
    GroupBuilder::new()
        .prefix(PREFIX)
        .controller(users_controller(store.clone()))
        .and_then(|b| b.controller(Controller::new(profiles(), store.clone())))
        .and_then(|b| b.controller(posts_controller(store.clone())))
        .and_then(|b| b.controller(comments_controller(store.clone())))
        .and_then(|b| b.controller(Controller::new(tags(), store.clone())))
        .and_then(|b| {
            b.action(
                "health",
                Action::from_fn(&[Method::GET], |_| {
                    Ok(axum::Json(json!({ "status": "ok" })).into_response())
                }),
            )
        })
        .expect("Failed to register blog controllers")
}

// =============================================================================
// Server
// =============================================================================

async fn authenticate(mut request: Request, next: Next) -> Response {
    let headers = request.headers();
    let auth = if headers.contains_key("x-admin") {
        AuthContext::Admin {
            admin_id: Uuid::nil(),
        }
    } else {
        headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Uuid::parse_str(v).ok())
            .map(|id| AuthContext::user(id, &["writer"]))
            .unwrap_or_default()
    };
    request.extensions_mut().insert(auth);
    next.run(request).await
}

/// Serve a built group with the header based authentication
pub fn serve(group: Arc<Group>) -> TestServer {
    let app = group.router().layer(middleware::from_fn(authenticate));
    TestServer::new(app)
}

/// The blog group over a fresh store
pub fn blog_server() -> (TestServer, InMemoryStore) {
    let store = InMemoryStore::new();
    let group = builder(Arc::new(store.clone()))
        .build()
        .expect("Failed to build blog group");
    (serve(group), store)
}

pub fn writer() -> (HeaderName, HeaderValue) {
    let id = Uuid::new_v4().to_string();
    (
        HeaderName::from_static("x-user-id"),
        HeaderValue::from_str(&id).expect("uuid is a valid header value"),
    )
}

pub fn admin() -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static("x-admin"),
        HeaderValue::from_static("1"),
    )
}

// =============================================================================
// Requests
// =============================================================================

pub fn path(rest: &str) -> String {
    format!("{}/{}", PREFIX, rest.trim_start_matches('/'))
}

pub fn resource(resource_type: &str, attributes: Value) -> Value {
    json!({ "data": { "type": resource_type, "attributes": attributes } })
}

pub fn identifier(resource_type: &str, id: &str) -> Value {
    json!({ "type": resource_type, "id": id })
}

/// Create a resource as admin and return its id
pub async fn create(server: &TestServer, resource_type: &str, body: Value) -> String {
    let (name, value) = admin();
    let response = server
        .post(&path(resource_type))
        .add_header(name, value)
        .json(&body)
        .await;
    response.assert_status(axum::http::StatusCode::CREATED);
    let document: Value = response.json();
    document["data"]["id"]
        .as_str()
        .expect("created resource has an id")
        .to_string()
}

pub async fn create_user(server: &TestServer, name: &str) -> String {
    create(
        server,
        "users",
        resource("users", json!({ "name": name, "email": format!("{}@example.com", name) })),
    )
    .await
}

pub async fn create_post(server: &TestServer, title: &str) -> String {
    create(server, "posts", resource("posts", json!({ "title": title }))).await
}

pub async fn create_tag(server: &TestServer, label: &str) -> String {
    create(server, "tags", resource("tags", json!({ "label": label }))).await
}

/// Ids of the primary data of a collection document
pub fn ids(document: &Value) -> Vec<String> {
    document["data"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item["id"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Code of the first error of an error document
pub fn error_code(document: &Value) -> &str {
    document["errors"][0]["code"].as_str().unwrap_or_default()
}
