//! Blog API example
//!
//! This example demonstrates:
//! - Typed models bound to resource metadata
//! - To-one, to-many and derived has-many relationships
//! - Authorizers, validators, normalizers and notifiers
//! - Soft delete and forced pagination
//! - Collection, resource and group actions
//! - Loading settings from `demos/blog/api.yaml`
//!
//! Run with `cargo run --example blog`, then:
//!
//! ```text
//! curl -H 'x-user-id: <uuid>' -H 'content-type: application/vnd.api+json' \
//!      -d '{"data":{"type":"posts","attributes":{"title":"Hello"},"relationships":{"author":{"data":{"type":"users","id":"<uuid>"}}}}}' \
//!      http://127.0.0.1:3000/api/posts
//! ```

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use std::path::Path;
use this_jsonapi::prelude::*;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct User {
    id: Uuid,
    name: String,
    email: String,
}

impl Model for User {
    fn meta() -> Meta {
        Meta::new("users")
            .field(Field::attribute("name", AttrType::String).filterable().sortable())
            .field(Field::attribute("email", AttrType::String).filterable())
            .field(Field::has_many("posts", "posts", "author"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Post {
    id: Uuid,
    title: String,
    status: String,
    author_id: Uuid,
    tag_ids: Vec<Uuid>,
    created_at: Option<String>,
    updated_at: Option<String>,
    deleted_at: Option<String>,
}

impl Model for Post {
    fn meta() -> Meta {
        Meta::new("posts")
            .field(Field::attribute("title", AttrType::String).filterable().sortable())
            .field(
                Field::attribute("status", AttrType::String)
                    .filterable()
                    .default_value("draft"),
            )
            .field(Field::to_one("author", "users").store_key("author_id").filterable())
            .field(Field::to_many("tags", "tags").store_key("tag_ids").filterable())
            .field(Field::has_many("comments", "comments", "post"))
            .field(Field::attribute("created_at", AttrType::Timestamp).json_key("created-at").sortable())
            .field(Field::attribute("updated_at", AttrType::Timestamp).json_key("updated-at"))
            .field(Field::attribute("deleted_at", AttrType::Timestamp))
            .soft_delete("deleted_at")
    }
}

fn comments() -> Meta {
    Meta::new("comments")
        .field(Field::attribute("body", AttrType::String))
        .field(Field::to_one("post", "posts").store_key("post_id").filterable())
}

fn tags() -> Meta {
    Meta::new("tags")
        .field(Field::attribute("label", AttrType::String).sortable())
        .field(Field::has_many("posts", "posts", "tags"))
}

/// Turn the demo headers into an [`AuthContext`]
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

/// `GET /api/posts/stats`
struct Stats;

#[async_trait]
impl ActionHandler for Stats {
    async fn call(&self, ctx: &mut Context) -> Result<Response, CallbackError> {
        let collection = ctx.collection();
        let live = Filter::is_null("deleted_at");
        let total = collection.count(&live).await?;
        let published = collection
            .count(&Filter::And(vec![live, Filter::eq("status", "published")]))
            .await?;
        Ok(axum::Json(json!({ "total": total, "published": published })).into_response())
    }
}

fn users_controller(store: Arc<dyn Store>) -> Controller {
    Controller::for_model::<User>(store)
        .authorizer(
            policy_authorizer("admins", AuthPolicy::AdminOnly)
                .only(&[Operation::Create, Operation::Update, Operation::Delete]),
        )
        .authorizer(hidden_fields_authorizer(&["email"], AuthPolicy::AdminOnly))
        .validator(attribute_normalizer("email", vec![trim(), lowercase()]))
        .validator(attribute_validator(
            "email",
            vec![required(), format(FieldFormat::Email)],
        ))
        .validator(unique_attribute_validator("email"))
        .validator(dependent_resources_validator(&[("posts", "author_id")]))
}

fn posts_controller(store: Arc<dyn Store>) -> Result<Controller, ConfigError> {
    let controller = Controller::for_model::<Post>(store)
        .authorizer(
            policy_authorizer("writers", "admin_or_role:writer".parse()?)
                .except(&[Operation::List, Operation::Find]),
        )
        .authorizer(protected_fields_authorizer(
            &["created_at", "updated_at"],
            AuthPolicy::AdminOnly,
        ))
        .validator(attribute_normalizer("title", vec![trim()]))
        .validator(attribute_validator(
            "title",
            vec![required(), string_length(1, 200)],
        ))
        .validator(attribute_validator(
            "status",
            vec![in_list(&["draft", "published"])],
        ))
        .validator(verify_references_validator(&[("author", "users"), ("tags", "tags")]))
        .validator(timestamp_validator("created_at", "updated_at"))
        .notifier(
            Callback::from_fn("audit", |ctx| {
                tracing::info!(
                    operation = %ctx.operation,
                    id = ?ctx.resource_id,
                    "post changed"
                );
                Ok(())
            })
            .only(&[Operation::Create, Operation::Update, Operation::Delete]),
        )
        .collection_action("stats", Action::new(&[Method::GET], Stats))
        .resource_action(
            "publish",
            Action::from_fn(&[Method::POST], |ctx| {
                let post: Option<Post> = ctx.model_as()?;
                let title = post.map(|p| p.title).unwrap_or_default();
                Ok(axum::Json(json!({ "published": title })).into_response())
            }),
        )
        .soft_protection(true)
        .list_limit(20);
    Ok(controller)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,this_jsonapi=debug")),
        )
        .init();

    println!("🚀 This JSON:API Blog Example");
    println!("=============================\n");

    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());

    // Seed an author so posts can be created right away
    let alice = User {
        id: Uuid::new_v4(),
        name: "Alice".to_string(),
        email: "alice@example.com".to_string(),
    };
    store
        .collection("users")
        .insert(&Record::encode(&alice)?)
        .await?;
    println!("👤 Seeded user Alice: {}\n", alice.id);

    let mut builder = GroupBuilder::new()
        .prefix("/api")
        .reporter(|error| eprintln!("❌ internal error: {}", error))
        .controller(users_controller(store.clone()))?
        .controller(posts_controller(store.clone())?)?
        .controller(Controller::new(comments(), store.clone()))?
        .controller(Controller::new(tags(), store.clone()))?
        .action(
            "health",
            Action::from_fn(&[Method::GET], |_| {
                Ok(axum::Json(json!({ "status": "ok", "service": "blog" })).into_response())
            }),
        )?;

    let config_path = Path::new("demos/blog/api.yaml");
    if config_path.exists() {
        builder = builder.config(ApiConfig::from_yaml_file(config_path)?);
        println!("✅ Loaded configuration from {}", config_path.display());
    }

    let group = builder.build()?;
    let app = group
        .clone()
        .router()
        .layer(middleware::from_fn(authenticate))
        .layer(CorsLayer::permissive());

    println!("📚 Resources:");
    for name in group.resources() {
        println!("   - http://127.0.0.1:3000{}/{}", group.prefix(), name);
    }
    println!("\n🔑 Send 'x-user-id: {}' to write posts, 'x-admin: 1' for everything\n", alice.id);

    let listener = TcpListener::bind("127.0.0.1:3000").await?;
    axum::serve(listener, app).await?;
    Ok(())
}
