//! Resource endpoint tests
//!
//! CRUD, listing, filtering, sorting, sparse fieldsets and soft delete
//! through the HTTP surface of the blog fixture.

mod harness;

use axum::http::StatusCode;
use harness::*;
use this_jsonapi::prelude::*;

// =============================================================================
// Listing
// =============================================================================

mod list_tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_collection_lists_empty_array() {
        let (server, _) = blog_server();

        let response = server.get("/api/posts").await;
        response.assert_status(StatusCode::OK);

        let body: Value = response.json();
        assert_eq!(body["data"], json!([]));
        assert_eq!(body["links"]["self"], "/api/posts");
    }

    #[tokio::test]
    async fn test_list_uses_json_api_media_type() {
        let (server, _) = blog_server();

        let response = server.get("/api/tags").await;
        response.assert_status(StatusCode::OK);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/vnd.api+json"
        );
    }

    #[tokio::test]
    async fn test_filter_and_sort() {
        let (server, _) = blog_server();
        let banana = create_post(&server, "Banana").await;
        let apple = create_post(&server, "Apple").await;
        let cherry = create_post(&server, "Cherry").await;

        let response = server.get("/api/posts?sort=title").await;
        response.assert_status(StatusCode::OK);
        let body: Value = response.json();
        assert_eq!(ids(&body), vec![apple.clone(), banana.clone(), cherry.clone()]);

        let response = server.get("/api/posts?sort=-title").await;
        let body: Value = response.json();
        assert_eq!(ids(&body), vec![cherry.clone(), banana, apple.clone()]);

        let response = server.get("/api/posts?filter[title]=Apple,Cherry&sort=title").await;
        let body: Value = response.json();
        assert_eq!(ids(&body), vec![apple, cherry]);
    }

    #[tokio::test]
    async fn test_filter_on_to_one_relationship() {
        let (server, _) = blog_server();
        let alice = create_user(&server, "alice").await;
        let bob = create_user(&server, "bob").await;

        let mut body = resource("posts", json!({ "title": "By Alice" }));
        body["data"]["relationships"] = json!({ "author": { "data": identifier("users", &alice) } });
        let by_alice = create(&server, "posts", body).await;
        create_post(&server, "Anonymous").await;

        let response = server.get(&format!("/api/posts?filter[author]={}", alice)).await;
        let body: Value = response.json();
        assert_eq!(ids(&body), vec![by_alice]);

        let response = server.get(&format!("/api/posts?filter[author]={}", bob)).await;
        let body: Value = response.json();
        assert_eq!(body["data"], json!([]));
    }

    #[tokio::test]
    async fn test_unsupported_filter_and_sort() {
        let (server, _) = blog_server();

        let response = server.get("/api/posts?filter[rank]=1").await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(error_code(&body), "UNSUPPORTED_FILTER");
        assert_eq!(body["errors"][0]["source"]["parameter"], "filter[rank]");

        let response = server.get("/api/posts?sort=status").await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(error_code(&body), "UNSUPPORTED_SORT");
    }

    #[tokio::test]
    async fn test_include_is_rejected() {
        let (server, _) = blog_server();

        let response = server.get("/api/posts?include=author").await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(error_code(&body), "INVALID_PARAMETER");
    }
}

// =============================================================================
// Create and Find
// =============================================================================

mod create_tests {
    use super::*;

    #[tokio::test]
    async fn test_create_then_find_round_trip() {
        let (server, _) = blog_server();
        let (name, value) = writer();

        let response = server
            .post("/api/posts")
            .add_header(name, value)
            .json(&resource("posts", json!({ "title": "  Hello World  " })))
            .await;
        response.assert_status(StatusCode::CREATED);

        let created: Value = response.json();
        let id = created["data"]["id"].as_str().unwrap().to_string();
        assert_eq!(
            response.headers().get("location").unwrap(),
            format!("/api/posts/{}", id).as_str()
        );
        assert_eq!(created["data"]["type"], "posts");
        assert_eq!(created["data"]["attributes"]["title"], "Hello World");
        assert_eq!(created["data"]["attributes"]["status"], "draft");
        assert_eq!(created["links"]["self"], format!("/api/posts/{}", id));

        let response = server.get(&format!("/api/posts/{}", id)).await;
        response.assert_status(StatusCode::OK);
        let found: Value = response.json();
        assert_eq!(found["data"], created["data"]);
    }

    #[tokio::test]
    async fn test_created_resource_renders_relationships() {
        let (server, _) = blog_server();
        let id = create_post(&server, "Linked").await;

        let response = server.get(&format!("/api/posts/{}", id)).await;
        let body: Value = response.json();
        let relationships = &body["data"]["relationships"];

        assert_eq!(relationships["author"]["data"], Value::Null);
        assert_eq!(relationships["tags"]["data"], json!([]));
        assert_eq!(relationships["comments"]["data"], json!([]));
        assert_eq!(
            relationships["comments"]["links"]["related"],
            format!("/api/posts/{}/comments", id)
        );
        assert_eq!(
            relationships["tags"]["links"]["self"],
            format!("/api/posts/{}/relationships/tags", id)
        );
    }

    #[tokio::test]
    async fn test_json_keys_on_the_wire() {
        let (server, _) = blog_server();
        let id = create_post(&server, "Keys").await;

        let response = server.get(&format!("/api/posts/{}", id)).await;
        let body: Value = response.json();
        let attributes = body["data"]["attributes"].as_object().unwrap();
        assert!(attributes.contains_key("deleted-at"));
        assert!(!attributes.contains_key("deleted_at"));
    }

    #[tokio::test]
    async fn test_sparse_fieldsets() {
        let (server, _) = blog_server();
        let id = create_post(&server, "Sparse").await;

        let response = server
            .get(&format!("/api/posts/{}?fields[posts]=title,author", id))
            .await;
        response.assert_status(StatusCode::OK);

        let body: Value = response.json();
        let attributes = body["data"]["attributes"].as_object().unwrap();
        let relationships = body["data"]["relationships"].as_object().unwrap();
        assert_eq!(attributes.keys().collect::<Vec<_>>(), vec!["title"]);
        assert_eq!(relationships.keys().collect::<Vec<_>>(), vec!["author"]);
    }

    #[tokio::test]
    async fn test_find_unknown_id_is_not_found() {
        let (server, _) = blog_server();

        let response = server.get(&format!("/api/posts/{}", Uuid::new_v4())).await;
        response.assert_status(StatusCode::NOT_FOUND);
        let body: Value = response.json();
        assert_eq!(error_code(&body), "RESOURCE_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_unknown_attribute_is_rejected() {
        let (server, _) = blog_server();
        let (name, value) = admin();

        let response = server
            .post("/api/posts")
            .add_header(name, value)
            .json(&resource("posts", json!({ "title": "x", "subtitle": "y" })))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(error_code(&body), "UNKNOWN_ATTRIBUTE");
        assert_eq!(body["errors"][0]["source"]["pointer"], "/data/attributes/subtitle");
    }

    #[tokio::test]
    async fn test_attribute_type_is_checked() {
        let (server, _) = blog_server();
        let (name, value) = admin();

        let response = server
            .post("/api/posts")
            .add_header(name, value)
            .json(&resource("posts", json!({ "title": "x", "rank": "first" })))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(error_code(&body), "INVALID_ATTRIBUTE_VALUE");
    }
}

// =============================================================================
// Update
// =============================================================================

mod update_tests {
    use super::*;

    #[tokio::test]
    async fn test_update_changes_only_given_fields() {
        let (server, _) = blog_server();
        let id = create(
            &server,
            "posts",
            resource("posts", json!({ "title": "Before", "rank": 3 })),
        )
        .await;
        let (name, value) = writer();

        let response = server
            .patch(&format!("/api/posts/{}", id))
            .add_header(name, value)
            .json(&json!({
                "data": { "type": "posts", "id": id, "attributes": { "title": "After" } }
            }))
            .await;
        response.assert_status(StatusCode::OK);

        let body: Value = response.json();
        assert_eq!(body["data"]["attributes"]["title"], "After");
        assert_eq!(body["data"]["attributes"]["rank"], 3);
    }

    #[tokio::test]
    async fn test_update_unknown_resource_is_not_found() {
        let (server, _) = blog_server();
        let (name, value) = admin();
        let id = Uuid::new_v4().to_string();

        let response = server
            .patch(&format!("/api/posts/{}", id))
            .add_header(name, value)
            .json(&json!({ "data": { "type": "posts", "id": id, "attributes": {} } }))
            .await;
        response.assert_status(StatusCode::NOT_FOUND);
    }
}

// =============================================================================
// Delete
// =============================================================================

mod delete_tests {
    use super::*;

    #[tokio::test]
    async fn test_hard_delete() {
        let (server, store) = blog_server();
        let id = create_tag(&server, "rust").await;

        let response = server.delete(&format!("/api/tags/{}", id)).await;
        response.assert_status(StatusCode::NO_CONTENT);

        server
            .get(&format!("/api/tags/{}", id))
            .await
            .assert_status(StatusCode::NOT_FOUND);

        let remaining = store
            .collection("tags")
            .count(&Filter::all())
            .await
            .unwrap();
        assert_eq!(remaining, 0);
    }

    #[tokio::test]
    async fn test_soft_delete_hides_but_keeps_the_document() {
        let (server, store) = blog_server();
        let id = create_post(&server, "Ephemeral").await;
        let kept = create_post(&server, "Kept").await;
        let (name, value) = admin();

        let response = server
            .delete(&format!("/api/posts/{}", id))
            .add_header(name, value)
            .await;
        response.assert_status(StatusCode::NO_CONTENT);

        server
            .get(&format!("/api/posts/{}", id))
            .await
            .assert_status(StatusCode::NOT_FOUND);

        let body: Value = server.get("/api/posts").await.json();
        assert_eq!(ids(&body), vec![kept]);

        let document = store
            .collection("posts")
            .find_one(&Filter::eq("_id", id.clone()))
            .await
            .unwrap()
            .expect("soft deleted document is kept");
        assert!(document.get("deleted_at").is_some_and(Value::is_string));
    }

    #[tokio::test]
    async fn test_deleting_twice_is_not_found() {
        let (server, _) = blog_server();
        let id = create_post(&server, "Twice").await;

        let (name, value) = admin();
        server
            .delete(&format!("/api/posts/{}", id))
            .add_header(name, value)
            .await
            .assert_status(StatusCode::NO_CONTENT);

        let (name, value) = admin();
        server
            .delete(&format!("/api/posts/{}", id))
            .add_header(name, value)
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_soft_deleted_documents_leave_derived_relationships() {
        let (server, _) = blog_server();
        let alice = create_user(&server, "alice").await;

        let mut body = resource("posts", json!({ "title": "Gone" }));
        body["data"]["relationships"] = json!({ "author": { "data": identifier("users", &alice) } });
        let post = create(&server, "posts", body).await;

        let body: Value = server.get(&format!("/api/users/{}", alice)).await.json();
        assert_eq!(body["data"]["relationships"]["posts"]["data"][0]["id"], post.as_str());

        let (name, value) = admin();
        server
            .delete(&format!("/api/posts/{}", post))
            .add_header(name, value)
            .await
            .assert_status(StatusCode::NO_CONTENT);

        let body: Value = server.get(&format!("/api/users/{}", alice)).await.json();
        assert_eq!(body["data"]["relationships"]["posts"]["data"], json!([]));
    }

    #[tokio::test]
    async fn test_deletion_marker_is_not_writable() {
        let (server, store) = blog_server();
        let id = create_post(&server, "Visible").await;
        let marker = json!({ "title": "Hidden", "deleted-at": "2024-01-01T00:00:00Z" });

        let (name, value) = admin();
        let response = server
            .patch(&format!("/api/posts/{}", id))
            .add_header(name, value)
            .json(&json!({ "data": { "type": "posts", "id": id, "attributes": marker } }))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(error_code(&body), "FIELD_NOT_WRITABLE");

        let body: Value = server.get(&format!("/api/posts/{}", id)).await.json();
        assert_eq!(body["data"]["attributes"]["title"], "Visible");

        let (name, value) = admin();
        let response = server
            .post("/api/posts")
            .add_header(name, value)
            .json(&resource("posts", marker))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(error_code(&body), "FIELD_NOT_WRITABLE");

        assert_eq!(store.collection("posts").count(&Filter::all()).await.unwrap(), 1);
        let body: Value = server.get("/api/posts").await.json();
        assert_eq!(ids(&body), vec![id]);
    }
}
