//! Configuration tests
//!
//! YAML files applied to a group through `GroupBuilder::config`.

mod harness;

use axum::http::StatusCode;
use harness::*;
use std::io::Write;
use tempfile::NamedTempFile;
use this_jsonapi::prelude::*;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(content.as_bytes())
        .expect("Failed to write config");
    file
}

mod file_tests {
    use super::*;

    #[tokio::test]
    async fn test_config_file_applies_to_the_group() {
        let file = write_config(
            r#"
prefix: /v2
default_list_limit: 2
resources:
  comments:
    disable_listing: true
  tags:
    list_limit: 1
"#,
        );
        let config = ApiConfig::from_yaml_file(file.path()).expect("Failed to load config");
        let group = builder(Arc::new(InMemoryStore::new()))
            .config(config)
            .build()
            .expect("Failed to build blog group");
        assert_eq!(group.prefix(), "/v2");
        let server = serve(group);

        server.get("/api/posts").await.assert_status(StatusCode::NOT_FOUND);

        let body: Value = server.get("/v2/posts").await.json();
        assert_eq!(body["links"]["self"], "/v2/posts?page[number]=1&page[size]=2");

        let body: Value = server.get("/v2/tags").await.json();
        assert_eq!(body["links"]["self"], "/v2/tags?page[number]=1&page[size]=1");

        let response = server.get("/v2/comments").await;
        response.assert_status(StatusCode::METHOD_NOT_ALLOWED);
        let body: Value = response.json();
        assert_eq!(error_code(&body), "LISTING_DISABLED");
    }

    #[tokio::test]
    async fn test_disabled_listing_keeps_other_endpoints() {
        let config = ApiConfig::from_yaml_str("resources:\n  tags:\n    disable_listing: true\n")
            .expect("Failed to parse config");
        let group = builder(Arc::new(InMemoryStore::new()))
            .config(config)
            .build()
            .expect("Failed to build blog group");
        let server = serve(group);

        let id = create_tag(&server, "still-here").await;
        server
            .get(&format!("/api/tags/{}", id))
            .await
            .assert_status(StatusCode::OK);
        server
            .get("/api/tags")
            .await
            .assert_status(StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_soft_protection_from_config() {
        let config = ApiConfig::from_yaml_str("resources:\n  posts:\n    soft_protection: true\n")
            .expect("Failed to parse config");
        let group = builder(Arc::new(InMemoryStore::new()))
            .config(config)
            .build()
            .expect("Failed to build blog group");
        let server = serve(group);
        let (name, value) = writer();

        let response = server
            .post("/api/posts")
            .add_header(name, value)
            .json(&resource("posts", json!({ "title": "Mine", "status": "published" })))
            .await;
        response.assert_status(StatusCode::CREATED);
        let body: Value = response.json();
        assert_eq!(body["data"]["attributes"]["status"], "draft");
    }

    #[test]
    fn test_missing_file() {
        let err = ApiConfig::from_yaml_file("/nonexistent/api.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_invalid_file_names_the_file() {
        let file = write_config("resources:\n  posts:\n    page_size: 10\n");
        let err = ApiConfig::from_yaml_file(file.path()).unwrap_err();
        let message = err.to_string();
        assert!(message.contains(&file.path().display().to_string()), "{}", message);
    }
}

mod validation_tests {
    use super::*;

    #[test]
    fn test_unknown_resource_is_rejected() {
        let config = ApiConfig::from_yaml_str("resources:\n  widgets:\n    list_limit: 5\n")
            .expect("Failed to parse config");
        let result = builder(Arc::new(InMemoryStore::new())).config(config).build();
        assert!(matches!(
            result,
            Err(ConfigError::UnknownResource { ref name }) if name == "widgets"
        ));
    }

    #[test]
    fn test_merged_configs() {
        let base = ApiConfig::from_yaml_str("prefix: /api\nresources:\n  tags:\n    list_limit: 5\n")
            .expect("Failed to parse base config");
        let local = ApiConfig::from_yaml_str("resources:\n  tags:\n    disable_listing: true\n")
            .expect("Failed to parse local config");

        let merged = ApiConfig::merge(vec![base, local]);
        assert_eq!(merged.prefix.as_deref(), Some("/api"));
        let tags = merged.resource("tags").expect("tags config");
        assert_eq!(tags.list_limit, Some(5));
        assert_eq!(tags.disable_listing, Some(true));
    }
}
