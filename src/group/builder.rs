//! GroupBuilder for fluent API to build groups

use indexmap::IndexMap;
use std::sync::Arc;

use super::{DEFAULT_BODY_LIMIT, Group, Reporter};
use crate::config::ApiConfig;
use crate::controller::Controller;
use crate::core::callback::Action;
use crate::core::error::{ConfigError, Error};
use crate::core::meta::FieldKind;
use crate::core::store::Store;
use crate::storage::InMemoryStore;

/// Scope name used for group action errors
const GROUP_SCOPE: &str = "group";

/// Builder for a [`Group`]
///
/// Registration errors that only concern one name are returned right away,
/// everything that needs the complete set of controllers is checked by
/// [`build`](Self::build).
///
/// # Example
///
/// ```ignore
/// let group = GroupBuilder::new()
///     .prefix("/api")
///     .config(ApiConfig::from_yaml_file("config/api.yaml")?)
///     .controller(Controller::for_model::<User>(store.clone()))?
///     .controller(Controller::for_model::<Post>(store.clone()))?
///     .action("health", Action::from_fn(&[Method::GET], health))?
///     .build()?;
///
/// group.serve("127.0.0.1:3000").await?;
/// ```
pub struct GroupBuilder {
    prefix: String,
    body_limit: usize,
    config: Option<ApiConfig>,
    controllers: IndexMap<String, Controller>,
    actions: IndexMap<String, Action>,
    reporter: Option<Reporter>,
    store: Option<Arc<dyn Store>>,
}

impl GroupBuilder {
    pub fn new() -> Self {
        Self {
            prefix: String::new(),
            body_limit: DEFAULT_BODY_LIMIT,
            config: None,
            controllers: IndexMap::new(),
            actions: IndexMap::new(),
            reporter: None,
            store: None,
        }
    }

    /// Mount the group under a path prefix, e.g. `/api`
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Maximum request body size in bytes
    pub fn body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    /// Apply a loaded configuration at build time
    ///
    /// Values set in the configuration override the ones declared in code.
    pub fn config(mut self, config: ApiConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Receive internal errors, e.g. to forward them to an error tracker
    pub fn reporter(mut self, reporter: impl Fn(&Error) + Send + Sync + 'static) -> Self {
        self.reporter = Some(Arc::new(reporter));
        self
    }

    /// Store handed to group actions
    ///
    /// Defaults to the store of the first controller.
    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// Register a controller under its resource name
    pub fn controller(mut self, controller: Controller) -> Result<Self, ConfigError> {
        let name = controller.name().to_string();
        if self.controllers.contains_key(&name) {
            return Err(ConfigError::DuplicateController { name });
        }
        if self.actions.contains_key(&name) {
            return Err(ConfigError::DuplicateAction {
                scope: GROUP_SCOPE.to_string(),
                name,
            });
        }
        self.controllers.insert(name, controller);
        Ok(self)
    }

    /// Register a group action, served at `/{name}`
    pub fn action(mut self, name: impl Into<String>, action: Action) -> Result<Self, ConfigError> {
        let name = name.into();
        if self.actions.contains_key(&name) || self.controllers.contains_key(&name) {
            return Err(ConfigError::DuplicateAction {
                scope: GROUP_SCOPE.to_string(),
                name,
            });
        }
        self.actions.insert(name, action);
        Ok(self)
    }

    /// Check the registrations and freeze the group
    pub fn build(mut self) -> Result<Arc<Group>, ConfigError> {
        if let Some(config) = self.config.take() {
            self.apply(config)?;
        }

        for controller in self.controllers.values() {
            controller.check()?;
        }
        self.check_relationships()?;

        let store = match self.store {
            Some(store) => store,
            None => match self.controllers.values().next() {
                Some(controller) => controller.store().clone(),
                None => Arc::new(InMemoryStore::new()),
            },
        };

        let group = Group {
            prefix: normalize_prefix(&self.prefix),
            body_limit: self.body_limit,
            controllers: self.controllers,
            actions: self.actions,
            reporter: self.reporter,
            store,
        };

        tracing::info!(
            prefix = %group.prefix,
            resources = group.controllers.len(),
            actions = group.actions.len(),
            "group built"
        );
        for (name, controller) in &group.controllers {
            tracing::debug!(
                resource = %name,
                collection = %controller.meta().collection,
                fields = controller.meta().fields.len(),
                "controller registered"
            );
        }

        Ok(Arc::new(group))
    }

    fn apply(&mut self, config: ApiConfig) -> Result<(), ConfigError> {
        if let Some(name) = config
            .resources
            .keys()
            .find(|name| !self.controllers.contains_key(*name))
        {
            return Err(ConfigError::UnknownResource { name: name.clone() });
        }

        if let Some(prefix) = config.prefix.clone() {
            self.prefix = prefix;
        }
        if let Some(limit) = config.body_limit {
            self.body_limit = limit;
        }

        for (name, controller) in self.controllers.iter_mut() {
            if let Some(resource) = config.resource(name) {
                controller.configure(resource);
            }
            if let Some(limit) = config.default_list_limit {
                controller.apply_default_list_limit(limit);
            }
        }
        Ok(())
    }

    /// Every relationship must target a registered resource, and every derived
    /// relationship needs a stored inverse on its target pointing back
    fn check_relationships(&self) -> Result<(), ConfigError> {
        for (name, controller) in &self.controllers {
            for field in controller.meta().relationships() {
                let target_name = field.target().unwrap_or_default();
                let target = self.controllers.get(target_name).ok_or_else(|| {
                    ConfigError::UnknownTarget {
                        resource: name.clone(),
                        field: field.name.clone(),
                        target: target_name.to_string(),
                    }
                })?;

                let Some(inverse) = field.inverse() else {
                    continue;
                };
                let points_back = target.meta().get(inverse).is_some_and(|f| {
                    matches!(f.kind, FieldKind::ToOne { .. } | FieldKind::ToMany { .. })
                        && f.target() == Some(name.as_str())
                });
                if !points_back {
                    return Err(ConfigError::MissingInverse {
                        resource: name.clone(),
                        field: field.name.clone(),
                        target: target_name.to_string(),
                        inverse: inverse.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

impl Default for GroupBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// `api/` and `/api/` become `/api`, `/` becomes empty
fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResourceConfig;
    use crate::core::meta::{AttrType, Field, Meta};
    use axum::http::Method;
    use axum::response::IntoResponse;

    fn store() -> Arc<dyn Store> {
        Arc::new(InMemoryStore::new())
    }

    fn users() -> Meta {
        Meta::new("users")
            .field(Field::attribute("name", AttrType::String))
            .field(Field::has_many("posts", "posts", "author"))
    }

    fn posts() -> Meta {
        Meta::new("posts")
            .field(Field::attribute("title", AttrType::String))
            .field(Field::to_one("author", "users"))
    }

    fn noop() -> Action {
        Action::from_fn(&[Method::POST], |_| Ok(().into_response()))
    }

    #[test]
    fn test_normalize_prefix() {
        assert_eq!(normalize_prefix(""), "");
        assert_eq!(normalize_prefix("/"), "");
        assert_eq!(normalize_prefix("api/"), "/api");
        assert_eq!(normalize_prefix("/api/v1/"), "/api/v1");
    }

    #[test]
    fn test_valid_group() {
        let group = GroupBuilder::new()
            .prefix("api/")
            .controller(Controller::new(users(), store()))
            .unwrap()
            .controller(Controller::new(posts(), store()))
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(group.prefix(), "/api");
        assert_eq!(group.resources().collect::<Vec<_>>(), vec!["users", "posts"]);
        assert!(group.controller("posts").is_some());
    }

    #[test]
    fn test_duplicate_names() {
        let err = GroupBuilder::new()
            .controller(Controller::new(users(), store()))
            .unwrap()
            .controller(Controller::new(users(), store()))
            .err()
            .unwrap();
        assert_eq!(err, ConfigError::DuplicateController { name: "users".into() });

        let err = GroupBuilder::new()
            .action("login", noop())
            .unwrap()
            .action("login", noop())
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::DuplicateAction { .. }));

        let err = GroupBuilder::new()
            .controller(Controller::new(posts(), store()).collection_action("publish", noop()).collection_action("publish", noop()))
            .unwrap()
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::DuplicateAction { .. }));
    }

    #[test]
    fn test_unknown_target() {
        let err = GroupBuilder::new()
            .controller(Controller::new(posts(), store()))
            .unwrap()
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::UnknownTarget { ref target, .. } if target == "users"));
    }

    #[test]
    fn test_missing_inverse() {
        let users = Meta::new("users").field(Field::has_many("posts", "posts", "writer"));
        let err = GroupBuilder::new()
            .controller(Controller::new(users, store()))
            .unwrap()
            .controller(Controller::new(posts(), store()))
            .unwrap()
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::MissingInverse { ref inverse, .. } if inverse == "writer"));

        // an inverse that is itself derived does not count
        let users = Meta::new("users").field(Field::has_one("profile", "profiles", "user"));
        let profiles = Meta::new("profiles").field(Field::has_one("user", "users", "profile"));
        let err = GroupBuilder::new()
            .controller(Controller::new(users, store()))
            .unwrap()
            .controller(Controller::new(profiles, store()))
            .unwrap()
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::MissingInverse { .. }));
    }

    #[test]
    fn test_action_collides_with_relationship() {
        let err = GroupBuilder::new()
            .controller(Controller::new(users(), store()).resource_action("posts", noop()))
            .unwrap()
            .controller(Controller::new(posts(), store()))
            .unwrap()
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::ActionCollision { ref action, .. } if action == "posts"));
    }

    #[test]
    fn test_config_applied() {
        let mut config = ApiConfig {
            prefix: Some("/v1".into()),
            default_list_limit: Some(25),
            ..Default::default()
        };
        config.resources.insert(
            "posts".into(),
            ResourceConfig {
                disable_listing: Some(true),
                ..Default::default()
            },
        );

        let group = GroupBuilder::new()
            .controller(Controller::new(users(), store()))
            .unwrap()
            .controller(Controller::new(posts(), store()))
            .unwrap()
            .config(config.clone())
            .build()
            .unwrap();
        assert_eq!(group.prefix(), "/v1");

        config.resources.insert("tags".into(), ResourceConfig::default());
        let err = GroupBuilder::new()
            .controller(Controller::new(users(), store()))
            .unwrap()
            .controller(Controller::new(posts(), store()))
            .unwrap()
            .config(config)
            .build()
            .err()
            .unwrap();
        assert_eq!(err, ConfigError::UnknownResource { name: "tags".into() });
    }

    #[test]
    fn test_invalid_meta_rejected() {
        let meta = Meta::new("notes").soft_delete("deleted_at");
        let err = GroupBuilder::new()
            .controller(Controller::new(meta, store()))
            .unwrap()
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::MissingSoftDeleteField { .. }));
    }
}
