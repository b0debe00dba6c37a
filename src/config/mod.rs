//! Configuration loading and management
//!
//! Deployment knobs of a group and its controllers, usually kept in a YAML
//! file next to the service:
//!
//! ```yaml
//! prefix: /api
//! body_limit: 1048576
//! default_list_limit: 50
//! resources:
//!   posts:
//!     list_limit: 20
//!     soft_protection: true
//!   audit_logs:
//!     disable_listing: true
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::core::error::ConfigError;

/// Settings of one resource, unset values keep what the controller declared
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_limit: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub soft_protection: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable_listing: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_transactions: Option<bool>,
}

impl ResourceConfig {
    /// Overlay `other` on top of `self`
    fn merge(&mut self, other: ResourceConfig) {
        self.list_limit = other.list_limit.or(self.list_limit);
        self.soft_protection = other.soft_protection.or(self.soft_protection);
        self.disable_listing = other.disable_listing.or(self.disable_listing);
        self.use_transactions = other.use_transactions.or(self.use_transactions);
    }
}

/// Complete configuration of a group
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiConfig {
    /// Path prefix the group is mounted under, e.g. `/api`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,

    /// Maximum request body size in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_limit: Option<usize>,

    /// List limit of every resource that does not set its own
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_list_limit: Option<u64>,

    /// Per resource settings, keyed by resource name
    #[serde(default)]
    pub resources: IndexMap<String, ResourceConfig>,
}

impl ApiConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
            file: Some(path.display().to_string()),
            message: e.to_string(),
        })
    }

    /// Load configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Merge several configurations, later ones win
    pub fn merge(configs: Vec<ApiConfig>) -> Self {
        let mut merged = ApiConfig::default();
        for config in configs {
            merged.prefix = config.prefix.or(merged.prefix);
            merged.body_limit = config.body_limit.or(merged.body_limit);
            merged.default_list_limit = config.default_list_limit.or(merged.default_list_limit);
            for (name, resource) in config.resources {
                merged.resources.entry(name).or_default().merge(resource);
            }
        }
        merged
    }

    pub fn resource(&self, name: &str) -> Option<&ResourceConfig> {
        self.resources.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const YAML: &str = r#"
prefix: /api
default_list_limit: 50
resources:
  posts:
    list_limit: 20
    soft_protection: true
  audit_logs:
    disable_listing: true
"#;

    #[test]
    fn test_from_yaml_str() {
        let config = ApiConfig::from_yaml_str(YAML).unwrap();

        assert_eq!(config.prefix.as_deref(), Some("/api"));
        assert_eq!(config.body_limit, None);
        assert_eq!(config.default_list_limit, Some(50));
        assert_eq!(config.resources.len(), 2);

        let posts = config.resource("posts").unwrap();
        assert_eq!(posts.list_limit, Some(20));
        assert_eq!(posts.soft_protection, Some(true));
        assert_eq!(posts.use_transactions, None);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let err = ApiConfig::from_yaml_str("resources:\n  posts:\n    listing: false\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { file: None, .. }));
    }

    #[test]
    fn test_from_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(YAML.as_bytes()).unwrap();

        let config = ApiConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(config.prefix.as_deref(), Some("/api"));

        let missing = ApiConfig::from_yaml_file("/nonexistent/api.yaml").unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));
    }

    #[test]
    fn test_merge_later_wins() {
        let base = ApiConfig::from_yaml_str(YAML).unwrap();
        let overlay = ApiConfig::from_yaml_str(
            "prefix: /v2\nresources:\n  posts:\n    list_limit: 5\n  tags:\n    use_transactions: true\n",
        )
        .unwrap();

        let merged = ApiConfig::merge(vec![base, overlay]);
        assert_eq!(merged.prefix.as_deref(), Some("/v2"));
        assert_eq!(merged.default_list_limit, Some(50));

        let posts = merged.resource("posts").unwrap();
        assert_eq!(posts.list_limit, Some(5));
        assert_eq!(posts.soft_protection, Some(true));
        assert_eq!(merged.resource("tags").unwrap().use_transactions, Some(true));
    }

    #[test]
    fn test_yaml_serialization() {
        let config = ApiConfig::from_yaml_str(YAML).unwrap();
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert_eq!(ApiConfig::from_yaml_str(&yaml).unwrap(), config);
    }
}
