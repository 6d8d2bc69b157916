//! Configuration for the registry and the yrs binding.
//!
//! Both structs deserialize from JSON with every field optional:
//!
//! ```text
//! { "map_name": "presence", "default_position": { "line": 0 } }
//! { "root_name": "doc", "client_id": 42 }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CollabError, Result};

pub const DEFAULT_COLLABORATOR_MAP: &str = "collaborators:map";
pub const DEFAULT_ROOT_NAME: &str = "root";

/// Collaborator presence registry configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Key of the collaborator map inside the document root.
    pub map_name: String,
    /// Position blob given to a collaborator when it joins.
    pub default_position: Value,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            map_name: DEFAULT_COLLABORATOR_MAP.to_string(),
            default_position: Value::Object(Default::default()),
        }
    }
}

impl RegistryConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(CollabError::Config)
    }
}

/// yrs document configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct YrsConfig {
    /// Name of the top-level yrs map exposed as the document root.
    pub root_name: String,
    /// Fixed client id (None = random). Two live replicas must never share one.
    pub client_id: Option<u64>,
}

impl Default for YrsConfig {
    fn default() -> Self {
        Self {
            root_name: DEFAULT_ROOT_NAME.to_string(),
            client_id: None,
        }
    }
}

impl YrsConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(CollabError::Config)
    }

    /// Config for tests: fixed client id so update bytes are reproducible.
    pub fn for_testing(client_id: u64) -> Self {
        Self {
            client_id: Some(client_id),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_registry_defaults() {
        let config = RegistryConfig::default();
        assert_eq!(config.map_name, "collaborators:map");
        assert_eq!(config.default_position, json!({}));
    }

    #[test]
    fn test_registry_partial_json() {
        let config = RegistryConfig::from_json(r#"{"map_name": "presence"}"#).unwrap();
        assert_eq!(config.map_name, "presence");
        assert_eq!(config.default_position, json!({}));
    }

    #[test]
    fn test_yrs_config_json() {
        let config = YrsConfig::from_json(r#"{"client_id": 7}"#).unwrap();
        assert_eq!(config.root_name, "root");
        assert_eq!(config.client_id, Some(7));
        assert_eq!(YrsConfig::from_json("{}").unwrap(), YrsConfig::default());
    }

    #[test]
    fn test_invalid_config_is_reported() {
        let err = YrsConfig::from_json(r#"{"client_id": "seven"}"#).unwrap_err();
        assert!(matches!(err, CollabError::Config(_)));
        assert!(err.to_string().starts_with("invalid configuration"));
    }
}
