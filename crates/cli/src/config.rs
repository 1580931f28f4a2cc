//! Configuration loading from strongroom.toml.

use std::collections::BTreeMap;
use std::path::Path;

use policy::AccessConfig;
use serde::Deserialize;
use storage::{Schema, SchemaDecl, SchemaRegistry, StoreConfig};

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Store directory, encryption and autosave settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// Application schemas, in addition to the access-model ones.
    #[serde(default)]
    pub schemas: Vec<SchemaDecl>,

    /// Access-controlled tables, mapped to the model name their
    /// `data.read.*` / `data.write.*` capabilities use.
    #[serde(default)]
    pub guarded: BTreeMap<String, String>,

    /// Domain every access check is scoped to.
    pub domain: Option<String>,

    /// Actions, roles and groups seeded at boot.
    #[serde(flatten)]
    pub access: AccessConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Access-model schemas plus every declared one.
    pub fn schema_registry(&self) -> Result<SchemaRegistry, ConfigError> {
        let mut registry = SchemaRegistry::new();
        policy::register_schemas(&mut registry);
        for decl in &self.schemas {
            if registry.contains(&decl.name) {
                return Err(ConfigError::DuplicateSchema(decl.name.clone()));
            }
            let schema = Schema::try_from(decl.clone())
                .map_err(|e| ConfigError::Schema(e.to_string()))?;
            registry.register(schema);
        }
        Ok(registry)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid schema: {0}")]
    Schema(String),

    #[error("schema '{0}' is declared more than once")]
    DuplicateSchema(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
domain = "shop"

[store]
directory = "var/data"
encrypt = true
autosave_ms = 60000

[guarded]
orders = "Order"

[[schemas]]
name = "Order"
unique = ["number"]

[[schemas.fields]]
name = "id"
kind = "id"

[[schemas.fields]]
name = "number"
kind = "string"

[[roles]]
name = "clerk"
domain = "shop"
actions = ["data.read.Order"]

[[groups]]
name = "staff"
domain = "shop"
roles = ["clerk", "owner"]
"#;

    #[test]
    fn test_parse_full_config() {
        let config = Config::parse(SAMPLE).unwrap();
        assert!(config.store.encrypt);
        assert_eq!(config.store.autosave_ms, 60_000);
        assert_eq!(config.domain.as_deref(), Some("shop"));
        assert_eq!(config.guarded.get("orders").map(String::as_str), Some("Order"));
        assert_eq!(config.access.roles.len(), 1);
        assert_eq!(config.access.groups[0].roles, ["clerk", "owner"]);

        let registry = config.schema_registry().unwrap();
        assert!(registry.contains("order"));
        assert!(registry.contains("role"));
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert!(!config.store.encrypt);
        assert!(config.access.is_empty());
        assert!(config.schemas.is_empty());
    }

    #[test]
    fn test_schema_cannot_shadow_access_model() {
        let config = Config::parse(
            r#"
[[schemas]]
name = "Role"
"#,
        )
        .unwrap();
        assert!(matches!(
            config.schema_registry(),
            Err(ConfigError::DuplicateSchema(_))
        ));
    }
}
