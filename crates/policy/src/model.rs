//! Access-model documents: actions, roles and groups.

use std::collections::BTreeSet;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use storage::{DefaultValue, Document, FieldKind, Generator, Schema, SchemaRegistry};

/// Action name granting every action of the role's domain.
pub const WILDCARD: &str = "*";

/// A stored access-model record.
pub trait AccessRecord: Serialize + DeserializeOwned {
    /// Table the records live in.
    const TABLE: &'static str;

    fn schema() -> Schema;
    fn name(&self) -> &str;
    fn domain(&self) -> Option<&str>;

    fn from_document(doc: &Document) -> Option<Self> {
        doc.to_record().ok()
    }

    fn to_document(&self) -> storage::Result<Document> {
        Document::from_record(self)
    }
}

/// An atomic, optionally domain-scoped capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub name: String,
    #[serde(default)]
    pub domain: Option<String>,
}

impl Action {
    pub fn new(name: impl Into<String>, domain: Option<&str>) -> Self {
        Self {
            id: None,
            name: name.into(),
            domain: domain.map(str::to_string),
        }
    }
}

/// A named set of actions, bound to connections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub name: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub actions: BTreeSet<String>,
}

impl Role {
    pub fn new<I, A>(name: impl Into<String>, domain: Option<&str>, actions: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        Self {
            id: None,
            name: name.into(),
            domain: domain.map(str::to_string),
            actions: actions.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether the role lists `action` or the wildcard.
    pub fn has_action(&self, action: &str) -> bool {
        !action.is_empty() && (self.actions.contains(action) || self.actions.contains(WILDCARD))
    }
}

/// A named set of roles plus directly-owned actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub name: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub roles: BTreeSet<String>,
    #[serde(default)]
    pub actions: BTreeSet<String>,
}

impl Group {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    /// Groups do not honor the wildcard; only listed actions count.
    pub fn has_action(&self, action: &str) -> bool {
        self.actions.contains(action)
    }
}

impl AccessRecord for Action {
    const TABLE: &'static str = "roles.actions";

    fn schema() -> Schema {
        base_schema("RoleAction").build()
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }
}

impl AccessRecord for Role {
    const TABLE: &'static str = "roles";

    fn schema() -> Schema {
        base_schema("Role")
            .field_or("actions", FieldKind::Array, empty_array())
            .build()
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }
}

impl AccessRecord for Group {
    const TABLE: &'static str = "roles.groups";

    fn schema() -> Schema {
        base_schema("RoleGroup")
            .field_or("roles", FieldKind::Array, empty_array())
            .field_or("actions", FieldKind::Array, empty_array())
            .build()
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }
}

/// Register the action, role and group schemas with a store registry.
pub fn register_schemas(registry: &mut SchemaRegistry) -> &mut SchemaRegistry {
    registry
        .register(Action::schema())
        .register(Role::schema())
        .register(Group::schema())
}

fn empty_array() -> DefaultValue {
    DefaultValue::Generate(Generator::EmptyArray)
}

/// id, name, domain, and a validity check requiring a non-empty name
/// unique per domain.
fn base_schema(name: &str) -> storage::SchemaBuilder {
    Schema::builder(name)
        .id()
        .field("name", FieldKind::String)
        .field("domain", FieldKind::String)
        .validity(|candidate, existing| {
            let Some(name) = candidate.get_str("name").filter(|n| !n.is_empty()) else {
                return false;
            };
            let domain = candidate.get("domain");
            !existing
                .iter()
                .any(|doc| doc.get_str("name") == Some(name) && doc.get("domain") == domain)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use storage::Table;
    use std::sync::Arc;

    #[test]
    fn test_role_wildcard() {
        let r1 = Role::new("R1", None, ["page.login"]);
        assert!(r1.has_action("page.login"));
        assert!(!r1.has_action("page.ban"));

        let r2 = Role::new("R2", None, [WILDCARD]);
        assert!(r2.has_action("page.ban"));
        assert!(!r2.has_action(""));
    }

    #[test]
    fn test_group_membership() {
        let group = Group {
            id: None,
            name: "staff".into(),
            domain: None,
            roles: ["mod".to_string()].into(),
            actions: [WILDCARD.to_string()].into(),
        };
        assert!(group.has_role("mod"));
        assert!(!group.has_role("admin"));
        assert!(!group.has_action("page.ban"));
    }

    #[test]
    fn test_name_domain_pair_is_unique() {
        let mut table = Table::new(Arc::new(Role::schema()));
        let admin = Role::new("admin", None, ["*"]).to_document().unwrap();
        let shop_admin = Role::new("admin", Some("shop"), ["*"]).to_document().unwrap();
        assert!(table.set(&admin).is_some());
        assert!(table.set(&admin).is_none());
        assert!(table.set(&shop_admin).is_some());
        assert!(table.set(&Document::new().with("name", "")).is_none());
    }

    #[test]
    fn test_document_round_trip_keeps_id() {
        let mut table = Table::new(Arc::new(Action::schema()));
        let doc = table
            .set(&Action::new("page.login", Some("web")).to_document().unwrap())
            .unwrap();
        assert_eq!(doc.get("domain"), Some(&json!("web")));
        let action = Action::from_document(&doc).unwrap();
        assert_eq!(action.id, Some(1));
        assert_eq!(action.domain.as_deref(), Some("web"));
    }

    #[test]
    fn test_register_schemas() {
        let mut registry = SchemaRegistry::new();
        register_schemas(&mut registry);
        assert!(registry.contains("role"));
        assert!(registry.contains("roleaction"));
        assert!(registry.contains("rolegroup"));
    }
}
